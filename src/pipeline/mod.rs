//! Stage drivers.
//!
//! One medallion stage per invocation, run sequentially end to end:
//! bronze turns the raw delimited file into the normalized parquet
//! artifact; silver loads that artifact into the relational table and
//! republishes it as the silver artifact. Within a run, chunk N's writes
//! are fully committed before chunk N+1 starts, and there is no internal
//! retry: a failed run exits non-zero and the external scheduler decides
//! whether to re-invoke the stage from the top.

mod bronze;
mod check;
mod silver;

pub use bronze::{BronzeStats, run_bronze};
pub use check::run_check;
pub use silver::{SilverStats, run_silver};
