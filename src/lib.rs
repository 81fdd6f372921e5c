//! medallion: chunked bronze-to-silver ETL for delimited accident data.
//!
//! This library provides the components of a two-stage batch pipeline:
//! a bronze stage that reads a delimited text export in bounded batches,
//! normalizes its columns, and publishes a parquet artifact to a content
//! store; and a silver stage that loads that artifact into a relational
//! table (schema synthesized from the artifact itself) while republishing
//! it as the silver artifact.
//!
//! # Example
//!
//! ```ignore
//! use medallion::{Config, run_bronze};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_file("config.yaml")?;
//!     let stats = run_bronze(&config).await?;
//!     println!("Read {} rows", stats.rows_read);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod schema;
pub mod sink;
pub mod source;
pub mod storage;

// Re-export main types
pub use config::Config;
pub use pipeline::{BronzeStats, SilverStats, run_bronze, run_check, run_silver};
pub use storage::{StorageProvider, StorageProviderRef};
