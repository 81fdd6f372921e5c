//! Source side of the pipeline.
//!
//! `reader` pulls fixed-size batches out of the delimited source file;
//! `artifact` decodes a previously published columnar artifact in full.

pub mod artifact;
pub mod reader;

pub use artifact::Artifact;
pub use reader::{CsvReader, CsvReaderConfig, TextBatch};
