//! Chunk sinks for the silver loader.
//!
//! The loader fans each chunk out to an ordered list of sinks: the
//! relational table first, then the growing silver artifact. Both sit
//! behind the `ChunkSink` trait so the loader stays format-agnostic.

pub mod database;
pub mod parquet;

pub use database::DatabaseSink;
pub use parquet::{ArtifactWriter, PublishedArtifact};

use arrow::record_batch::RecordBatch;
use async_trait::async_trait;

use crate::error::PipelineError;

/// What one sink did over a full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkReport {
    /// Rows made durable by this sink.
    pub rows: u64,
    /// Final artifact size, for sinks that publish one.
    pub bytes: Option<u64>,
}

/// An ordered destination for loader chunks.
///
/// `write_chunk` is invoked once per chunk, in input order; `finish` is
/// invoked exactly once after the last chunk and seals the sink. A sink
/// must either make the chunk durable before returning or guarantee it
/// becomes durable at `finish`.
#[async_trait]
pub trait ChunkSink: Send {
    /// Short sink name for logging.
    fn name(&self) -> &'static str;

    /// Write one chunk. Chunk indices start at zero and arrive in order.
    async fn write_chunk(
        &mut self,
        chunk_index: usize,
        chunk: &RecordBatch,
    ) -> Result<(), PipelineError>;

    /// Flush any buffered state and seal the sink.
    async fn finish(&mut self) -> Result<SinkReport, PipelineError>;
}
