//! Internal events for metrics emission.
//!
//! Each event struct represents a measurable occurrence in the pipeline.
//! Events implement the `InternalEvent` trait which emits the
//! corresponding Prometheus metric.

use metrics::{counter, histogram};
use std::time::Duration;
use tracing::trace;

/// Trait for internal events that can be emitted as metrics.
pub trait InternalEvent {
    /// Emit this event as a metric.
    fn emit(self);
}

/// Event emitted when a batch of rows is read from the source file.
pub struct RowsRead {
    pub rows: u64,
}

impl InternalEvent for RowsRead {
    fn emit(self) {
        trace!(rows = self.rows, "Rows read");
        counter!("medallion_rows_read_total").increment(self.rows);
    }
}

/// Event emitted when a batch finishes normalization.
pub struct BatchNormalized {
    pub rows: u64,
}

impl InternalEvent for BatchNormalized {
    fn emit(self) {
        trace!(rows = self.rows, "Batch normalized");
        counter!("medallion_batches_normalized_total").increment(1);
        counter!("medallion_rows_normalized_total").increment(self.rows);
    }
}

/// Event emitted when normalization coerces cells to null (or zero, for
/// count columns) in one column of a batch.
pub struct NullValuesCoerced {
    pub column: String,
    pub count: u64,
}

impl InternalEvent for NullValuesCoerced {
    fn emit(self) {
        trace!(column = %self.column, count = self.count, "Null values coerced");
        counter!("medallion_null_coercions_total", "column" => self.column).increment(self.count);
    }
}

/// Event emitted when a chunk commits to the relational table.
pub struct ChunkCommitted {
    pub chunk: usize,
    pub rows: u64,
}

impl InternalEvent for ChunkCommitted {
    fn emit(self) {
        trace!(chunk = self.chunk, rows = self.rows, "Chunk committed");
        counter!("medallion_chunks_committed_total").increment(1);
        counter!("medallion_rows_inserted_total").increment(self.rows);
    }
}

/// Event emitted when a finished artifact reaches the content store.
pub struct ArtifactPublished {
    pub rows: u64,
    pub bytes: u64,
}

impl InternalEvent for ArtifactPublished {
    fn emit(self) {
        trace!(rows = self.rows, bytes = self.bytes, "Artifact published");
        counter!("medallion_artifacts_published_total").increment(1);
        counter!("medallion_artifact_bytes_total").increment(self.bytes);
    }
}

// ============================================================================
// Storage operation events
// ============================================================================

/// Storage operation types.
#[derive(Debug, Clone, Copy)]
pub enum StorageOperation {
    Get,
    Put,
}

impl StorageOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageOperation::Get => "get",
            StorageOperation::Put => "put",
        }
    }
}

/// Status of a storage request.
#[derive(Debug, Clone, Copy)]
pub enum RequestStatus {
    Success,
    Error,
}

impl RequestStatus {
    fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Success => "success",
            RequestStatus::Error => "error",
        }
    }
}

/// Event emitted when a storage request completes.
pub struct StorageRequest {
    pub operation: StorageOperation,
    pub status: RequestStatus,
}

impl InternalEvent for StorageRequest {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            status = self.status.as_str(),
            "Storage request"
        );
        counter!(
            "medallion_storage_requests_total",
            "operation" => self.operation.as_str(),
            "status" => self.status.as_str()
        )
        .increment(1);
    }
}

/// Event emitted when a storage request completes with duration.
pub struct StorageRequestDuration {
    pub operation: StorageOperation,
    pub duration: Duration,
}

impl InternalEvent for StorageRequestDuration {
    fn emit(self) {
        trace!(
            operation = self.operation.as_str(),
            duration_ms = self.duration.as_millis(),
            "Storage request duration"
        );
        histogram!(
            "medallion_storage_request_duration_seconds",
            "operation" => self.operation.as_str()
        )
        .record(self.duration.as_secs_f64());
    }
}
