//! Error types for medallion using snafu.
//!
//! This module defines structured error types with context selectors for
//! all error conditions in the codebase.

use snafu::prelude::*;

// ============ Storage Errors ============

/// Errors that can occur during content-store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StorageError {
    /// Invalid storage URL format.
    #[snafu(display("Invalid storage URL: {url}"))]
    InvalidUrl { url: String },

    /// Object store operation failed.
    #[snafu(display("Storage operation failed for {path}"))]
    ObjectStore {
        path: String,
        source: object_store::Error,
    },

    /// IO error during storage operations.
    #[snafu(display("IO error"))]
    Io { source: std::io::Error },

    /// S3 configuration error.
    #[snafu(display("S3 configuration error"))]
    S3Config { source: object_store::Error },
}

impl StorageError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            StorageError::ObjectStore { source, .. } => {
                matches!(source, object_store::Error::NotFound { .. })
            }
            _ => false,
        }
    }
}

// ============ Config Errors ============

/// Errors that can occur during configuration parsing and validation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    /// Source path is empty.
    #[snafu(display("Source path cannot be empty"))]
    EmptySourcePath,

    /// Artifact URL is empty.
    #[snafu(display("{stage} artifact URL cannot be empty"))]
    EmptyArtifactUrl { stage: String },

    /// Artifact key is empty.
    #[snafu(display("{stage} artifact key cannot be empty"))]
    EmptyArtifactKey { stage: String },

    /// Database DSN is empty.
    #[snafu(display("Database DSN cannot be empty"))]
    EmptyDsn,

    /// Table name is empty.
    #[snafu(display("Database table name cannot be empty"))]
    EmptyTable,

    /// Batch size must be non-zero.
    #[snafu(display("Source batch size must be greater than zero"))]
    ZeroBatchSize,

    /// Chunk size must be non-zero.
    #[snafu(display("Database chunk size must be greater than zero"))]
    ZeroChunkSize,

    /// Null-rate warning threshold is outside 0.0..=1.0.
    #[snafu(display("normalize.warn_null_rate must be between 0.0 and 1.0: {value}"))]
    BadNullRate { value: f64 },

    /// Delimiter must be a single byte.
    #[snafu(display("Source delimiter must be a single character: {delimiter:?}"))]
    BadDelimiter { delimiter: String },

    /// Unknown text encoding label.
    #[snafu(display("Unknown source encoding: {label}"))]
    UnknownEncoding { label: String },

    /// Environment variable interpolation failed.
    #[snafu(display("Environment variable interpolation failed:\n{message}"))]
    EnvInterpolation { message: String },

    /// Failed to parse YAML configuration.
    #[snafu(display("Failed to parse YAML configuration"))]
    YamlParse { source: serde_yaml::Error },

    /// Failed to read configuration file.
    #[snafu(display("Failed to read configuration file"))]
    ReadFile { source: std::io::Error },
}

// ============ Source Errors ============

/// Errors that can occur while reading the delimited source file.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum SourceError {
    /// CSV parse error (unreadable file, malformed row, column-count mismatch).
    #[snafu(display("CSV read failed for {path}"))]
    Csv { path: String, source: csv::Error },

    /// A field could not be decoded with the configured encoding.
    #[snafu(display("Encoding failure in {path} at row {row}, column {column}"))]
    Decode {
        path: String,
        row: u64,
        column: String,
    },

    /// The source file contains a header but no data rows.
    #[snafu(display("Source file {path} has no data rows"))]
    EmptyInput { path: String },
}

// ============ Normalize Errors ============

/// Errors raised by column normalization.
///
/// Per-cell date/time parse failures coerce to null and are never errors;
/// these variants cover the transforms that must not silently drop data.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum NormalizeError {
    /// A non-empty coordinate cell failed to parse after the decimal fix.
    #[snafu(display("Invalid coordinate in column {column} at row {row}: {value:?}"))]
    InvalidCoordinate {
        column: String,
        row: usize,
        value: String,
    },

    /// A non-empty casualty-count cell is not an integer.
    #[snafu(display("Invalid count in column {column} at row {row}: {value:?}"))]
    InvalidCount {
        column: String,
        row: usize,
        value: String,
    },

    /// A row does not carry one cell per header column.
    #[snafu(display("Row {row} has {found} cells, expected {expected}"))]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Arrow batch construction failed.
    #[snafu(display("Failed to build record batch"))]
    BatchBuild {
        source: arrow::error::ArrowError,
    },
}

// ============ Artifact Errors ============

/// Errors that can occur while writing or reading a columnar artifact.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ArtifactError {
    /// Failed to create the parquet writer.
    #[snafu(display("Failed to create parquet writer"))]
    WriterCreate {
        source: parquet::errors::ParquetError,
    },

    /// Parquet write error.
    #[snafu(display("Parquet write error"))]
    Write {
        source: parquet::errors::ParquetError,
    },

    /// Failed to finalize the parquet buffer.
    #[snafu(display("Failed to finalize parquet buffer"))]
    Finish {
        source: parquet::errors::ParquetError,
    },

    /// Failed to decode a parquet artifact.
    #[snafu(display("Failed to read parquet artifact from {url}"))]
    Read {
        url: String,
        source: parquet::errors::ParquetError,
    },

    /// Arrow-level failure while slicing or concatenating batches.
    #[snafu(display("Arrow operation failed"))]
    Arrow {
        source: arrow::error::ArrowError,
    },

    /// The artifact decoded to zero rows.
    #[snafu(display("Artifact at {url} contains no rows"))]
    EmptyArtifact { url: String },

    /// Upload of the finished artifact failed.
    #[snafu(display("Failed to publish artifact to {url}"))]
    Publish { url: String, source: StorageError },

    /// The writer was used after publishing.
    #[snafu(display("Artifact writer is already closed"))]
    WriterClosed,
}

// ============ Database Errors ============

/// Errors that can occur against the relational store.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum DatabaseError {
    /// Failed to connect to the database.
    #[snafu(display("Failed to connect to database"))]
    Connect { source: sqlx::Error },

    /// The connectivity check query failed.
    #[snafu(display("Database connectivity check failed"))]
    Ping { source: sqlx::Error },

    /// CREATE TABLE IF NOT EXISTS failed.
    #[snafu(display("Failed to create table {table}"))]
    CreateTable { table: String, source: sqlx::Error },

    /// Failed to open a chunk transaction.
    #[snafu(display("Failed to begin transaction for chunk {chunk}"))]
    Begin { chunk: usize, source: sqlx::Error },

    /// A multi-row insert was rejected.
    #[snafu(display("Insert failed for chunk {chunk}"))]
    Insert { chunk: usize, source: sqlx::Error },

    /// Commit failed; the chunk is not persisted.
    #[snafu(display("Failed to commit chunk {chunk}"))]
    Commit { chunk: usize, source: sqlx::Error },
}

// ============ Metrics Errors ============

/// Errors that can occur during metrics initialization.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum MetricsError {
    /// Failed to initialize Prometheus recorder.
    #[snafu(display("Failed to initialize Prometheus recorder"))]
    PrometheusInit {
        source: metrics_exporter_prometheus::BuildError,
    },
}

// ============ Pipeline Error (top-level) ============

/// Top-level pipeline errors that aggregate all error types.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PipelineError {
    /// Storage error.
    #[snafu(display("Storage error"))]
    Storage { source: StorageError },

    /// Configuration error.
    #[snafu(display("Configuration error"))]
    Config { source: ConfigError },

    /// Source error.
    #[snafu(display("Source error"))]
    Source { source: SourceError },

    /// Normalization error.
    #[snafu(display("Normalization error"))]
    Normalize { source: NormalizeError },

    /// Artifact error.
    #[snafu(display("Artifact error"))]
    Artifact { source: ArtifactError },

    /// Database error.
    #[snafu(display("Database error"))]
    Database { source: DatabaseError },

    /// Address parsing error.
    #[snafu(display("Failed to parse address"))]
    AddressParse { source: std::net::AddrParseError },

    /// Metrics error.
    #[snafu(display("Metrics error"))]
    Metrics { source: MetricsError },
}

impl PipelineError {
    /// Check if this error represents a "not found" condition (404, NoSuchKey, etc.)
    pub fn is_not_found(&self) -> bool {
        match self {
            PipelineError::Storage { source } => source.is_not_found(),
            _ => false,
        }
    }
}
