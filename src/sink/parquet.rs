//! Parquet artifact writer and publisher.
//!
//! Serializes Arrow batches into one in-memory parquet artifact and
//! publishes it to the content store with a single put, so a failed run
//! never leaves a partial object under the artifact key.
//!
//! Two accumulation modes cover the two stages: `buffered` holds batches
//! and serializes once at publish (bronze), `streaming` feeds an open
//! writer as batches arrive (silver).

use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use bytes::Bytes;
use object_store::path::Path;
use object_store::PutPayload;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use snafu::prelude::*;

use super::{ChunkSink, SinkReport};
use crate::config::ParquetCompression;
use crate::emit;
use crate::error::{
    ArtifactError, ArtifactSnafu, FinishSnafu, PipelineError, PublishSnafu, WriteSnafu,
    WriterClosedSnafu, WriterCreateSnafu,
};
use crate::metrics::events::ArtifactPublished;
use crate::storage::StorageProviderRef;

/// A successfully published artifact.
#[derive(Debug, Clone)]
pub struct PublishedArtifact {
    /// Full URL of the published object.
    pub url: String,
    /// Serialized size in bytes.
    pub size: usize,
    /// Rows in the artifact.
    pub rows: u64,
}

enum WriterState {
    /// Batches held in memory, serialized in one pass at publish.
    Buffered { batches: Vec<RecordBatch> },
    /// An open writer fed per batch; serialization is incremental.
    Streaming { writer: ArrowWriter<Vec<u8>> },
}

/// Writes one parquet artifact per run.
pub struct ArtifactWriter {
    storage: StorageProviderRef,
    key: Path,
    url: String,
    schema: SchemaRef,
    compression: ParquetCompression,
    state: Option<WriterState>,
    rows: u64,
}

impl ArtifactWriter {
    /// Writer that accumulates batches and serializes them all at publish.
    pub fn buffered(
        storage: StorageProviderRef,
        key: &str,
        schema: SchemaRef,
        compression: ParquetCompression,
    ) -> Self {
        let (key, url) = Self::locate(&storage, key);
        Self {
            storage,
            key,
            url,
            schema,
            compression,
            state: Some(WriterState::Buffered {
                batches: Vec::new(),
            }),
            rows: 0,
        }
    }

    /// Writer that serializes incrementally as batches arrive.
    pub fn streaming(
        storage: StorageProviderRef,
        key: &str,
        schema: SchemaRef,
        compression: ParquetCompression,
    ) -> Result<Self, ArtifactError> {
        let (key, url) = Self::locate(&storage, key);
        let writer = ArrowWriter::try_new(
            Vec::new(),
            schema.clone(),
            Some(writer_properties(compression)),
        )
        .context(WriterCreateSnafu)?;

        Ok(Self {
            storage,
            key,
            url,
            schema,
            compression,
            state: Some(WriterState::Streaming { writer }),
            rows: 0,
        })
    }

    fn locate(storage: &StorageProviderRef, key: &str) -> (Path, String) {
        let path = Path::from(key);
        let url = format!("{}/{}", storage.url().trim_end_matches('/'), path);
        (path, url)
    }

    /// Append one batch, preserving arrival order.
    pub fn write_batch(&mut self, batch: &RecordBatch) -> Result<(), ArtifactError> {
        match self.state.as_mut().context(WriterClosedSnafu)? {
            WriterState::Buffered { batches } => batches.push(batch.clone()),
            WriterState::Streaming { writer } => writer.write(batch).context(WriteSnafu)?,
        }
        self.rows += batch.num_rows() as u64;
        Ok(())
    }

    /// Rows accepted so far.
    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    /// Full URL of the artifact this writer publishes to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Serialize and upload the artifact in a single put.
    ///
    /// Consumes the writer state; later writes fail with `WriterClosed`.
    pub async fn publish(&mut self) -> Result<PublishedArtifact, ArtifactError> {
        let state = self.state.take().context(WriterClosedSnafu)?;

        let buffer = match state {
            WriterState::Buffered { batches } => {
                let mut writer = ArrowWriter::try_new(
                    Vec::new(),
                    self.schema.clone(),
                    Some(writer_properties(self.compression)),
                )
                .context(WriterCreateSnafu)?;
                for batch in &batches {
                    writer.write(batch).context(WriteSnafu)?;
                }
                writer.into_inner().context(FinishSnafu)?
            }
            WriterState::Streaming { writer } => writer.into_inner().context(FinishSnafu)?,
        };

        let bytes = Bytes::from(buffer);
        let size = bytes.len();
        self.storage
            .put_payload(&self.key, PutPayload::from(bytes))
            .await
            .context(PublishSnafu { url: &self.url })?;

        emit!(ArtifactPublished {
            rows: self.rows,
            bytes: size as u64,
        });
        tracing::info!(url = %self.url, rows = self.rows, size, "Published artifact");

        Ok(PublishedArtifact {
            url: self.url.clone(),
            size,
            rows: self.rows,
        })
    }
}

#[async_trait]
impl ChunkSink for ArtifactWriter {
    fn name(&self) -> &'static str {
        "parquet"
    }

    async fn write_chunk(
        &mut self,
        _chunk_index: usize,
        chunk: &RecordBatch,
    ) -> Result<(), PipelineError> {
        self.write_batch(chunk).context(ArtifactSnafu)
    }

    async fn finish(&mut self) -> Result<SinkReport, PipelineError> {
        let published = self.publish().await.context(ArtifactSnafu)?;
        Ok(SinkReport {
            rows: published.rows,
            bytes: Some(published.size as u64),
        })
    }
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    WriterProperties::builder()
        .set_compression(match compression {
            ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
            ParquetCompression::Snappy => Compression::SNAPPY,
            ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
            ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
            ParquetCompression::Lz4 => Compression::LZ4,
        })
        .build()
}
