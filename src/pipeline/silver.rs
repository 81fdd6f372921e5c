//! Silver stage: bronze artifact to relational table plus silver artifact.

use arrow::record_batch::RecordBatch;
use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{ArtifactSnafu, DatabaseSnafu, PipelineError, StorageSnafu};
use crate::schema::TableSchema;
use crate::sink::{ArtifactWriter, ChunkSink, DatabaseSink};
use crate::source::Artifact;
use crate::storage::StorageProvider;

/// Statistics about one silver run.
#[derive(Debug, Clone, Default)]
pub struct SilverStats {
    pub rows_loaded: u64,
    pub chunks: usize,
    pub table: String,
    pub artifact_url: String,
    pub artifact_size: usize,
}

/// Run the silver stage end to end: fetch the bronze artifact, synthesize
/// the table, load chunks into both sinks in order, publish.
///
/// The relational sink is written before the artifact sink for every
/// chunk, and chunk N is fully committed before chunk N+1 starts. The run
/// aborts on the first sink error; already-committed chunks stay
/// committed and nothing is retried here.
pub async fn run_silver(config: &Config) -> Result<SilverStats, PipelineError> {
    let start = Instant::now();
    let bronze_storage = Arc::new(
        StorageProvider::for_url_with_options(
            &config.bronze.url,
            config.bronze.storage_options.clone(),
        )
        .await
        .context(StorageSnafu)?,
    );
    let bronze_url = format!(
        "{}/{}",
        bronze_storage.url().trim_end_matches('/'),
        config.bronze.key
    );
    info!(url = %bronze_url, "Starting silver run");

    let bytes = bronze_storage
        .get(config.bronze.key.as_str())
        .await
        .context(StorageSnafu)?;
    let artifact = Artifact::decode(bytes, &bronze_url).context(ArtifactSnafu)?;
    info!(
        rows = artifact.num_rows(),
        columns = artifact.schema().fields().len(),
        "Decoded bronze artifact"
    );

    let table_schema = TableSchema::synthesize(&config.database.table, artifact.schema());
    let database = DatabaseSink::connect(&config.database.dsn, table_schema)
        .await
        .context(DatabaseSnafu)?;

    let silver_storage = Arc::new(
        StorageProvider::for_url_with_options(
            &config.silver.url,
            config.silver.storage_options.clone(),
        )
        .await
        .context(StorageSnafu)?,
    );
    let writer = ArtifactWriter::streaming(
        silver_storage,
        &config.silver.key,
        artifact.schema().clone(),
        config.parquet.compression,
    )
    .context(ArtifactSnafu)?;
    let artifact_url = writer.url().to_string();

    // Relational table first, silver artifact second, for every chunk.
    let mut sinks: Vec<Box<dyn ChunkSink>> = vec![Box::new(database), Box::new(writer)];

    let combined = artifact.combined().context(ArtifactSnafu)?;
    let mut stats = SilverStats {
        table: config.database.table.clone(),
        artifact_url,
        ..SilverStats::default()
    };

    for (index, chunk) in chunk_rows(&combined, config.database.chunk_size).enumerate() {
        for sink in sinks.iter_mut() {
            sink.write_chunk(index, &chunk).await?;
        }
        stats.chunks += 1;
        debug!(chunk = index, rows = chunk.num_rows(), "Chunk loaded");
    }

    let mut reports = Vec::with_capacity(sinks.len());
    for sink in sinks.iter_mut() {
        let report = sink.finish().await?;
        info!(sink = sink.name(), rows = report.rows, "Sink finished");
        reports.push(report);
    }

    stats.rows_loaded = reports[0].rows;
    stats.artifact_size = reports[1].bytes.unwrap_or(0) as usize;

    info!(
        rows = stats.rows_loaded,
        chunks = stats.chunks,
        table = %stats.table,
        url = %stats.artifact_url,
        elapsed_ms = start.elapsed().as_millis(),
        "Silver run complete"
    );
    Ok(stats)
}

/// Sequentially slice a batch into chunks of at most `chunk_size` rows.
/// Slices are zero-copy views; the final chunk may be smaller.
fn chunk_rows(batch: &RecordBatch, chunk_size: usize) -> impl Iterator<Item = RecordBatch> + '_ {
    let total = batch.num_rows();
    (0..total)
        .step_by(chunk_size.max(1))
        .map(move |offset| batch.slice(offset, chunk_size.min(total - offset)))
}
