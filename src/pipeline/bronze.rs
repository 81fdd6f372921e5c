//! Bronze stage: raw delimited source to normalized parquet artifact.

use snafu::prelude::*;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{ArtifactSnafu, NormalizeSnafu, PipelineError, SourceSnafu, StorageSnafu};
use crate::normalize::Normalizer;
use crate::sink::ArtifactWriter;
use crate::source::{CsvReader, CsvReaderConfig};
use crate::storage::StorageProvider;

/// Statistics about one bronze run.
#[derive(Debug, Clone, Default)]
pub struct BronzeStats {
    pub rows_read: u64,
    pub batches: usize,
    pub null_coercions: u64,
    pub artifact_url: String,
    pub artifact_size: usize,
}

/// Run the bronze stage end to end: read, normalize, publish.
///
/// Any malformed row or unparseable designated cell fails the whole run;
/// nothing is published on failure.
pub async fn run_bronze(config: &Config) -> Result<BronzeStats, PipelineError> {
    let start = Instant::now();
    info!(
        path = %config.source.path,
        url = %config.bronze.url,
        "Starting bronze run"
    );

    let storage = Arc::new(
        StorageProvider::for_url_with_options(
            &config.bronze.url,
            config.bronze.storage_options.clone(),
        )
        .await
        .context(StorageSnafu)?,
    );

    let reader = CsvReader::new(CsvReaderConfig::new(
        config.source.delimiter_byte(),
        config.source.resolved_encoding(),
        config.source.batch_size,
    ));
    let batches = reader.open(&config.source.path).context(SourceSnafu)?;

    let normalizer = Normalizer::for_columns(batches.columns());
    let mut writer = ArtifactWriter::buffered(
        storage,
        &config.bronze.key,
        normalizer.schema(),
        config.parquet.compression,
    );

    let mut stats = BronzeStats::default();
    for (index, batch) in batches.enumerate() {
        let batch = batch.context(SourceSnafu)?;
        let rows = batch.num_rows();

        let normalized = normalizer.normalize(&batch).context(NormalizeSnafu)?;
        for (column, rate) in columns_over_warn_rate(
            rows,
            &normalized.null_coercions,
            config.normalize.warn_null_rate,
        ) {
            warn!(
                batch = index,
                column = %column,
                rate,
                "High null-coercion rate"
            );
        }

        writer.write_batch(&normalized.batch).context(ArtifactSnafu)?;
        stats.rows_read += rows as u64;
        stats.batches += 1;
        stats.null_coercions += normalized
            .null_coercions
            .iter()
            .map(|(_, count)| count)
            .sum::<u64>();
        debug!(batch = index, rows, "Normalized batch");
    }

    let published = writer.publish().await.context(ArtifactSnafu)?;
    stats.artifact_url = published.url;
    stats.artifact_size = published.size;

    info!(
        rows = stats.rows_read,
        batches = stats.batches,
        null_coercions = stats.null_coercions,
        url = %stats.artifact_url,
        elapsed_ms = start.elapsed().as_millis(),
        "Bronze run complete"
    );
    Ok(stats)
}

/// The null-rate hook: report-only, never aborts.
///
/// Returns the columns whose coercion rate in this batch is strictly
/// above `warn_rate`; a rate exactly at the threshold stays quiet.
fn columns_over_warn_rate(
    rows: usize,
    coercions: &[(String, u64)],
    warn_rate: f64,
) -> Vec<(String, f64)> {
    if rows == 0 {
        return Vec::new();
    }
    let mut over = Vec::new();
    for (column, count) in coercions {
        let rate = *count as f64 / rows as f64;
        if rate > warn_rate {
            over.push((column.clone(), rate));
        }
    }
    over
}
