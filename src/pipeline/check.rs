//! Configuration check: verify every endpoint a run would touch answers.

use snafu::prelude::*;
use tracing::debug;

use crate::config::Config;
use crate::error::{DatabaseSnafu, PipelineError, SourceSnafu, StorageSnafu};
use crate::sink::DatabaseSink;
use crate::source::{CsvReader, CsvReaderConfig};
use crate::storage::StorageProvider;

/// Validate a configuration against its endpoints without writing to
/// any sink: the source file must open with a decodable header, both
/// content stores must answer, and the database must accept a
/// connection. No artifact is published and no table is created.
pub async fn run_check(config: &Config) -> Result<(), PipelineError> {
    let reader = CsvReader::new(CsvReaderConfig::new(
        config.source.delimiter_byte(),
        config.source.resolved_encoding(),
        config.source.batch_size,
    ));
    let source = reader.open(&config.source.path).context(SourceSnafu)?;
    debug!(
        path = %config.source.path,
        columns = source.columns().len(),
        "Source file is readable"
    );

    for (stage, url, key, options) in [
        (
            "bronze",
            &config.bronze.url,
            &config.bronze.key,
            &config.bronze.storage_options,
        ),
        (
            "silver",
            &config.silver.url,
            &config.silver.key,
            &config.silver.storage_options,
        ),
    ] {
        let storage = StorageProvider::for_url_with_options(url, options.clone())
            .await
            .context(StorageSnafu)?;
        storage.check(key.as_str()).await.context(StorageSnafu)?;
        debug!(stage, url = storage.url(), "Content store answered");
    }

    DatabaseSink::ping(&config.database.dsn)
        .await
        .context(DatabaseSnafu)?;
    debug!("Database answered");

    Ok(())
}
