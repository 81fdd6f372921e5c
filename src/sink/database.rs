//! Relational chunk sink.
//!
//! Loads chunks into the silver table over a sqlx `Any` pool so the same
//! code serves MySQL in deployment and SQLite in tests. Each chunk is one
//! transaction: it commits in full or the run aborts, and a failed chunk
//! is never retried here.

use arrow::array::{
    Array, ArrayRef, Date32Array, Float64Array, Int64Array, StringArray, Time32MillisecondArray,
};
use arrow::datatypes::{DataType, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::display::array_value_to_string;
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use snafu::prelude::*;
use sqlx::any::{install_default_drivers, AnyPoolOptions};
use sqlx::AnyPool;

use super::{ChunkSink, SinkReport};
use crate::emit;
use crate::error::{
    BeginSnafu, CommitSnafu, ConnectSnafu, CreateTableSnafu, DatabaseError, DatabaseSnafu,
    InsertSnafu, PingSnafu, PipelineError,
};
use crate::metrics::events::ChunkCommitted;
use crate::normalize::EPOCH_DAYS_FROM_CE;
use crate::schema::TableSchema;

/// SQLite caps host parameters at 32766 by default; MySQL allows 65535.
/// Splitting under the lower cap keeps one statement valid for both.
const MAX_BIND_PARAMS: usize = 32_766;

/// Rows one multi-row INSERT can carry without exceeding the bind cap.
fn rows_per_statement(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

enum SqlValue {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

/// Inserts loader chunks into the silver table, one transaction per chunk.
pub struct DatabaseSink {
    pool: AnyPool,
    schema: TableSchema,
    rows: u64,
}

impl DatabaseSink {
    /// Connect to the database and ensure the target table exists.
    pub async fn connect(dsn: &str, schema: TableSchema) -> Result<Self, DatabaseError> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(dsn)
            .await
            .context(ConnectSnafu)?;

        sqlx::query(&schema.create_table_ddl())
            .execute(&pool)
            .await
            .context(CreateTableSnafu {
                table: schema.table(),
            })?;
        tracing::debug!(table = schema.table(), "Ensured target table exists");

        Ok(Self {
            pool,
            schema,
            rows: 0,
        })
    }

    /// Open a connection, round-trip a trivial query, and drop the pool.
    ///
    /// No table is touched; callers use this to validate a DSN before
    /// any stage runs.
    pub async fn ping(dsn: &str) -> Result<(), DatabaseError> {
        install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect(dsn)
            .await
            .context(ConnectSnafu)?;
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .context(PingSnafu)?;
        pool.close().await;
        Ok(())
    }

    pub fn table(&self) -> &str {
        self.schema.table()
    }

    /// The underlying pool, for callers that verify loaded rows.
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    async fn insert_chunk(
        &mut self,
        chunk_index: usize,
        chunk: &RecordBatch,
    ) -> Result<(), DatabaseError> {
        let columns = chunk.num_columns();
        let rows = chunk.num_rows();
        if rows == 0 {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.context(BeginSnafu {
            chunk: chunk_index,
        })?;

        // The whole chunk commits atomically; the statement split below
        // only keeps each INSERT under the driver's bind-parameter cap.
        let per_statement = rows_per_statement(columns);
        let mut offset = 0;
        while offset < rows {
            let take = per_statement.min(rows - offset);
            let sql = self.statement_sql(columns, take);
            let mut query = sqlx::query(&sql);
            for row in offset..offset + take {
                for col in 0..columns {
                    query = match cell_value(chunk.column(col), row) {
                        SqlValue::Null => query.bind(None::<String>),
                        SqlValue::Int(value) => query.bind(value),
                        SqlValue::Float(value) => query.bind(value),
                        SqlValue::Text(value) => query.bind(value),
                    };
                }
            }
            query.execute(&mut *tx).await.context(InsertSnafu {
                chunk: chunk_index,
            })?;
            offset += take;
        }

        tx.commit().await.context(CommitSnafu {
            chunk: chunk_index,
        })?;

        self.rows += rows as u64;
        emit!(ChunkCommitted {
            chunk: chunk_index,
            rows: rows as u64,
        });
        Ok(())
    }

    fn statement_sql(&self, columns: usize, rows: usize) -> String {
        let group = format!("({})", vec!["?"; columns].join(", "));
        let values = vec![group; rows].join(", ");
        format!("{}{}", self.schema.insert_prefix(), values)
    }
}

#[async_trait]
impl ChunkSink for DatabaseSink {
    fn name(&self) -> &'static str {
        "database"
    }

    async fn write_chunk(
        &mut self,
        chunk_index: usize,
        chunk: &RecordBatch,
    ) -> Result<(), PipelineError> {
        self.insert_chunk(chunk_index, chunk)
            .await
            .context(DatabaseSnafu)
    }

    async fn finish(&mut self) -> Result<SinkReport, PipelineError> {
        self.pool.close().await;
        Ok(SinkReport {
            rows: self.rows,
            bytes: None,
        })
    }
}

/// Extract one cell as a bindable SQL value.
///
/// Arrow nulls and NaN floats become SQL NULL, never a literal string.
/// Dates render at midnight and times on the epoch date because the
/// synthesized column type for both is DATETIME.
fn cell_value(column: &ArrayRef, row: usize) -> SqlValue {
    if column.is_null(row) {
        return SqlValue::Null;
    }
    match column.data_type() {
        DataType::Int64 => {
            let Some(array) = column.as_any().downcast_ref::<Int64Array>() else {
                return SqlValue::Null;
            };
            SqlValue::Int(array.value(row))
        }
        DataType::Float64 => {
            let Some(array) = column.as_any().downcast_ref::<Float64Array>() else {
                return SqlValue::Null;
            };
            let value = array.value(row);
            if value.is_nan() {
                SqlValue::Null
            } else {
                SqlValue::Float(value)
            }
        }
        DataType::Date32 => {
            let Some(array) = column.as_any().downcast_ref::<Date32Array>() else {
                return SqlValue::Null;
            };
            match date_cell(array.value(row)) {
                Some(text) => SqlValue::Text(text),
                None => SqlValue::Null,
            }
        }
        DataType::Time32(TimeUnit::Millisecond) => {
            let Some(array) = column.as_any().downcast_ref::<Time32MillisecondArray>() else {
                return SqlValue::Null;
            };
            match time_cell(array.value(row)) {
                Some(text) => SqlValue::Text(text),
                None => SqlValue::Null,
            }
        }
        DataType::Utf8 => {
            let Some(array) = column.as_any().downcast_ref::<StringArray>() else {
                return SqlValue::Null;
            };
            SqlValue::Text(array.value(row).to_string())
        }
        _ => match array_value_to_string(column, row) {
            Ok(text) => SqlValue::Text(text),
            Err(_) => SqlValue::Null,
        },
    }
}

fn date_cell(days_since_epoch: i32) -> Option<String> {
    let date = NaiveDate::from_num_days_from_ce_opt(days_since_epoch + EPOCH_DAYS_FROM_CE)?;
    Some(format!("{} 00:00:00", date.format("%Y-%m-%d")))
}

fn time_cell(millis_since_midnight: i32) -> Option<String> {
    let seconds = u32::try_from(millis_since_midnight / 1000).ok()?;
    let time = NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0)?;
    Some(format!("1970-01-01 {}", time.format("%H:%M:%S")))
}
