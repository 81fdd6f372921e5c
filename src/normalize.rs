//! Column normalization.
//!
//! Applies the per-column transforms that turn raw text cells into typed
//! values: decimal-separator fixes for coordinates, zero-filling for
//! casualty counts, and date/time parsing. Transforms are keyed on column
//! name and skip columns that are absent; a column that already carries
//! its normalized type passes through untouched, so applying the
//! normalizer to its own output is a no-op.
//!
//! Row counts are never changed. Date and time cells that fail to parse
//! coerce to null; coordinate and count cells that are non-empty but
//! unparseable abort the run instead, so bad records are never silently
//! dropped.

use arrow::array::{
    Array, ArrayRef, Date32Builder, Float64Builder, Int64Builder, StringArray, StringBuilder,
    Time32MillisecondBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use snafu::prelude::*;
use std::sync::Arc;

use crate::emit;
use crate::error::{
    BatchBuildSnafu, InvalidCoordinateSnafu, InvalidCountSnafu, NormalizeError, RaggedRowSnafu,
};
use crate::metrics::events::{BatchNormalized, NullValuesCoerced};
use crate::source::TextBatch;

/// Geographic coordinate columns carrying comma-decimal text.
pub const COORDINATE_COLUMNS: [&str; 2] = ["latitude", "longitude"];

/// Casualty-count columns where an empty cell means "not reported",
/// recorded as zero. A domain policy inherited from the source dataset.
pub const COUNT_COLUMNS: [&str; 3] = ["feridos_leves", "feridos_graves", "mortos"];

/// Accident date column, `YYYY-MM-DD`.
pub const DATE_COLUMN: &str = "data_inversa";

/// Accident time column, `HH:MM:SS`.
pub const TIME_COLUMN: &str = "horario";

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Days from 0001-01-01 (CE) to the unix epoch; Date32 counts from the latter.
pub(crate) const EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Coordinate,
    Count,
    Date,
    Time,
    Other,
}

fn classify(name: &str) -> ColumnKind {
    if COORDINATE_COLUMNS.contains(&name) {
        ColumnKind::Coordinate
    } else if COUNT_COLUMNS.contains(&name) {
        ColumnKind::Count
    } else if name == DATE_COLUMN {
        ColumnKind::Date
    } else if name == TIME_COLUMN {
        ColumnKind::Time
    } else {
        ColumnKind::Other
    }
}

/// A normalized batch plus the null/zero coercions applied to produce it.
///
/// The coercion counts feed the caller's null-rate policy; normalization
/// itself never aborts on them.
#[derive(Debug)]
pub struct NormalizedBatch {
    pub batch: RecordBatch,
    /// Per-column count of cells coerced to null (or zero, for counts).
    /// Only designated columns are tracked.
    pub null_coercions: Vec<(String, u64)>,
}

/// Column normalizer for one run.
///
/// Built from the source header once so every batch of the run maps to
/// the same schema.
pub struct Normalizer {
    schema: SchemaRef,
}

impl Normalizer {
    /// Plan the normalized schema for the given columns, in order.
    pub fn for_columns(columns: &[String]) -> Self {
        let fields: Vec<Field> = columns
            .iter()
            .map(|name| {
                let data_type = match classify(name) {
                    ColumnKind::Coordinate => DataType::Float64,
                    ColumnKind::Count => DataType::Int64,
                    ColumnKind::Date => DataType::Date32,
                    ColumnKind::Time => DataType::Time32(TimeUnit::Millisecond),
                    ColumnKind::Other => DataType::Utf8,
                };
                Field::new(name, data_type, true)
            })
            .collect();

        Self {
            schema: Arc::new(Schema::new(fields)),
        }
    }

    /// The schema every normalized batch of this run carries.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Normalize one batch of raw text rows.
    pub fn normalize(&self, batch: &TextBatch) -> Result<NormalizedBatch, NormalizeError> {
        let utf8 = text_to_utf8_batch(batch)?;
        self.normalize_batch(&utf8)
    }

    /// Normalize an already-columnar batch.
    ///
    /// Text columns get the full transform; columns that already carry
    /// their target type are passed through unchanged. Row indices in
    /// errors are relative to this batch.
    pub fn normalize_batch(&self, batch: &RecordBatch) -> Result<NormalizedBatch, NormalizeError> {
        let mut fields = Vec::with_capacity(batch.num_columns());
        let mut columns: Vec<ArrayRef> = Vec::with_capacity(batch.num_columns());
        let mut null_coercions = Vec::new();

        for (idx, field) in batch.schema().fields().iter().enumerate() {
            let array = batch.column(idx);
            let (array, nulls) = match classify(field.name()) {
                ColumnKind::Coordinate => normalize_coordinate(field.name(), array)?,
                ColumnKind::Count => normalize_count(field.name(), array)?,
                ColumnKind::Date => normalize_date(array),
                ColumnKind::Time => normalize_time(array),
                ColumnKind::Other => normalize_text(array),
            };
            if nulls > 0 {
                emit!(NullValuesCoerced {
                    column: field.name().clone(),
                    count: nulls,
                });
                null_coercions.push((field.name().clone(), nulls));
            }
            fields.push(Field::new(field.name(), array.data_type().clone(), true));
            columns.push(array);
        }

        let batch = RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)
            .context(BatchBuildSnafu)?;

        emit!(BatchNormalized {
            rows: batch.num_rows() as u64,
        });

        Ok(NormalizedBatch {
            batch,
            null_coercions,
        })
    }
}

/// Lift a text batch into an all-Utf8 record batch, empty cells kept as
/// empty strings. Every row must carry one cell per column; the reader
/// guarantees this, hand-built batches are checked. Typing happens in
/// `normalize_batch`.
fn text_to_utf8_batch(batch: &TextBatch) -> Result<RecordBatch, NormalizeError> {
    let width = batch.columns.len();
    for (row, cells) in batch.rows.iter().enumerate() {
        ensure!(
            cells.len() == width,
            RaggedRowSnafu {
                row,
                expected: width,
                found: cells.len(),
            }
        );
    }

    let fields: Vec<Field> = batch
        .columns
        .iter()
        .map(|name| Field::new(name, DataType::Utf8, true))
        .collect();

    let columns: Vec<ArrayRef> = (0..batch.columns.len())
        .map(|col| {
            let values: Vec<&str> = batch.rows.iter().map(|row| row[col].as_str()).collect();
            Arc::new(StringArray::from(values)) as ArrayRef
        })
        .collect();

    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).context(BatchBuildSnafu)
}

fn as_strings(array: &ArrayRef) -> Option<&StringArray> {
    array.as_any().downcast_ref::<StringArray>()
}

/// Comma-decimal text to Float64. Empty cells become null; a non-empty
/// cell that still fails to parse is a hard error.
fn normalize_coordinate(
    name: &str,
    array: &ArrayRef,
) -> Result<(ArrayRef, u64), NormalizeError> {
    if array.data_type() == &DataType::Float64 {
        return Ok((Arc::clone(array), 0));
    }
    let Some(strings) = as_strings(array) else {
        return Ok((Arc::clone(array), 0));
    };

    let mut builder = Float64Builder::with_capacity(strings.len());
    let mut nulls = 0u64;
    for row in 0..strings.len() {
        if strings.is_null(row) {
            builder.append_null();
            nulls += 1;
            continue;
        }
        let raw = strings.value(row).trim();
        if raw.is_empty() {
            builder.append_null();
            nulls += 1;
            continue;
        }
        let value = raw.replace(',', ".").parse::<f64>().ok().ok_or_else(|| {
            InvalidCoordinateSnafu {
                column: name,
                row,
                value: raw,
            }
            .build()
        })?;
        builder.append_value(value);
    }

    Ok((Arc::new(builder.finish()), nulls))
}

/// Count text to Int64, empty meaning zero. A non-empty non-integer cell
/// is a hard error rather than a truncation.
fn normalize_count(name: &str, array: &ArrayRef) -> Result<(ArrayRef, u64), NormalizeError> {
    if array.data_type() == &DataType::Int64 {
        return Ok((Arc::clone(array), 0));
    }
    let Some(strings) = as_strings(array) else {
        return Ok((Arc::clone(array), 0));
    };

    let mut builder = Int64Builder::with_capacity(strings.len());
    let mut zero_fills = 0u64;
    for row in 0..strings.len() {
        let raw = if strings.is_null(row) {
            ""
        } else {
            strings.value(row).trim()
        };
        if raw.is_empty() {
            builder.append_value(0);
            zero_fills += 1;
            continue;
        }
        let value = raw.parse::<i64>().ok().ok_or_else(|| {
            InvalidCountSnafu {
                column: name,
                row,
                value: raw,
            }
            .build()
        })?;
        builder.append_value(value);
    }

    Ok((Arc::new(builder.finish()), zero_fills))
}

/// `YYYY-MM-DD` text to Date32; anything unparseable becomes null.
fn normalize_date(array: &ArrayRef) -> (ArrayRef, u64) {
    if array.data_type() == &DataType::Date32 {
        return (Arc::clone(array), 0);
    }
    let Some(strings) = as_strings(array) else {
        return (Arc::clone(array), 0);
    };

    let mut builder = Date32Builder::with_capacity(strings.len());
    let mut nulls = 0u64;
    for row in 0..strings.len() {
        let parsed = if strings.is_null(row) {
            None
        } else {
            NaiveDate::parse_from_str(strings.value(row).trim(), DATE_FORMAT).ok()
        };
        match parsed {
            Some(date) => builder.append_value(date.num_days_from_ce() - EPOCH_DAYS_FROM_CE),
            None => {
                builder.append_null();
                nulls += 1;
            }
        }
    }

    (Arc::new(builder.finish()), nulls)
}

/// `HH:MM:SS` text to Time32 milliseconds; anything unparseable becomes null.
fn normalize_time(array: &ArrayRef) -> (ArrayRef, u64) {
    if array.data_type() == &DataType::Time32(TimeUnit::Millisecond) {
        return (Arc::clone(array), 0);
    }
    let Some(strings) = as_strings(array) else {
        return (Arc::clone(array), 0);
    };

    let mut builder = Time32MillisecondBuilder::with_capacity(strings.len());
    let mut nulls = 0u64;
    for row in 0..strings.len() {
        let parsed = if strings.is_null(row) {
            None
        } else {
            NaiveTime::parse_from_str(strings.value(row).trim(), TIME_FORMAT).ok()
        };
        match parsed {
            Some(time) => {
                builder.append_value(time.num_seconds_from_midnight() as i32 * 1000);
            }
            None => {
                builder.append_null();
                nulls += 1;
            }
        }
    }

    (Arc::new(builder.finish()), nulls)
}

/// Pass-through for undesignated columns; empty text cells become null so
/// downstream sinks see a real null marker instead of "".
fn normalize_text(array: &ArrayRef) -> (ArrayRef, u64) {
    let Some(strings) = as_strings(array) else {
        return (Arc::clone(array), 0);
    };

    let mut builder = StringBuilder::new();
    for row in 0..strings.len() {
        if strings.is_null(row) || strings.value(row).is_empty() {
            builder.append_null();
        } else {
            builder.append_value(strings.value(row));
        }
    }

    (Arc::new(builder.finish()), 0)
}
