//! Chunked CSV reader.
//!
//! Reads a delimited source file as a lazy sequence of fixed-size batches
//! of decoded text rows. Peak memory is bounded by the batch size, not the
//! file size. Any unrecoverable parse error (unreadable file, column-count
//! mismatch, undecodable bytes) fails the run; rows are never silently
//! dropped.

use csv::{ByteRecord, ReaderBuilder};
use encoding_rs::Encoding;
use snafu::prelude::*;
use std::fs::File;
use std::sync::Arc;
use tracing::debug;

use crate::emit;
use crate::error::{CsvSnafu, DecodeSnafu, EmptyInputSnafu, SourceError};
use crate::metrics::events::RowsRead;

/// Configuration for the chunked CSV reader.
#[derive(Debug, Clone)]
pub struct CsvReaderConfig {
    /// Field delimiter byte.
    pub delimiter: u8,
    /// Text encoding of the source file.
    pub encoding: &'static Encoding,
    /// Maximum rows per batch.
    pub batch_size: usize,
}

impl CsvReaderConfig {
    /// Create a new reader configuration.
    pub fn new(delimiter: u8, encoding: &'static Encoding, batch_size: usize) -> Self {
        Self {
            delimiter,
            encoding,
            batch_size,
        }
    }
}

/// One batch of decoded rows, in file order.
///
/// Every row has exactly one cell per column; empty cells are empty
/// strings until normalization assigns them a typed meaning.
#[derive(Debug, Clone)]
pub struct TextBatch {
    /// Column names from the header row, shared across batches.
    pub columns: Arc<Vec<String>>,
    /// Row-major cells.
    pub rows: Vec<Vec<String>>,
}

impl TextBatch {
    /// Number of rows in this batch.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

/// A reader for delimited text files that yields fixed-size batches.
pub struct CsvReader {
    config: CsvReaderConfig,
}

impl CsvReader {
    /// Create a new CSV reader with the given configuration.
    pub fn new(config: CsvReaderConfig) -> Self {
        Self { config }
    }

    /// Open a source file and return the lazy batch sequence.
    ///
    /// The header row is decoded eagerly; data rows are pulled from the
    /// file as batches are consumed.
    pub fn open(&self, path: &str) -> Result<CsvBatches, SourceError> {
        let mut reader = ReaderBuilder::new()
            .delimiter(self.config.delimiter)
            .has_headers(true)
            .flexible(false)
            .from_path(path)
            .context(CsvSnafu { path })?;

        let header = reader.byte_headers().context(CsvSnafu { path })?.clone();
        let mut columns = Vec::with_capacity(header.len());
        for (idx, field) in header.iter().enumerate() {
            let name = decode_field(self.config.encoding, field).ok_or_else(|| {
                DecodeSnafu {
                    path,
                    row: 0u64,
                    column: format!("#{idx}"),
                }
                .build()
            })?;
            columns.push(name);
        }

        debug!(path, columns = columns.len(), "Opened source file");

        Ok(CsvBatches {
            reader,
            columns: Arc::new(columns),
            encoding: self.config.encoding,
            batch_size: self.config.batch_size,
            path: path.to_string(),
            row: 0,
            yielded_rows: 0,
            done: false,
        })
    }
}

/// Lazy iterator over fixed-size batches of a source file.
///
/// For a file of R data rows and batch size N this yields ceil(R/N)
/// batches whose sizes sum to R; only the final batch may be short.
/// A file with a header but no data rows is an error, not an empty
/// sequence. After the first error the iterator is exhausted.
pub struct CsvBatches {
    reader: csv::Reader<File>,
    columns: Arc<Vec<String>>,
    encoding: &'static Encoding,
    batch_size: usize,
    path: String,
    row: u64,
    yielded_rows: u64,
    done: bool,
}

impl CsvBatches {
    /// Column names from the header row.
    pub fn columns(&self) -> &Arc<Vec<String>> {
        &self.columns
    }

    fn decode_row(&self, record: &ByteRecord) -> Result<Vec<String>, SourceError> {
        let mut cells = Vec::with_capacity(record.len());
        for (idx, field) in record.iter().enumerate() {
            let cell = decode_field(self.encoding, field).ok_or_else(|| {
                DecodeSnafu {
                    path: self.path.clone(),
                    row: self.row,
                    column: self
                        .columns
                        .get(idx)
                        .cloned()
                        .unwrap_or_else(|| format!("#{idx}")),
                }
                .build()
            })?;
            cells.push(cell);
        }
        Ok(cells)
    }

    fn read_batch(&mut self) -> Result<Option<TextBatch>, SourceError> {
        let mut rows = Vec::new();
        let mut record = ByteRecord::new();

        while rows.len() < self.batch_size {
            let more = self
                .reader
                .read_byte_record(&mut record)
                .context(CsvSnafu {
                    path: self.path.clone(),
                })?;
            if !more {
                break;
            }
            self.row += 1;
            rows.push(self.decode_row(&record)?);
        }

        if rows.is_empty() {
            // End of file. A run that read nothing at all is a failed run.
            if self.yielded_rows == 0 {
                return EmptyInputSnafu {
                    path: self.path.clone(),
                }
                .fail();
            }
            return Ok(None);
        }

        self.yielded_rows += rows.len() as u64;
        emit!(RowsRead {
            rows: rows.len() as u64,
        });

        Ok(Some(TextBatch {
            columns: Arc::clone(&self.columns),
            rows,
        }))
    }
}

impl Iterator for CsvBatches {
    type Item = Result<TextBatch, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_batch() {
            Ok(Some(batch)) => Some(Ok(batch)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Strict decode: a malformed byte sequence is `None`, never a
/// replacement character.
fn decode_field(encoding: &'static Encoding, bytes: &[u8]) -> Option<String> {
    encoding
        .decode_without_bom_handling_and_without_replacement(bytes)
        .map(|s| s.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &[u8]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    fn reader(batch_size: usize) -> CsvReader {
        CsvReader::new(CsvReaderConfig::new(
            b';',
            encoding_rs::WINDOWS_1252,
            batch_size,
        ))
    }

    fn batch_sizes(path: &str, batch_size: usize) -> Vec<usize> {
        reader(batch_size)
            .open(path)
            .unwrap()
            .map(|b| b.unwrap().num_rows())
            .collect()
    }

    fn seven_row_file() -> NamedTempFile {
        let mut content = b"id;uf\n".to_vec();
        for i in 0..7 {
            content.extend_from_slice(format!("{i};DF\n").as_bytes());
        }
        write_csv(&content)
    }

    #[test]
    fn test_batches_partition_all_rows() {
        let file = seven_row_file();
        let path = file.path().to_str().unwrap();

        // 7 rows, batch size 3: ceil(7/3) = 3 batches, last one short
        assert_eq!(batch_sizes(path, 3), vec![3, 3, 1]);
        // exact fit
        assert_eq!(batch_sizes(path, 7), vec![7]);
        // batch larger than file
        assert_eq!(batch_sizes(path, 100), vec![7]);
    }

    #[test]
    fn test_exact_multiple_has_full_final_batch() {
        let mut content = b"id\n".to_vec();
        for i in 0..6 {
            content.extend_from_slice(format!("{i}\n").as_bytes());
        }
        let file = write_csv(&content);
        assert_eq!(batch_sizes(file.path().to_str().unwrap(), 3), vec![3, 3]);
    }

    #[test]
    fn test_rows_arrive_in_file_order() {
        let file = seven_row_file();
        let batches: Vec<TextBatch> = reader(3)
            .open(file.path().to_str().unwrap())
            .unwrap()
            .map(|b| b.unwrap())
            .collect();

        let ids: Vec<String> = batches
            .iter()
            .flat_map(|b| b.rows.iter().map(|r| r[0].clone()))
            .collect();
        assert_eq!(ids, vec!["0", "1", "2", "3", "4", "5", "6"]);
        assert_eq!(*batches[0].columns, vec!["id", "uf"]);
    }

    #[test]
    fn test_header_only_file_fails() {
        let file = write_csv(b"id;uf\n");
        let mut batches = reader(10).open(file.path().to_str().unwrap()).unwrap();

        let err = batches.next().unwrap().unwrap_err();
        assert!(matches!(err, SourceError::EmptyInput { .. }));
        // the iterator is exhausted after the error
        assert!(batches.next().is_none());
    }

    #[test]
    fn test_column_count_mismatch_fails() {
        let file = write_csv(b"a;b;c\n1;2;3\n1;2\n");
        let results: Vec<_> = reader(10)
            .open(file.path().to_str().unwrap())
            .unwrap()
            .collect();

        // first batch attempt dies on the short row
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].as_ref().unwrap_err(),
            SourceError::Csv { .. }
        ));
    }

    #[test]
    fn test_latin1_bytes_decode() {
        // "São Paulo" in latin1: 0xE3 for ã
        let file = write_csv(b"municipio\nS\xE3o Paulo\n");
        let batch = reader(10)
            .open(file.path().to_str().unwrap())
            .unwrap()
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(batch.rows[0][0], "São Paulo");
    }

    #[test]
    fn test_undecodable_bytes_fail_run() {
        // 0xFF is never valid UTF-8
        let file = write_csv(b"municipio\nbad\xFFcity\n");
        let csv = CsvReader::new(CsvReaderConfig::new(b';', encoding_rs::UTF_8, 10));
        let err = csv
            .open(file.path().to_str().unwrap())
            .unwrap()
            .next()
            .unwrap()
            .unwrap_err();
        match err {
            SourceError::Decode { row, column, .. } => {
                assert_eq!(row, 1);
                assert_eq!(column, "municipio");
            }
            other => panic!("expected Decode error, got {other:?}"),
        }
    }
}
