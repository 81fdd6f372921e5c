//! Columnar artifact reader.
//!
//! The Silver stage reads its input artifact whole; post-normalization
//! datasets are small enough that the chunked discipline used on the raw
//! source is not needed here. This is an accepted scaling limit.

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use bytes::Bytes;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use snafu::prelude::*;

use crate::error::{ArrowSnafu, ArtifactError, EmptyArtifactSnafu, ReadSnafu};

/// A fully decoded columnar artifact.
#[derive(Debug, Clone)]
pub struct Artifact {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
    num_rows: usize,
}

impl Artifact {
    /// Decode every record batch of a parquet artifact.
    ///
    /// An artifact that decodes to zero rows is an error: no stage ever
    /// publishes one, so finding one means the upstream run was broken.
    pub fn decode(bytes: Bytes, url: &str) -> Result<Self, ArtifactError> {
        let builder = ParquetRecordBatchReaderBuilder::try_new(bytes).context(ReadSnafu { url })?;
        let schema = builder.schema().clone();
        let reader = builder.build().context(ReadSnafu { url })?;

        let batches = reader
            .collect::<Result<Vec<_>, _>>()
            .context(ArrowSnafu)?;
        let num_rows = batches.iter().map(|b| b.num_rows()).sum();
        ensure!(num_rows > 0, EmptyArtifactSnafu { url });

        Ok(Self {
            schema,
            batches,
            num_rows,
        })
    }

    /// The artifact's Arrow schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Decoded batches in artifact order.
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total row count across all batches.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Materialize the whole artifact as one batch for re-chunking.
    pub fn combined(&self) -> Result<RecordBatch, ArtifactError> {
        concat_batches(&self.schema, &self.batches).context(ArrowSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{ArrayRef, Int64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};
    use parquet::arrow::ArrowWriter;
    use std::sync::Arc;

    fn sample_batch(ids: Vec<i64>) -> RecordBatch {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("uf", DataType::Utf8, true),
        ]));
        let names: Vec<String> = ids.iter().map(|i| format!("uf{i}")).collect();
        RecordBatch::try_new(
            schema,
            vec![
                Arc::new(Int64Array::from(ids)) as ArrayRef,
                Arc::new(StringArray::from(names)) as ArrayRef,
            ],
        )
        .unwrap()
    }

    fn encode(batches: &[RecordBatch]) -> Bytes {
        let mut buf = Vec::new();
        let mut writer = ArrowWriter::try_new(&mut buf, batches[0].schema(), None).unwrap();
        for batch in batches {
            writer.write(batch).unwrap();
        }
        writer.close().unwrap();
        Bytes::from(buf)
    }

    #[test]
    fn test_decode_preserves_rows_and_schema() {
        let bytes = encode(&[sample_batch(vec![1, 2, 3])]);
        let artifact = Artifact::decode(bytes, "mem://test").unwrap();

        assert_eq!(artifact.num_rows(), 3);
        assert_eq!(artifact.schema().field(0).name(), "id");
        assert_eq!(artifact.schema().field(1).name(), "uf");
    }

    #[test]
    fn test_combined_keeps_batch_order() {
        let bytes = encode(&[sample_batch(vec![1, 2]), sample_batch(vec![3, 4])]);
        let artifact = Artifact::decode(bytes, "mem://test").unwrap();
        let combined = artifact.combined().unwrap();

        assert_eq!(combined.num_rows(), 4);
        let ids = combined
            .column(0)
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap();
        assert_eq!(ids.values().to_vec(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_zero_row_artifact_rejected() {
        let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int64, true)]));
        let mut buf = Vec::new();
        let writer = ArrowWriter::try_new(&mut buf, schema, None).unwrap();
        writer.close().unwrap();

        let err = Artifact::decode(Bytes::from(buf), "mem://empty").unwrap_err();
        assert!(matches!(err, ArtifactError::EmptyArtifact { .. }));
    }

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = Artifact::decode(Bytes::from_static(b"not parquet"), "mem://junk").unwrap_err();
        assert!(matches!(err, ArtifactError::Read { .. }));
    }
}
