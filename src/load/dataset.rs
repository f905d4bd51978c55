use anyhow::{Context, Result};
use arrow::{compute::concat_batches, datatypes::SchemaRef, record_batch::RecordBatch};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use std::{fs::File, ops::Range, path::Path};
use tracing::debug;

/// A whole Parquet file held in memory as a single Arrow batch.
#[derive(Debug, Clone)]
pub struct Dataset {
    batch: RecordBatch,
}

impl Dataset {
    pub fn new(batch: RecordBatch) -> Self {
        Self { batch }
    }

    /// Read every row group of `path` and concatenate them. No streaming:
    /// the file must fit in memory.
    pub fn read_parquet(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file =
            File::open(path).with_context(|| format!("opening parquet file {}", path.display()))?;
        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .with_context(|| format!("reading parquet metadata from {}", path.display()))?;
        let schema = builder.schema().clone();
        let reader = builder.build().context("building parquet reader")?;

        let batches = reader
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("decoding {}", path.display()))?;
        debug!(file = %path.display(), parts = batches.len(), "read parquet");

        let batch = concat_batches(&schema, &batches).context("concatenating record batches")?;
        Ok(Self { batch })
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Zero-copy view of rows `range`.
    pub fn rows(&self, range: Range<usize>) -> RecordBatch {
        self.batch.slice(range.start, range.len())
    }
}
