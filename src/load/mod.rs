//! One-shot Parquet → PostgreSQL loader.
//!
//! The whole file is read into memory, the target table is dropped and
//! recreated from the file's schema, then rows go in with one `COPY` per
//! batch. Batches commit independently: a failure part-way leaves the
//! earlier batches in place.

pub mod dataset;
pub mod postgres;

use anyhow::Result;
use arrow::{datatypes::Schema, record_batch::RecordBatch};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use std::{ops::Range, path::PathBuf};
use tracing::{info, instrument};

use crate::error::IngestError;
pub use dataset::Dataset;
pub use postgres::{PgConfig, PgSink};

/// Write side of the loader.
#[async_trait]
pub trait TableSink {
    /// Drop `table` if present and create it empty with `schema`'s columns.
    async fn replace_table(&self, table: &str, schema: &Schema) -> Result<()>;

    /// Append `batch` to `table`, returning the number of rows written.
    async fn append_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64>;
}

/// Everything the loader needs besides the database connection.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub parquet_file: PathBuf,
    pub target_table: String,
    pub batch_size: usize,
}

impl LoadConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(IngestError::InvalidConfig("chunksize must be at least 1".into()).into());
        }
        if self.target_table.trim().is_empty() {
            return Err(IngestError::InvalidConfig("target table name is empty".into()).into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub rows: u64,
    pub batches: usize,
}

/// Split `rows` into contiguous ranges of at most `batch_size`;
/// `ceil(rows / batch_size)` of them, ascending.
pub fn plan_batches(rows: usize, batch_size: usize) -> Vec<Range<usize>> {
    if batch_size == 0 {
        return Vec::new();
    }
    (0..rows)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(rows))
        .collect()
}

pub fn progress_bar(len: u64, table: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{msg} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(format!("Writing to {}", table));
    pb
}

/// Recreate `table` from `dataset`'s schema and append its rows batch by batch.
/// Any sink error aborts the load immediately.
#[instrument(level = "info", skip(sink, dataset, progress), fields(rows = dataset.num_rows()))]
pub async fn load_dataset<S: TableSink + ?Sized>(
    sink: &S,
    dataset: &Dataset,
    table: &str,
    batch_size: usize,
    progress: &ProgressBar,
) -> Result<LoadReport> {
    if batch_size == 0 {
        return Err(IngestError::InvalidConfig("chunksize must be at least 1".into()).into());
    }

    sink.replace_table(table, dataset.schema().as_ref()).await?;
    info!(table, columns = dataset.schema().fields().len(), "table recreated");

    let plan = plan_batches(dataset.num_rows(), batch_size);
    let total = plan.len();
    progress.set_length(total as u64);

    let mut report = LoadReport::default();
    for (idx, range) in plan.into_iter().enumerate() {
        let batch = dataset.rows(range.clone());
        let written = sink.append_batch(table, &batch).await?;
        report.rows += written;
        report.batches += 1;
        progress.inc(1);
        info!(
            batch = idx + 1,
            of = total,
            start = range.start,
            rows = written,
            "batch written"
        );
    }
    progress.finish();

    Ok(report)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::load::dataset::tests::trips;
    use anyhow::anyhow;
    use arrow::array::Array;
    use std::sync::Mutex;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Replace { table: String, columns: Vec<String> },
        Append { table: String, rows: usize, first_id: Option<i32> },
    }

    /// Records calls; optionally fails the n-th append (0-based).
    #[derive(Default)]
    pub(crate) struct RecordingSink {
        pub calls: Mutex<Vec<Call>>,
        pub fail_append_at: Option<usize>,
    }

    impl RecordingSink {
        fn appends(&self) -> Vec<usize> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter_map(|c| match c {
                    Call::Append { rows, .. } => Some(*rows),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl TableSink for RecordingSink {
        async fn replace_table(&self, table: &str, schema: &Schema) -> Result<()> {
            self.calls.lock().unwrap().push(Call::Replace {
                table: table.to_string(),
                columns: schema.fields().iter().map(|f| f.name().clone()).collect(),
            });
            Ok(())
        }

        async fn append_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64> {
            let mut calls = self.calls.lock().unwrap();
            let done = calls
                .iter()
                .filter(|c| matches!(c, Call::Append { .. }))
                .count();
            if self.fail_append_at == Some(done) {
                return Err(anyhow!("connection reset"));
            }
            let first_id = batch
                .column(0)
                .as_any()
                .downcast_ref::<arrow::array::Int32Array>()
                .filter(|a| !a.is_empty())
                .map(|a| a.value(0));
            calls.push(Call::Append {
                table: table.to_string(),
                rows: batch.num_rows(),
                first_id,
            });
            Ok(batch.num_rows() as u64)
        }
    }

    #[test]
    fn test_plan_batches_counts() {
        let plan = plan_batches(250_000, 100_000);
        assert_eq!(plan, vec![0..100_000, 100_000..200_000, 200_000..250_000]);

        assert_eq!(plan_batches(10, 10), vec![0..10]);
        assert_eq!(plan_batches(3, 100_000), vec![0..3]);
        assert!(plan_batches(0, 100).is_empty());
        assert!(plan_batches(5, 0).is_empty());

        for (rows, size) in [(1, 1), (7, 3), (99, 10), (1000, 7)] {
            let plan = plan_batches(rows, size);
            assert_eq!(plan.len(), (rows + size - 1) / size);
            assert_eq!(plan.iter().map(|r| r.len()).sum::<usize>(), rows);
        }
    }

    #[tokio::test]
    async fn test_load_creates_schema_then_appends_in_order() {
        let sink = RecordingSink::default();
        let ds = Dataset::new(trips(25));

        let report = load_dataset(&sink, &ds, "green_taxi", 10, &ProgressBar::hidden())
            .await
            .unwrap();
        assert_eq!(report, LoadReport { rows: 25, batches: 3 });

        let calls = sink.calls.lock().unwrap().clone();
        assert_eq!(
            calls[0],
            Call::Replace {
                table: "green_taxi".into(),
                columns: vec![
                    "VendorID".into(),
                    "store_and_fwd_flag".into(),
                    "trip_distance".into()
                ],
            }
        );
        let firsts: Vec<Option<i32>> = calls[1..]
            .iter()
            .map(|c| match c {
                Call::Append { first_id, .. } => *first_id,
                _ => panic!("replace after append"),
            })
            .collect();
        assert_eq!(firsts, vec![Some(0), Some(10), Some(20)]);
        assert_eq!(sink.appends(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn test_empty_dataset_creates_table_without_batches() {
        let sink = RecordingSink::default();
        let ds = Dataset::new(trips(0));
        let pb = ProgressBar::hidden();

        let report = load_dataset(&sink, &ds, "empty", 100_000, &pb).await.unwrap();
        assert_eq!(report, LoadReport::default());
        assert_eq!(pb.position(), 0);

        let calls = sink.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(matches!(&calls[0], Call::Replace { table, .. } if table == "empty"));
    }

    #[tokio::test]
    async fn test_batch_size_larger_than_rows_is_one_batch() {
        let sink = RecordingSink::default();
        let ds = Dataset::new(trips(7));
        let pb = ProgressBar::hidden();

        load_dataset(&sink, &ds, "t", 100_000, &pb).await.unwrap();
        assert_eq!(sink.appends(), vec![7]);
        assert_eq!(pb.position(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_stops_the_load() {
        let sink = RecordingSink {
            fail_append_at: Some(1),
            ..Default::default()
        };
        let ds = Dataset::new(trips(30));

        let err = load_dataset(&sink, &ds, "t", 10, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("connection reset"));
        // the first batch stays written, nothing after the failure is attempted
        assert_eq!(sink.appends(), vec![10]);
    }

    #[tokio::test]
    async fn test_zero_batch_size_is_rejected_before_any_write() {
        let sink = RecordingSink::default();
        let ds = Dataset::new(trips(3));
        let err = load_dataset(&sink, &ds, "t", 0, &ProgressBar::hidden())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<IngestError>(),
            Some(IngestError::InvalidConfig(_))
        ));
        assert!(sink.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_config_validation() {
        let mut cfg = LoadConfig {
            parquet_file: "green_tripdata_2025-11.parquet".into(),
            target_table: "yellow_taxi_data".into(),
            batch_size: 100_000,
        };
        assert!(cfg.validate().is_ok());
        cfg.batch_size = 0;
        assert!(cfg.validate().is_err());
        cfg.batch_size = 1;
        cfg.target_table = "  ".into();
        assert!(cfg.validate().is_err());
    }
}
