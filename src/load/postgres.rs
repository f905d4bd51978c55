use anyhow::{Context, Result};
use arrow::{csv::WriterBuilder, datatypes::Schema, record_batch::RecordBatch};
use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use tracing::debug;

use super::TableSink;
use crate::{
    error::IngestError,
    schema::{copy_in_sql, create_table_sql, drop_table_sql, COPY_NULL},
};

/// Connection parameters, mirroring the loader's `--pg-*` flags.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl PgConfig {
    pub fn connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(&self.database)
    }
}

/// PostgreSQL-backed [`TableSink`]. Every statement runs on the same pooled
/// connection; each batch is its own implicit transaction.
pub struct PgSink {
    pool: PgPool,
}

impl PgSink {
    pub async fn connect(cfg: &PgConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_with(cfg.connect_options())
            .await
            .with_context(|| {
                format!(
                    "connecting to postgresql://{}@{}:{}/{}",
                    cfg.user, cfg.host, cfg.port, cfg.database
                )
            })?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl TableSink for PgSink {
    async fn replace_table(&self, table: &str, schema: &Schema) -> Result<()> {
        let create = create_table_sql(table, schema)?;
        let mut tx = self.pool.begin().await.context("starting transaction")?;
        sqlx::query(&drop_table_sql(table))
            .execute(&mut *tx)
            .await
            .with_context(|| format!("dropping {}", table))?;
        sqlx::query(&create)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("creating {}", table))?;
        tx.commit().await.context("committing schema")?;
        debug!(table, sql = %create, "schema replaced");
        Ok(())
    }

    async fn append_batch(&self, table: &str, batch: &RecordBatch) -> Result<u64> {
        let csv = encode_csv(batch)?;
        let statement = copy_in_sql(table, batch.schema().as_ref());

        let mut conn = self.pool.acquire().await.context("acquiring connection")?;
        let mut copy = conn
            .copy_in_raw(&statement)
            .await
            .with_context(|| format!("starting COPY into {}", table))?;
        copy.send(csv)
            .await
            .with_context(|| format!("streaming rows into {}", table))?;
        let written = copy
            .finish()
            .await
            .with_context(|| format!("finishing COPY into {}", table))?;

        let expected = batch.num_rows() as u64;
        if written != expected {
            return Err(IngestError::RowCountMismatch {
                table: table.to_string(),
                written,
                expected,
            }
            .into());
        }
        Ok(written)
    }
}

/// Render `batch` as headerless CSV in the shape `COPY ... (FORMAT csv, NULL '\N')`
/// reads: nulls are `\N`, empty strings stay empty, temporal values are ISO-8601.
pub fn encode_csv(batch: &RecordBatch) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .with_header(false)
        .with_null(COPY_NULL.to_string())
        .with_date_format("%Y-%m-%d".to_string())
        .with_time_format("%H:%M:%S%.f".to_string())
        .with_timestamp_format("%Y-%m-%d %H:%M:%S%.f".to_string())
        .with_timestamp_tz_format("%Y-%m-%d %H:%M:%S%.f%:z".to_string())
        .build(Vec::new());
    writer.write(batch).context("encoding batch as CSV")?;
    Ok(writer.into_inner())
}
