use anyhow::Result;
use clap::Parser;
use std::{path::PathBuf, time::Instant};
use tracing::info;
use tripdata::{
    load::{self, Dataset, LoadConfig, PgConfig, PgSink},
    logging,
};

/// Ingest taxi data from a parquet file into a PostgreSQL table.
#[derive(Parser, Debug)]
struct Args {
    /// PostgreSQL user
    #[arg(long, default_value = "postgres")]
    pg_user: String,

    /// PostgreSQL password
    #[arg(long, default_value = "postgres")]
    pg_pass: String,

    /// PostgreSQL host
    #[arg(long, default_value = "localhost")]
    pg_host: String,

    /// PostgreSQL port
    #[arg(long, default_value_t = 5432)]
    pg_port: u16,

    /// PostgreSQL database name
    #[arg(long, default_value = "ny_taxi")]
    pg_db: String,

    /// Parquet file to ingest
    #[arg(long, default_value = "green_tripdata_2025-11.parquet")]
    parquet_file: PathBuf,

    /// Target table name (dropped and recreated on every run)
    #[arg(long, default_value = "yellow_taxi_data")]
    target_table: String,

    /// Rows per insert batch
    #[arg(long, default_value_t = 100_000)]
    chunksize: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info");
    let args = Args::parse();

    let cfg = LoadConfig {
        parquet_file: args.parquet_file,
        target_table: args.target_table,
        batch_size: args.chunksize,
    };
    cfg.validate()?;
    let pg = PgConfig {
        user: args.pg_user,
        password: args.pg_pass,
        host: args.pg_host,
        port: args.pg_port,
        database: args.pg_db,
    };

    let start = Instant::now();
    let sink = PgSink::connect(&pg).await?;

    // decoding is CPU-bound; keep it off the async workers
    let dataset = tokio::task::spawn_blocking({
        let path = cfg.parquet_file.clone();
        move || Dataset::read_parquet(path)
    })
    .await??;
    info!(
        file = %cfg.parquet_file.display(),
        rows = dataset.num_rows(),
        columns = dataset.schema().fields().len(),
        "dataset loaded"
    );

    let batches = load::plan_batches(dataset.num_rows(), cfg.batch_size).len();
    let pb = load::progress_bar(batches as u64, &cfg.target_table);
    let report =
        load::load_dataset(&sink, &dataset, &cfg.target_table, cfg.batch_size, &pb).await?;

    info!(
        table = %cfg.target_table,
        rows = report.rows,
        batches = report.batches,
        elapsed = ?start.elapsed(),
        "ingest complete"
    );
    Ok(())
}
