use anyhow::{bail, Result};
use clap::Parser;
use reqwest::Client;
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info};
use tripdata::{
    config::WorkflowConfig,
    logging,
    upload::{GcsSink, LocalDirSink, ObjectSink},
    workflow::Workflow,
};

/// Download monthly trip-data files, push them to GCS, drop the local copy.
#[derive(Parser, Debug)]
struct Args {
    /// Two-digit months to process (defaults to 01 through 06)
    #[arg(long, value_delimiter = ',')]
    months: Option<Vec<String>>,

    /// Mirror objects into this directory instead of GCS
    #[arg(long)]
    local_dest: Option<PathBuf>,

    /// Maximum number of months in flight
    #[arg(long)]
    max_parallel: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging + config ────────────────────────────────────
    logging::init("info");
    if let Ok(path) = dotenvy::dotenv() {
        info!(".env loaded from {}", path.display());
    }

    let args = Args::parse();
    let mut cfg = WorkflowConfig::from_env()?;
    if let Some(months) = args.months {
        cfg.months = months;
    }
    cfg.max_parallel = args.max_parallel.or(cfg.max_parallel);
    cfg.validate()?;
    info!(
        workflow = %cfg.workflow_id,
        bucket = %cfg.bucket,
        project = %cfg.project_id,
        "{}",
        cfg.description
    );

    // ─── 2) pick the upload sink ─────────────────────────────────────
    let sink: Arc<dyn ObjectSink> = match &args.local_dest {
        Some(dir) => Arc::new(LocalDirSink::new(dir, cfg.upload_timeout)),
        // credentials are resolved lazily by the first upload
        None => Arc::new(GcsSink::new(
            &cfg.bucket,
            &cfg.key_path,
            cfg.chunk_size,
            cfg.upload_timeout,
        )),
    };

    // ─── 3) run every month ──────────────────────────────────────────
    let wf = Workflow::new(cfg, Client::new(), sink)?;
    for line in wf.task_graph()? {
        info!("{}", line);
    }
    let reports = wf.run().await?;

    info!("summary: {}", serde_json::to_string(&reports)?);
    let failed: Vec<&str> = reports
        .iter()
        .filter(|r| !r.succeeded())
        .map(|r| r.period.as_str())
        .collect();
    if !failed.is_empty() {
        error!(?failed, "some months failed");
        bail!("{} of {} months failed", failed.len(), reports.len());
    }

    info!("all done");
    Ok(())
}
