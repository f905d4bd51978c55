//! Fetch → upload → cleanup, once per period.
//!
//! Periods run as independent tokio tasks (optionally capped by a
//! semaphore); inside a period the steps run strictly in order and a step
//! only starts once the previous one succeeded. Each step gets `retries`
//! extra attempts before the period is marked failed. A failed period never
//! stops the others.

pub mod item;
pub mod report;

use anyhow::{Context, Result};
use reqwest::Client;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::sync::Semaphore;
use tracing::{error, info, info_span, warn, Instrument};

use crate::{cleanup, config::WorkflowConfig, fetch, upload::ObjectSink};
pub use item::{Step, WorkItem};
pub use report::{ItemReport, Stage};

pub struct Workflow {
    cfg: Arc<WorkflowConfig>,
    client: Client,
    sink: Arc<dyn ObjectSink>,
}

impl Workflow {
    pub fn new(cfg: WorkflowConfig, client: Client, sink: Arc<dyn ObjectSink>) -> Result<Self> {
        cfg.validate()?;
        Ok(Self {
            cfg: Arc::new(cfg),
            client,
            sink,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.cfg
    }

    pub fn items(&self) -> Result<Vec<WorkItem>> {
        self.cfg
            .months
            .iter()
            .map(|m| WorkItem::new(&self.cfg, m))
            .collect()
    }

    /// One `a >> b >> c` line per period.
    pub fn task_graph(&self) -> Result<Vec<String>> {
        Ok(self
            .items()?
            .iter()
            .map(|item| {
                Step::ORDER
                    .iter()
                    .map(|s| item.task_id(*s))
                    .collect::<Vec<_>>()
                    .join(" >> ")
            })
            .collect())
    }

    /// Run every period and return their reports in configured order.
    pub async fn run(&self) -> Result<Vec<ItemReport>> {
        let items = self.items()?;
        let permits = self.cfg.max_parallel.unwrap_or(items.len()).max(1);
        let sem = Arc::new(Semaphore::new(permits));
        info!(
            workflow = %self.cfg.workflow_id,
            periods = items.len(),
            parallel = permits,
            "starting run"
        );

        let mut handles = Vec::with_capacity(items.len());
        for item in items {
            let client = self.client.clone();
            let sink = Arc::clone(&self.sink);
            let sem = Arc::clone(&sem);
            let retries = self.cfg.retries;
            let delay = self.cfg.retry_delay;
            let span = info_span!("period", period = %item.period);

            handles.push(tokio::spawn(
                async move {
                    let _permit = sem.acquire_owned().await?;
                    Ok::<_, anyhow::Error>(
                        run_item(&item, &client, sink.as_ref(), retries, delay).await,
                    )
                }
                .instrument(span),
            ));
        }

        let mut reports = Vec::with_capacity(handles.len());
        for h in handles {
            reports.push(h.await.context("period task panicked")??);
        }

        let failed = reports.iter().filter(|r| !r.succeeded()).count();
        info!(
            workflow = %self.cfg.workflow_id,
            succeeded = reports.len() - failed,
            failed,
            "run finished"
        );
        Ok(reports)
    }
}

/// Drive one period through its steps. Never returns early with an error:
/// failures end up in the report.
pub async fn run_item(
    item: &WorkItem,
    client: &Client,
    sink: &dyn ObjectSink,
    retries: u32,
    delay: Duration,
) -> ItemReport {
    let mut report = ItemReport::new(&item.period);

    for step in Step::ORDER {
        let task_id = item.task_id(step);
        let (res, attempts) = match step {
            Step::Fetch => {
                with_retries(&task_id, retries, delay, || {
                    fetch::download_to(client, &item.url, &item.local_path)
                })
                .await
            }
            Step::Upload => {
                info!(
                    task = %task_id,
                    "uploading {} to {}",
                    item.local_path.display(),
                    sink.describe(&item.object_key)
                );
                with_retries(&task_id, retries, delay, || {
                    sink.upload_file(&item.local_path, &item.object_key)
                })
                .await
            }
            Step::Cleanup => {
                with_retries(&task_id, retries, delay, || async {
                    cleanup::remove_local(&item.local_path).await.map(|_| 0u64)
                })
                .await
            }
        };
        report.record_attempts(step, attempts);

        match res {
            Ok(bytes) => {
                if step == Step::Fetch {
                    report.bytes = bytes;
                }
                report.advance(step);
                info!(task = %task_id, stage = ?report.stage, "task succeeded");
            }
            Err(e) => {
                error!(task = %task_id, attempts, "task failed: {:#}", e);
                return report.fail(step, &e);
            }
        }
    }

    report.finish()
}

/// Run `op` up to `retries + 1` times, sleeping `delay` between attempts.
/// Returns the last result and how many attempts were made.
async fn with_retries<F, Fut, T>(
    task_id: &str,
    retries: u32,
    delay: Duration,
    mut op: F,
) -> (Result<T>, u32)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return (Ok(v), attempt),
            Err(e) if attempt <= retries => {
                warn!(
                    task = task_id,
                    attempt,
                    "attempt failed, retrying in {:?}: {:#}",
                    delay,
                    e
                );
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}
