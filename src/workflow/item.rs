use anyhow::{Context, Result};
use serde::Serialize;
use std::path::PathBuf;
use url::Url;

use crate::config::WorkflowConfig;

/// The three ordered steps every period goes through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Fetch,
    Upload,
    Cleanup,
}

impl Step {
    pub const ORDER: [Step; 3] = [Step::Fetch, Step::Upload, Step::Cleanup];

    pub fn task_prefix(&self) -> &'static str {
        match self {
            Step::Fetch => "download_taxi_data",
            Step::Upload => "upload_to_gcs",
            Step::Cleanup => "cleanup_local",
        }
    }
}

/// One period plus every name derived from it. Nothing here is shared with
/// other periods, so items can run side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub period: String,
    pub file_name: String,
    pub url: String,
    pub local_path: PathBuf,
    pub object_key: String,
}

impl WorkItem {
    pub fn new(cfg: &WorkflowConfig, period: &str) -> Result<Self> {
        let file_name = format!("{}_{}-{}.parquet", cfg.dataset, cfg.year, period);
        let url = format!("{}/{}", cfg.url_base.trim_end_matches('/'), file_name);
        Url::parse(&url).with_context(|| format!("building download URL for {}", period))?;

        let object_key = if cfg.object_prefix.is_empty() {
            file_name.clone()
        } else {
            format!("{}/{}", cfg.object_prefix.trim_end_matches('/'), file_name)
        };

        Ok(Self {
            period: period.to_string(),
            local_path: cfg.tmp_dir.join(&file_name),
            url,
            object_key,
            file_name,
        })
    }

    pub fn task_id(&self, step: Step) -> String {
        format!("{}_{}", step.task_prefix(), self.period)
    }
}
