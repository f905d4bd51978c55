// src/config.rs

use anyhow::Result;
use std::{env, path::PathBuf, str::FromStr, time::Duration};

use crate::error::IngestError;

pub const DEFAULT_URL_BASE: &str = "https://d37ci6vzurychx.cloudfront.net/trip-data";
pub const DEFAULT_KEY_PATH: &str = "/opt/airflow/gcp.json";
/// 5 MiB, a multiple of the 256 KiB resumable-upload granularity.
pub const DEFAULT_CHUNK_SIZE: usize = 5 * 1024 * 1024;
pub const UPLOAD_CHUNK_GRANULARITY: usize = 256 * 1024;

/// Settings for the fetch → upload → cleanup workflow.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub workflow_id: String,
    pub description: String,
    /// File stem shared by every period, e.g. `green_tripdata`.
    pub dataset: String,
    pub year: u16,
    pub months: Vec<String>,
    pub url_base: String,
    /// Key prefix inside the bucket, e.g. `green_taxi_2024`.
    pub object_prefix: String,
    pub bucket: String,
    pub project_id: String,
    pub tmp_dir: PathBuf,
    /// Service-account JSON used when present; otherwise ambient credentials.
    pub key_path: PathBuf,
    pub upload_timeout: Duration,
    pub chunk_size: usize,
    pub retries: u32,
    pub retry_delay: Duration,
    /// Upper bound on periods in flight; `None` runs them all at once.
    pub max_parallel: Option<usize>,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            workflow_id: "green_taxi_to_gcs".into(),
            description: "Loads Jan-Jun 2024 Green Taxi Parquet files to GCS".into(),
            dataset: "green_tripdata".into(),
            year: 2024,
            months: (1..=6).map(|m| format!("{:02}", m)).collect(),
            url_base: DEFAULT_URL_BASE.into(),
            object_prefix: "green_taxi_2024".into(),
            bucket: "bucket-name".into(),
            project_id: "project-id".into(),
            tmp_dir: PathBuf::from("/tmp"),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            upload_timeout: Duration::from_secs(600),
            chunk_size: DEFAULT_CHUNK_SIZE,
            retries: 1,
            retry_delay: Duration::from_secs(300),
            max_parallel: None,
        }
    }
}

impl WorkflowConfig {
    /// Defaults overridden by environment variables. Unset variables keep
    /// their default; set-but-unparseable ones are an error.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        if let Some(v) = var("GCP_GCS_BUCKET") {
            cfg.bucket = v;
        }
        if let Some(v) = var("GCP_PROJECT_ID") {
            cfg.project_id = v;
        }
        if let Some(v) = var("TRIPDATA_TMP_DIR") {
            cfg.tmp_dir = PathBuf::from(v);
        }
        if let Some(v) = var("TRIPDATA_URL_BASE") {
            cfg.url_base = v;
        }
        if let Some(v) = var("TRIPDATA_OBJECT_PREFIX") {
            cfg.object_prefix = v;
        }
        if let Some(v) = var("TRIPDATA_KEY_PATH") {
            cfg.key_path = PathBuf::from(v);
        }
        if let Some(secs) = parse_var::<u64>("TRIPDATA_UPLOAD_TIMEOUT_SECS")? {
            cfg.upload_timeout = Duration::from_secs(secs);
        }
        if let Some(bytes) = parse_var::<usize>("TRIPDATA_CHUNK_SIZE_BYTES")? {
            cfg.chunk_size = bytes;
        }
        if let Some(n) = parse_var::<u32>("TRIPDATA_RETRIES")? {
            cfg.retries = n;
        }
        if let Some(secs) = parse_var::<u64>("TRIPDATA_RETRY_DELAY_SECS")? {
            cfg.retry_delay = Duration::from_secs(secs);
        }
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.months.is_empty() {
            return Err(invalid("no months to process"));
        }
        for m in &self.months {
            match m.parse::<u8>() {
                Ok(1..=12) if m.len() == 2 => {}
                _ => return Err(invalid(format!("`{}` is not a two-digit month", m))),
            }
        }
        if self.bucket.is_empty() {
            return Err(invalid("bucket name is empty"));
        }
        if self.chunk_size == 0 || self.chunk_size % UPLOAD_CHUNK_GRANULARITY != 0 {
            return Err(invalid(format!(
                "chunk size {} is not a positive multiple of {}",
                self.chunk_size, UPLOAD_CHUNK_GRANULARITY
            )));
        }
        if self.upload_timeout.is_zero() {
            return Err(invalid("upload timeout must be non-zero"));
        }
        if self.max_parallel == Some(0) {
            return Err(invalid("max parallel must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    IngestError::InvalidConfig(msg.into()).into()
}

fn var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match var(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| invalid(format!("{}={} is not valid", name, raw))),
    }
}
