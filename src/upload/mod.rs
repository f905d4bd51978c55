pub mod gcs;

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::fs;
use tracing::info;

use crate::error::IngestError;
pub use gcs::GcsSink;

/// Destination for the upload step. `key` is the object name, e.g.
/// `green_taxi_2024/green_tripdata_2024-01.parquet`.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Upload the file at `path` to `key`, returning the number of bytes sent.
    async fn upload_file(&self, path: &Path, key: &str) -> Result<u64>;

    /// Human-readable location of `key`, used in logs.
    fn describe(&self, key: &str) -> String;
}

/// Bound `fut` by `timeout`, mapping expiry to [`IngestError::UploadTimeout`].
pub(crate) async fn with_timeout<F, T>(key: &str, timeout: Duration, fut: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(res) => res,
        Err(_) => Err(IngestError::UploadTimeout {
            key: key.to_string(),
            timeout,
        }
        .into()),
    }
}

/// Mirrors objects into a local directory as `<root>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalDirSink {
    root: PathBuf,
    timeout: Duration,
}

impl LocalDirSink {
    pub fn new(root: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            root: root.into(),
            timeout,
        }
    }

    pub fn object_path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectSink for LocalDirSink {
    async fn upload_file(&self, path: &Path, key: &str) -> Result<u64> {
        let dest = self.object_path(key);
        with_timeout(key, self.timeout, async {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let bytes = fs::copy(path, &dest)
                .await
                .with_context(|| format!("copying {} to {}", path.display(), dest.display()))?;
            info!(object = %dest.display(), bytes, "stored locally");
            Ok(bytes)
        })
        .await
    }

    fn describe(&self, key: &str) -> String {
        self.object_path(key).display().to_string()
    }
}
