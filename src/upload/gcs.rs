use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use google_cloud_storage::{
    client::{google_cloud_auth::credentials::CredentialsFile, Client, ClientConfig},
    http::{
        objects::upload::{Media, UploadObjectRequest, UploadType},
        resumable_upload_client::{ChunkSize, UploadStatus},
    },
};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs::File, io::AsyncReadExt, sync::OnceCell};
use tracing::{debug, info, instrument};

use super::{with_timeout, ObjectSink};

/// Google Cloud Storage sink doing chunked resumable uploads.
///
/// Credentials are resolved on the first upload, not at construction, so an
/// auth failure surfaces as a failed (and retried) upload step. A failed
/// resolution is not cached.
pub struct GcsSink {
    client: OnceCell<Client>,
    bucket: String,
    key_path: PathBuf,
    chunk_size: usize,
    timeout: Duration,
}

impl GcsSink {
    pub fn new(
        bucket: &str,
        key_path: impl Into<PathBuf>,
        chunk_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            client: OnceCell::new(),
            bucket: bucket.to_string(),
            key_path: key_path.into(),
            chunk_size,
            timeout,
        }
    }

    /// Authenticate with the service-account file at `key_path` when it
    /// exists, otherwise with application-default credentials.
    async fn client(&self) -> Result<&Client> {
        self.client
            .get_or_try_init(|| async {
                let key_path = &self.key_path;
                let config = if key_path.exists() {
                    info!(key = %key_path.display(), "using service account file");
                    let creds = CredentialsFile::new_from_file(key_path.display().to_string())
                        .await
                        .with_context(|| {
                            format!("reading service account {}", key_path.display())
                        })?;
                    ClientConfig::default()
                        .with_credentials(creds)
                        .await
                        .context("authenticating to GCS with service account")?
                } else {
                    info!("no service account file; using default credentials");
                    ClientConfig::default()
                        .with_auth()
                        .await
                        .context("authenticating to GCS")?
                };
                Ok::<_, anyhow::Error>(Client::new(config))
            })
            .await
    }

    async fn upload_chunked(&self, client: &Client, path: &Path, key: &str) -> Result<u64> {
        let mut file = File::open(path)
            .await
            .with_context(|| format!("opening {}", path.display()))?;
        let total = file.metadata().await?.len();

        let request = UploadObjectRequest {
            bucket: self.bucket.clone(),
            ..Default::default()
        };
        let upload_type = UploadType::Simple(Media::new(key.to_string()));

        let ranges = chunk_ranges(total, self.chunk_size as u64);
        // a resumable session needs at least one byte
        if ranges.is_empty() {
            client
                .upload_object(&request, Vec::<u8>::new(), &upload_type)
                .await
                .with_context(|| format!("uploading empty object {}", key))?;
            return Ok(0);
        }

        let session = client
            .prepare_resumable_upload(&request, &upload_type)
            .await
            .with_context(|| format!("starting resumable upload of {}", key))?;

        for (first, last) in ranges {
            let mut buf = vec![0u8; (last - first + 1) as usize];
            file.read_exact(&mut buf)
                .await
                .with_context(|| format!("reading {}", path.display()))?;

            let status = session
                .upload_multiple_chunk(buf, &ChunkSize::new(first, last, Some(total)))
                .await
                .with_context(|| format!("uploading bytes {}..={} of {}", first, last, key))?;
            debug!(key, sent = last + 1, total, "chunk sent");

            if let UploadStatus::Ok(_) = status {
                if last + 1 < total {
                    return Err(anyhow!(
                        "server finalized {} after {} of {} bytes",
                        key,
                        last + 1,
                        total
                    ));
                }
            }
        }

        Ok(total)
    }
}

/// Inclusive byte ranges covering `total` bytes in pieces of at most
/// `chunk_size`. Empty for a zero-byte file.
pub fn chunk_ranges(total: u64, chunk_size: u64) -> Vec<(u64, u64)> {
    if chunk_size == 0 {
        return Vec::new();
    }
    (0..total)
        .step_by(chunk_size as usize)
        .map(|first| (first, (first + chunk_size).min(total) - 1))
        .collect()
}

#[async_trait]
impl ObjectSink for GcsSink {
    #[instrument(level = "debug", skip(self, path))]
    async fn upload_file(&self, path: &Path, key: &str) -> Result<u64> {
        let client = self.client().await?;
        info!(
            "uploading {} to gs://{}/{}",
            path.display(),
            self.bucket,
            key
        );
        let bytes = with_timeout(key, self.timeout, self.upload_chunked(client, path, key)).await?;
        info!(object = %self.describe(key), bytes, "upload complete");
        Ok(bytes)
    }

    fn describe(&self, key: &str) -> String {
        format!("gs://{}/{}", self.bucket, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_CHUNK_SIZE;
    use tempfile::tempdir;

    #[test]
    fn test_chunk_ranges() {
        let c = DEFAULT_CHUNK_SIZE as u64;
        assert!(chunk_ranges(0, c).is_empty());
        assert_eq!(chunk_ranges(1, c), vec![(0, 0)]);
        assert_eq!(chunk_ranges(c, c), vec![(0, c - 1)]);
        assert_eq!(chunk_ranges(c + 1, c), vec![(0, c - 1), (c, c)]);
        assert_eq!(
            chunk_ranges(3 * c, c),
            vec![(0, c - 1), (c, 2 * c - 1), (2 * c, 3 * c - 1)]
        );
    }

    #[test]
    fn test_chunk_ranges_cover_every_byte_once() {
        for (total, size) in [(10u64, 3u64), (1024, 256), (7, 100)] {
            let ranges = chunk_ranges(total, size);
            assert_eq!(ranges.first().map(|r| r.0), Some(0));
            assert_eq!(ranges.last().map(|r| r.1), Some(total - 1));
            for pair in ranges.windows(2) {
                assert_eq!(pair[0].1 + 1, pair[1].0);
            }
            assert!(ranges.iter().all(|(a, b)| b - a + 1 <= size));
        }
    }

    #[tokio::test]
    async fn test_bad_service_account_fails_the_upload_not_construction() {
        let tmp = tempdir().unwrap();
        let key_path = tmp.path().join("gcp.json");
        std::fs::write(&key_path, b"{ not json").unwrap();
        let src = tmp.path().join("green_tripdata_2024-01.parquet");
        std::fs::write(&src, b"PAR1").unwrap();

        let sink = GcsSink::new("bucket-name", &key_path, DEFAULT_CHUNK_SIZE, Duration::from_secs(5));
        let err = sink
            .upload_file(&src, "green_taxi_2024/green_tripdata_2024-01.parquet")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("reading service account"));
        // nothing cached, the next attempt resolves again
        assert!(sink.client.get().is_none());
    }
}
