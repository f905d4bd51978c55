// src/fetch/mod.rs

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use std::path::Path;
use tokio::{fs, io::AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use crate::error::IngestError;

/// GET `url` and write the body verbatim to `dest`, returning the byte count.
///
/// Anything but `200 OK` fails with [`IngestError::HttpStatus`] before `dest`
/// is touched. A body that breaks off mid-stream removes the partial file
/// before the error is returned, so a failed fetch never leaves a file behind.
#[instrument(level = "debug", skip(client, dest), fields(dest = %dest.as_ref().display()))]
pub async fn download_to(client: &Client, url: &str, dest: impl AsRef<Path>) -> Result<u64> {
    let dest = dest.as_ref();
    info!(url, "downloading");

    let mut resp = client
        .get(url)
        .send()
        .await
        .with_context(|| format!("GET {}", url))?;
    if resp.status() != StatusCode::OK {
        return Err(IngestError::HttpStatus {
            url: url.to_string(),
            status: resp.status().as_u16(),
        }
        .into());
    }

    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .await
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let file = fs::File::create(dest)
        .await
        .with_context(|| format!("creating {}", dest.display()))?;

    let written = match write_body(&mut resp, file, url, dest).await {
        Ok(n) => n,
        Err(e) => {
            if let Err(rm) = fs::remove_file(dest).await {
                warn!(dest = %dest.display(), "could not remove partial download: {}", rm);
            }
            return Err(e);
        }
    };

    info!(url, dest = %dest.display(), bytes = written, "downloaded");
    Ok(written)
}

async fn write_body(
    resp: &mut reqwest::Response,
    mut file: fs::File,
    url: &str,
    dest: &Path,
) -> Result<u64> {
    let mut written = 0u64;
    while let Some(chunk) = resp
        .chunk()
        .await
        .with_context(|| format!("reading body from {}", url))?
    {
        file.write_all(&chunk)
            .await
            .with_context(|| format!("writing {}", dest.display()))?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    debug!(bytes = written, "body written");
    Ok(written)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tempfile::tempdir;
    use warp::{http::StatusCode as WarpStatus, Filter};

    pub(crate) const BODY: &[u8] = b"PAR1\x00\x01fake parquet bytesPAR1";

    /// Serves `BODY` for `/trip-data/<name>` when `name` is in `present`,
    /// 404 for anything else.
    pub(crate) fn serve(present: Vec<String>) -> SocketAddr {
        let route = warp::path!("trip-data" / String).map(move |name: String| {
            if present.contains(&name) {
                warp::reply::with_status(BODY.to_vec(), WarpStatus::OK)
            } else {
                warp::reply::with_status(b"not found".to_vec(), WarpStatus::NOT_FOUND)
            }
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        addr
    }

    #[tokio::test]
    async fn test_download_writes_body_verbatim() {
        let addr = serve(vec!["green_tripdata_2024-01.parquet".into()]);
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("green_tripdata_2024-01.parquet");

        let url = format!("http://{}/trip-data/green_tripdata_2024-01.parquet", addr);
        let n = download_to(&Client::new(), &url, &dest).await.unwrap();

        assert_eq!(n, BODY.len() as u64);
        assert_eq!(std::fs::read(&dest).unwrap(), BODY);
    }

    #[tokio::test]
    async fn test_non_200_carries_status_and_writes_nothing() {
        let addr = serve(vec![]);
        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("green_tripdata_2024-07.parquet");

        let url = format!("http://{}/trip-data/green_tripdata_2024-07.parquet", addr);
        let err = download_to(&Client::new(), &url, &dest).await.unwrap_err();

        let ingest = err.downcast_ref::<IngestError>().expect("typed error");
        assert_eq!(ingest.status(), Some(404));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_truncated_body_removes_partial_file() {
        use tokio::{io::AsyncReadExt, net::TcpListener};

        // promise 100 bytes, send 8, hang up
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf).await;
            let _ = sock
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nPAR1\x00\x01ab")
                .await;
            let _ = sock.shutdown().await;
        });

        let tmp = tempdir().unwrap();
        let dest = tmp.path().join("green_tripdata_2024-02.parquet");
        let url = format!("http://{}/trip-data/green_tripdata_2024-02.parquet", addr);
        let err = download_to(&Client::new(), &url, &dest).await.unwrap_err();

        assert!(format!("{:#}", err).contains("reading body"));
        assert!(!dest.exists());
    }
}
