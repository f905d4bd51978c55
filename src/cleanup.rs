use anyhow::{Context, Result};
use std::{io::ErrorKind, path::Path};
use tokio::fs;
use tracing::{debug, info};

/// Delete the local copy at `path`. Returns whether a file was removed;
/// an already-absent file is not an error.
pub async fn remove_local(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => {
            info!("cleaned up {}", path.display());
            Ok(true)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("{} already gone", path.display());
            Ok(false)
        }
        Err(e) => Err(e).with_context(|| format!("removing {}", path.display())),
    }
}
