//! Polling for side-channel files

use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Existence check used while waiting for a side-channel file
#[async_trait]
pub trait FileProbe: Send + Sync {
    /// Whether `path` exists; errors other than "not found" are reported
    async fn exists(&self, path: &Path) -> std::io::Result<bool>;
}

/// [`FileProbe`] backed by the real filesystem
#[derive(Clone, Copy, Debug, Default)]
pub struct FsProbe;

#[async_trait]
impl FileProbe for FsProbe {
    async fn exists(&self, path: &Path) -> std::io::Result<bool> {
        tokio::fs::try_exists(path).await
    }
}

/// Wait for `path` to appear, checking after each `interval` up to `max_attempts` times
///
/// Returns [`Error::MetadataTimeout`] when the file never shows up.
pub async fn await_file(
    probe: &dyn FileProbe,
    path: &Path,
    max_attempts: u32,
    interval: Duration,
) -> Result<()> {
    for attempt in 1..=max_attempts {
        tokio::time::sleep(interval).await;
        if probe.exists(path).await? {
            tracing::debug!(path = ?path, attempt, "side-channel file found");
            return Ok(());
        }
    }

    Err(Error::MetadataTimeout {
        path: path.to_path_buf(),
        attempts: max_attempts,
    })
}
