//! Served-file library: recent downloads, deletion, expiry
//!
//! Finished files live directly in `<web_root>/<out_path>`; clients refer to them by the
//! link issued on `link_stream` (`<out_path>/<file>`). In-progress files live in the `t/`
//! subdirectory and are never listed.

use crate::error::{Error, Result};
use crate::probe::MediaProbe;
use crate::staging::download_url;
use crate::types::RecentEntry;
use chrono::{DateTime, Utc};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;

/// Access to the files served from the output directory
#[derive(Clone)]
pub struct Library {
    web_root: PathBuf,
    out_path: String,
    probe: Arc<dyn MediaProbe>,
}

impl std::fmt::Debug for Library {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Library")
            .field("web_root", &self.web_root)
            .field("out_path", &self.out_path)
            .field("probe", &self.probe.name())
            .finish()
    }
}

impl Library {
    /// Create a library over `<web_root>/<out_path>`
    pub fn new(web_root: PathBuf, out_path: String, probe: Arc<dyn MediaProbe>) -> Self {
        Self {
            web_root,
            out_path,
            probe,
        }
    }

    /// Directory holding finished files
    pub fn output_dir(&self) -> PathBuf {
        self.web_root.join(&self.out_path)
    }

    /// Finished files, newest first
    ///
    /// Dot-files, `*.json` files and directories are skipped, as are files the probe cannot
    /// read.
    pub async fn recent(&self) -> Result<Vec<RecentEntry>> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(self.output_dir()).await?;

        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || name.ends_with(".json") {
                continue;
            }
            let metadata = match entry.metadata().await {
                Ok(m) if m.is_file() => m,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "cannot stat file, skipping");
                    continue;
                }
            };

            let tags = match self.probe.probe(&entry.path()).await {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(file = %name, error = %e, "probe failed, skipping");
                    continue;
                }
            };

            let timestamp: DateTime<Utc> = metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());

            entries.push(RecentEntry {
                url: download_url(&self.out_path, &name),
                title: tags.title,
                artist: tags.artist,
                timestamp,
            });
        }

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    /// Delete previously issued download links
    ///
    /// Stops at the first link that is malformed ([`Error::InvalidPath`]) or missing
    /// ([`Error::NotFound`]); links before it stay deleted.
    pub async fn delete_files(&self, urls: &[String]) -> Result<()> {
        for url in urls {
            let path = self.resolve_link(url)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => tracing::info!(path = ?path, "file removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(Error::NotFound(url.clone()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Map a link to a path inside the output directory, rejecting anything that escapes it
    fn resolve_link(&self, url: &str) -> Result<PathBuf> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: PathBuf::from(url),
            reason: reason.to_string(),
        };

        let link = Path::new(url);
        if !link
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(invalid("must be a relative path without '..'"));
        }

        let relative = link
            .strip_prefix(&self.out_path)
            .map_err(|_| invalid("not under the output directory"))?;
        if relative.components().count() != 1 {
            return Err(invalid("must name a file directly in the output directory"));
        }

        Ok(self.web_root.join(link))
    }

    /// Remove files under the output directory (including `t/`) older than `expiry`
    ///
    /// Dot-files are kept. Individual failures are logged and skipped. Returns the number of
    /// files removed.
    pub async fn sweep_expired(&self, expiry: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;
        let mut pending = vec![self.output_dir()];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.output_dir() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(dir = ?dir, error = %e, "cannot read directory");
                    continue;
                }
            };

            while let Some(entry) = entries.next_entry().await? {
                if entry.file_name().to_string_lossy().starts_with('.') {
                    continue;
                }
                let path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(m) => m,
                    Err(e) => {
                        tracing::warn!(path = ?path, error = %e, "cannot stat file");
                        continue;
                    }
                };
                if metadata.is_dir() {
                    pending.push(path);
                    continue;
                }

                let age = metadata
                    .modified()
                    .ok()
                    .and_then(|m| now.duration_since(m).ok())
                    .unwrap_or_default();
                if age > expiry {
                    match tokio::fs::remove_file(&path).await {
                        Ok(()) => {
                            removed += 1;
                            tracing::info!(path = ?path, "old file removed");
                        }
                        Err(e) => tracing::warn!(path = ?path, error = %e, "file cleanup error"),
                    }
                }
            }
        }

        Ok(removed)
    }

    /// Run [`Library::sweep_expired`] every `interval` until `shutdown` fires
    pub async fn run_expiry_sweep(
        &self,
        interval: Duration,
        expiry: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it so the first sweep runs after one interval.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_expired(expiry).await {
                        tracing::warn!(error = %e, "file cleanup error");
                    }
                }
            }
        }
        tracing::debug!("expiry sweep stopped");
    }
}
