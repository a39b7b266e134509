//! Metadata side-channel parsing

use crate::error::Result;
use crate::types::{Info, JobId};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Subset of the tool's `.info.json` the worker uses
///
/// Every field is optional; the tool writes `null` for facts it could not determine.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MediaMetadata {
    /// Media title
    #[serde(default)]
    pub title: Option<String>,
    /// Uploader channel
    #[serde(default)]
    pub channel: Option<String>,
    /// Series name, used when there is no channel
    #[serde(default)]
    pub series: Option<String>,
    /// Free-form description
    #[serde(default)]
    pub description: Option<String>,
    /// Exact size in bytes
    #[serde(default)]
    pub filesize: Option<i64>,
    /// Approximate size in bytes
    #[serde(default)]
    pub filesize_approx: Option<f64>,
    /// Extension of the downloaded stream
    #[serde(default)]
    pub ext: Option<String>,
    /// Segments removed by SponsorBlock
    #[serde(default)]
    pub sponsorblock_chapters: Option<Vec<serde_json::Value>>,
}

impl MediaMetadata {
    /// Channel, falling back to series
    pub fn artist(&self) -> String {
        [&self.channel, &self.series]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .cloned()
            .unwrap_or_default()
    }

    /// Exact size, falling back to the approximate size, 0 when unknown
    pub fn file_size(&self) -> i64 {
        self.filesize
            .or_else(|| self.filesize_approx.map(|f| f as i64))
            .unwrap_or(0)
    }

    /// Build the subscriber-facing [`Info`]
    pub fn to_info(&self, id: JobId) -> Info {
        Info {
            id,
            title: self.title.clone().unwrap_or_default(),
            artist: self.artist(),
            file_size: self.file_size(),
            extension: self.ext.clone().unwrap_or_default(),
            download_url: String::new(),
            sponsor_block: self
                .sponsorblock_chapters
                .as_ref()
                .is_some_and(|c| !c.is_empty()),
            progress: None,
        }
    }
}

/// Read and parse the metadata side-channel
///
/// The tool may still be writing the file when it is first seen; a truncated document is
/// re-read a few times before giving up.
pub(crate) async fn read_metadata(path: &Path, retry_interval: Duration) -> Result<MediaMetadata> {
    const PARTIAL_READ_RETRIES: u32 = 3;

    let mut attempt = 0;
    loop {
        let raw = tokio::fs::read(path).await?;
        match serde_json::from_slice::<MediaMetadata>(&raw) {
            Ok(meta) => return Ok(meta),
            Err(e) if e.is_eof() && attempt < PARTIAL_READ_RETRIES => {
                attempt += 1;
                tracing::debug!(path = ?path, attempt, "metadata file incomplete, re-reading");
                tokio::time::sleep(retry_interval).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}
