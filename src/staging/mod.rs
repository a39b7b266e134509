//! File staging
//!
//! Every job works under a temp base name derived from the MD5 of its URL, inside
//! `<web_root>/<out_path>/t`. The extraction tool writes `<base>.<ext>` for the media,
//! `<base>.info.json` for metadata and `<base>.ext` holding the final post-processed path.
//! Once the tool exits, the produced file is renamed into the output directory under a
//! sanitized display name.
//!
//! The temp name is a pure function of the URL: two concurrent jobs for the same URL share
//! (and race on) the same files.

mod await_file;
mod sanitize;

pub use await_file::{FileProbe, FsProbe, await_file};
pub use sanitize::{MAX_NAME_LEN, NAME_PREFIX, UNKNOWN_PART, display_name, sanitize_filename};

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Working paths of one job
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StagingPaths {
    base: PathBuf,
}

impl StagingPaths {
    /// Paths for `url` inside `temp_dir`
    pub fn for_url(temp_dir: &Path, url: &str) -> Self {
        Self {
            base: temp_dir.join(temp_basename(url)),
        }
    }

    /// Base path without extension
    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Output template handed to the tool (`<base>.%(ext)s`)
    pub fn output_template(&self) -> PathBuf {
        self.with_extension("%(ext)s")
    }

    /// Metadata side-channel
    pub fn info_json(&self) -> PathBuf {
        self.with_extension("info.json")
    }

    /// Final-path side-channel
    pub fn final_path_file(&self) -> PathBuf {
        self.with_extension("ext")
    }

    /// `<base>.<ext>`
    pub fn with_extension(&self, ext: &str) -> PathBuf {
        let mut s: OsString = self.base.clone().into_os_string();
        s.push(".");
        s.push(ext);
        PathBuf::from(s)
    }

    /// File name of `<base>.<ext>`
    pub fn file_name(&self, ext: &str) -> String {
        format!("{}.{ext}", temp_basename_of(&self.base))
    }
}

/// `ytdl-<md5 hex of url>`
pub fn temp_basename(url: &str) -> String {
    format!("{NAME_PREFIX}{:x}", md5::compute(url.as_bytes()))
}

fn temp_basename_of(base: &Path) -> String {
    base.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Extension presented to clients for a produced extension
///
/// Opus output already sits in an Ogg container; clients handle `.oga` better.
pub fn client_extension(ext: &str) -> &str {
    match ext {
        "opus" => "oga",
        other => other,
    }
}

/// Read the path the tool printed as its final output (first line of the side-channel)
pub async fn read_final_path(side_channel: &Path) -> Result<PathBuf> {
    let raw = tokio::fs::read_to_string(side_channel).await?;
    let first = raw.lines().next().map(str::trim).unwrap_or_default();
    if first.is_empty() {
        return Err(Error::ExternalTool(format!(
            "final path file {} is empty",
            side_channel.display()
        )));
    }
    Ok(PathBuf::from(first))
}

/// Destination of `produced` inside `output_dir`, named `<display_name>.<client ext>`
pub fn final_destination(output_dir: &Path, display_name: &str, produced: &Path) -> PathBuf {
    match produced.extension().and_then(|e| e.to_str()) {
        Some(ext) => output_dir.join(format!("{display_name}.{}", client_extension(ext))),
        None => output_dir.join(display_name),
    }
}

/// Rename `from` to `to`
pub async fn promote(from: &Path, to: &Path) -> Result<()> {
    tracing::info!(from = ?from, to = ?to, "rename");
    tokio::fs::rename(from, to).await?;
    Ok(())
}

/// Link under which a file in the output directory is served
pub fn download_url(out_path: &str, file_name: &str) -> String {
    format!("{}/{file_name}", out_path.trim_end_matches('/'))
}
