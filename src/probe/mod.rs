//! Media metadata probing
//!
//! Finished (or partially written) files are probed for their title and artist tags so the
//! recent-downloads listing can show more than a file name. The probe is a trait so that a
//! missing probing tool degrades to [`NoOpProbe`] instead of failing the listing.

mod cli;
mod noop;

pub use cli::FfprobeProbe;
pub use noop::NoOpProbe;

use crate::config::ToolsConfig;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// Title and artist tags of a media file
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProbeTags {
    /// Title tag, or empty
    pub title: String,
    /// Artist tag, or empty
    pub artist: String,
}

/// Reads container metadata from a media file
#[async_trait]
pub trait MediaProbe: Send + Sync {
    /// Read the tags of `file`
    async fn probe(&self, file: &Path) -> crate::Result<ProbeTags>;

    /// Name of the implementation, for logging
    fn name(&self) -> &'static str;
}

/// Pick the probe implementation for the configured tools
pub fn probe_from_config(tools: &ToolsConfig) -> Arc<dyn MediaProbe> {
    let probe: Arc<dyn MediaProbe> = if let Some(ref path) = tools.ffprobe_path {
        Arc::new(FfprobeProbe::new(path.clone(), tools.probe_timeout))
    } else if tools.search_path {
        FfprobeProbe::from_path(tools.probe_timeout)
            .map(|p| Arc::new(p) as Arc<dyn MediaProbe>)
            .unwrap_or_else(|| Arc::new(NoOpProbe))
    } else {
        Arc::new(NoOpProbe)
    };

    tracing::info!(media_probe = probe.name(), "media probe initialized");
    probe
}

#[derive(Debug, Default, Deserialize)]
struct RawTags {
    #[serde(default, alias = "TITLE")]
    title: String,
    #[serde(default, alias = "ARTIST")]
    artist: String,
}

#[derive(Debug, Default, Deserialize)]
struct RawSection {
    #[serde(default)]
    tags: RawTags,
}

#[derive(Debug, Default, Deserialize)]
struct RawProbe {
    #[serde(default)]
    format: RawSection,
    #[serde(default)]
    streams: Vec<RawSection>,
}

/// Extract tags from probe JSON output
///
/// Container-level tags win; the first stream's tags fill whatever the container lacks.
pub(crate) fn parse_probe_output(raw: &[u8]) -> crate::Result<ProbeTags> {
    let parsed: RawProbe = serde_json::from_slice(raw)?;
    let stream = parsed.streams.into_iter().next().unwrap_or_default().tags;
    let format = parsed.format.tags;

    let pick = |primary: String, fallback: String| {
        if primary.is_empty() { fallback } else { primary }
    };

    Ok(ProbeTags {
        title: pick(format.title, stream.title),
        artist: pick(format.artist, stream.artist),
    })
}
