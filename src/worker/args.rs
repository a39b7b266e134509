//! Extraction tool invocation

use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::PROGRESS_TEMPLATE;
use crate::staging::StagingPaths;

/// Host part of a submitted URL
pub(crate) fn url_host(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::InvalidUrl {
            url: raw.to_string(),
            reason: "url was empty".into(),
        });
    }
    let parsed = url::Url::parse(trimmed).map_err(|e| Error::InvalidUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    Ok(parsed.host_str().unwrap_or_default().to_string())
}

/// Whether media from `host` is re-encoded
///
/// Hosts containing any of `no_reencode_sites` keep their original format.
pub fn should_reencode(host: &str, no_reencode_sites: &[String]) -> bool {
    !no_reencode_sites
        .iter()
        .any(|site| !site.is_empty() && host.contains(site.as_str()))
}

/// Full argument list for one download
pub(crate) fn build_args(
    config: &Config,
    paths: &StagingPaths,
    url: &str,
    reencode: bool,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "--write-info-json".into(),
        "--max-filesize".into(),
        config.download.max_file_size.to_string(),
        // one progress line per update
        "--newline".into(),
        "--progress-template".into(),
        PROGRESS_TEMPLATE.into(),
        "--no-mtime".into(),
        "--socket-timeout".into(),
        config.tools.socket_timeout_secs.to_string(),
        "--no-playlist".into(),
        "-o".into(),
        paths.output_template().to_string_lossy().into_owned(),
        "--embed-metadata".into(),
        "-x".into(),
        "--print-to-file".into(),
        "after_move:filepath".into(),
        paths.final_path_file().to_string_lossy().into_owned(),
        // dash first, then smallest size and bitrate
        "-S".into(),
        "proto:dash,+size,+br".into(),
        "--extractor-args".into(),
        "youtube:formats=duplicate".into(),
    ];

    if config.sponsorblock.enabled {
        args.push("--sponsorblock-remove".into());
        args.push(config.sponsorblock.categories.clone());
    }

    if reencode {
        args.push("--audio-format".into());
        args.push(config.reencode.audio_format.clone());
        args.push("--audio-quality".into());
        args.push(config.reencode.audio_quality.clone());
    }

    args.extend(config.tools.extra_args.iter().cloned());
    args.push(url.to_string());
    args
}
