//! Probe backed by the external ffprobe binary

use super::{MediaProbe, ProbeTags, parse_probe_output};
use crate::command::run_command;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runs `ffprobe` on each file, bounded by a timeout
#[derive(Clone, Debug)]
pub struct FfprobeProbe {
    binary_path: PathBuf,
    timeout: Duration,
}

impl FfprobeProbe {
    /// Create a probe with an explicit binary path
    pub fn new(binary_path: PathBuf, timeout: Duration) -> Self {
        Self {
            binary_path,
            timeout,
        }
    }

    /// Attempt to find ffprobe in PATH
    pub fn from_path(timeout: Duration) -> Option<Self> {
        which::which("ffprobe")
            .ok()
            .map(|path| Self::new(path, timeout))
    }
}

#[async_trait]
impl MediaProbe for FfprobeProbe {
    async fn probe(&self, file: &Path) -> crate::Result<ProbeTags> {
        let args = vec![
            "-i".to_string(),
            file.to_string_lossy().into_owned(),
            "-print_format".to_string(),
            "json".to_string(),
            "-v".to_string(),
            "quiet".to_string(),
            "-show_format".to_string(),
            "-show_streams".to_string(),
        ];
        let out = run_command(&self.binary_path, &args, self.timeout).await?;
        parse_probe_output(&out)
    }

    fn name(&self) -> &'static str {
        "ffprobe"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn fake_ffprobe(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("ffprobe");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn reads_tags_from_tool_output() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffprobe(
            dir.path(),
            r#"echo '{"format":{"tags":{"title":"Song","artist":"Band"}}}'"#,
        );

        let tags = FfprobeProbe::new(bin, Duration::from_secs(5))
            .probe(Path::new("whatever.oga"))
            .await
            .unwrap();
        assert_eq!(tags.title, "Song");
        assert_eq!(tags.artist, "Band");
    }

    #[tokio::test]
    async fn slow_tool_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let bin = fake_ffprobe(dir.path(), "sleep 5");

        let err = FfprobeProbe::new(bin, Duration::from_millis(100))
            .probe(Path::new("whatever.oga"))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::ExternalTool(_)));
    }
}
