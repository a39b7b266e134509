//! Stand-in extraction tools and configurations
//!
//! The stub tools are `sh` scripts that honour the parts of the argument contract the worker
//! relies on: `-o <base>.%(ext)s` and `--print-to-file after_move:filepath <file>`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use ytdl_web::Config;

/// Argument parsing shared by every stub; leaves `$base` and `$final` set
const PREAMBLE: &str = r#"#!/bin/sh
out=""
final=""
while [ $# -gt 0 ]; do
  case "$1" in
    -o) out="$2"; shift 2 ;;
    --print-to-file) final="$3"; shift 3 ;;
    *) shift ;;
  esac
done
base=$(printf '%s' "$out" | sed 's/\.%(ext)s$//')
"#;

/// Writes metadata, two progress lines and a finished file, then exits 0
pub const COMPLETES: &str = r#"
printf '{"title":"Song","channel":"Band","filesize":1000,"ext":"m4a"}' > "$base.tmp"
mv "$base.tmp" "$base.info.json"
sleep 0.2
echo "[download] Destination: $base.m4a"
echo "50 of 100 / NA eta 10"
sleep 0.3
echo "100 of 100 / NA eta 0"
printf 'audio' > "$base.m4a"
printf '%s\n' "$base.m4a" > "$final"
exit 0
"#;

/// Downloads an mp3 source, then grows an opus encode past the stream threshold
pub const REENCODES: &str = r#"
printf '{"title":"Song","channel":"Band","filesize":20000,"ext":"mp3"}' > "$base.tmp"
mv "$base.tmp" "$base.info.json"
dd if=/dev/zero of="$base.mp3" bs=1000 count=20 2>/dev/null
echo "100 of 100 / NA eta 0"
sleep 0.2
dd if=/dev/zero of="$base.opus" bs=1000 count=12 2>/dev/null
sleep 0.5
printf '%s\n' "$base.opus" > "$final"
exit 0
"#;

/// Prints a line but never writes metadata
pub const NO_METADATA: &str = r#"
echo "[generic] probing"
sleep 30
"#;

/// Fails straight away
pub const FAILS: &str = r#"
echo "ERROR: Unsupported URL" >&2
exit 1
"#;

/// Starts downloading, records the pid of a child process, then hangs
pub const HANGS: &str = r#"
printf '{"title":"Long","channel":"Band","ext":"m4a"}' > "$base.tmp"
mv "$base.tmp" "$base.info.json"
sleep 0.1
echo "10 of 100 / NA eta 50"
sleep 30 &
echo $! > "$base.pid"
wait
"#;

/// Write an executable stub tool into `dir`
pub fn write_stub_tool(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("yt-dlp-stub");
    std::fs::write(&path, format!("{PREAMBLE}{body}")).expect("write stub tool");
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
        .expect("make stub tool executable");
    path
}

/// Configuration rooted at `root` running `tool`, with fast polling and no throttling
pub fn test_config(root: &Path, tool: PathBuf) -> Config {
    let mut config = Config::default();
    config.download.web_root = root.to_path_buf();
    config.download.progress_interval = Duration::ZERO;
    config.tools.ytdlp_path = Some(tool);
    config.tools.search_path = false;
    config.staging.metadata_poll_interval = Duration::from_millis(50);
    config.staging.metadata_poll_attempts = 20;
    config
}

/// Whether `pid` names a live (non-zombie) process
#[cfg(target_os = "linux")]
pub fn process_alive(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{pid}/stat")) {
        // state is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state != "Z" && state != "X"),
        Err(_) => false,
    }
}
