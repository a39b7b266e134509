//! Configuration types for ytdl-web
//!
//! Every knob the pipeline needs is carried in [`Config`] and handed to constructors
//! explicitly; nothing is read from process-wide state.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::PathBuf, time::Duration};

/// Default per-job processing budget
pub const DEFAULT_MAX_PROCESS_TIME: Duration = Duration::from_secs(5 * 60);

/// Smallest per-job budget accepted; anything lower falls back to the default
pub const MIN_MAX_PROCESS_TIME: Duration = Duration::from_secs(30);

/// Hard ceiling on the declared media size (500 MiB)
pub const DEFAULT_MAX_FILE_SIZE: i64 = 500 * 1024 * 1024;

/// Download behavior configuration (directories, concurrency, limits)
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Web root directory (default: "html")
    #[serde(default = "default_web_root")]
    pub web_root: PathBuf,

    /// Output directory, relative to the web root (default: "dl")
    ///
    /// This is also the URL prefix of issued download links.
    #[serde(default = "default_out_path")]
    pub out_path: String,

    /// Maximum concurrent jobs (default: 10)
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Maximum processing time for a single job (default: 5 minutes, floor 30 seconds)
    #[serde(default = "default_max_process_time", with = "duration_ms_serde")]
    pub max_process_time: Duration,

    /// Declared file size above which a job is aborted (default: 500 MiB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: i64,

    /// Minimum spacing between progress events of one job (default: 500ms)
    #[serde(default = "default_progress_interval", with = "duration_ms_serde")]
    pub progress_interval: Duration,

    /// Restart jobs whose download makes no headway (disabled by default)
    #[serde(default)]
    pub stall: Option<StallConfig>,

    /// Age after which served files are removed (default: 2 hours)
    #[serde(default = "default_expiry", with = "duration_ms_serde")]
    pub expiry: Duration,

    /// How often the expiry sweep runs (default: 30 seconds)
    #[serde(default = "default_cleanup_interval", with = "duration_ms_serde")]
    pub cleanup_interval: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            web_root: default_web_root(),
            out_path: default_out_path(),
            max_concurrent_downloads: default_max_concurrent(),
            max_process_time: default_max_process_time(),
            max_file_size: default_max_file_size(),
            progress_interval: default_progress_interval(),
            stall: None,
            expiry: default_expiry(),
            cleanup_interval: default_cleanup_interval(),
        }
    }
}

/// Stalled-download detection
///
/// A job whose progress is still below `min_percent` once `after` has elapsed since its
/// first progress line is abandoned and handed back to the dispatcher for a retry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StallConfig {
    /// Grace period measured from the first progress line (default: 5 seconds)
    #[serde(default = "default_stall_after", with = "duration_ms_serde")]
    pub after: Duration,

    /// Progress percentage that must be reached within the grace period (default: 10)
    #[serde(default = "default_stall_min_percent")]
    pub min_percent: f32,
}

impl Default for StallConfig {
    fn default() -> Self {
        Self {
            after: default_stall_after(),
            min_percent: default_stall_min_percent(),
        }
    }
}

/// External tool paths and invocation bounds
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the extraction tool (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Path to the probing tool (auto-detected if None)
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,

    /// Whether to search PATH for external binaries if explicit paths not set (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Socket/connect timeout passed to the extraction tool, in seconds (default: 10)
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,

    /// Timeout for a single probe invocation (default: 10 seconds)
    #[serde(default = "default_probe_timeout", with = "duration_ms_serde")]
    pub probe_timeout: Duration,

    /// Extra arguments appended before the URL
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Binary name of the extraction tool
pub const YTDLP_BINARY: &str = "yt-dlp";

impl ToolsConfig {
    /// Extraction tool to run
    ///
    /// The explicit path wins; otherwise PATH is searched when `search_path` is set. Failing
    /// both, the bare binary name is used and a missing tool surfaces as a spawn error.
    pub fn ytdlp_binary(&self) -> PathBuf {
        if let Some(path) = &self.ytdlp_path {
            return path.clone();
        }
        if self.search_path
            && let Ok(found) = which::which(YTDLP_BINARY)
        {
            return found;
        }
        PathBuf::from(YTDLP_BINARY)
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffprobe_path: None,
            search_path: true,
            socket_timeout_secs: default_socket_timeout(),
            probe_timeout: default_probe_timeout(),
            extra_args: Vec::new(),
        }
    }
}

/// SponsorBlock segment removal
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SponsorBlockConfig {
    /// Enable SponsorBlock segment removal (default: false)
    #[serde(default)]
    pub enabled: bool,

    /// Comma separated categories to remove (default: "sponsor")
    #[serde(default = "default_sponsorblock_categories")]
    pub categories: String,
}

impl Default for SponsorBlockConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            categories: default_sponsorblock_categories(),
        }
    }
}

/// Audio re-encoding and the output-size progress estimate
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReencodeConfig {
    /// Hosts (substring match) whose media is kept in its original format
    #[serde(default = "default_no_reencode_sites")]
    pub no_reencode_sites: Vec<String>,

    /// Target audio format (default: "opus")
    #[serde(default = "default_audio_format")]
    pub audio_format: String,

    /// Target audio quality (default: "32K")
    #[serde(default = "default_audio_quality")]
    pub audio_quality: String,

    /// Source extension for which a completion estimate is computed (default: "mp3")
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    /// Expected source:encoded size ratio (default: 4.0)
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: f64,

    /// Encoded bytes required before a stream link is published (default: 10000)
    #[serde(default = "default_stream_threshold")]
    pub stream_threshold_bytes: u64,

    /// How often the growing output is measured (default: 1 second)
    #[serde(default = "default_estimate_interval", with = "duration_ms_serde")]
    pub estimate_interval: Duration,
}

impl Default for ReencodeConfig {
    fn default() -> Self {
        Self {
            no_reencode_sites: default_no_reencode_sites(),
            audio_format: default_audio_format(),
            audio_quality: default_audio_quality(),
            source_extension: default_source_extension(),
            compression_ratio: default_compression_ratio(),
            stream_threshold_bytes: default_stream_threshold(),
            estimate_interval: default_estimate_interval(),
        }
    }
}

/// Side-channel file polling
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StagingConfig {
    /// Interval between metadata file checks (default: 500ms)
    #[serde(default = "default_metadata_poll_interval", with = "duration_ms_serde")]
    pub metadata_poll_interval: Duration,

    /// Number of checks before giving up (default: 20)
    #[serde(default = "default_metadata_poll_attempts")]
    pub metadata_poll_attempts: u32,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            metadata_poll_interval: default_metadata_poll_interval(),
            metadata_poll_attempts: default_metadata_poll_attempts(),
        }
    }
}

/// Channel sizing for the event path
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventConfig {
    /// Buffered lines between a subprocess and its worker (default: 64)
    #[serde(default = "default_line_buffer")]
    pub line_buffer: usize,

    /// Buffered events between workers and the fan-out loop (default: 1000)
    #[serde(default = "default_output_buffer")]
    pub output_buffer: usize,

    /// Buffered events per subscriber before messages are dropped (default: 256)
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            line_buffer: default_line_buffer(),
            output_buffer: default_output_buffer(),
            subscriber_buffer: default_subscriber_buffer(),
        }
    }
}

/// Retry configuration for stalled jobs
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 2)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Address to bind to (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_address")]
    pub bind_address: SocketAddr,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (empty or "*" means any)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// SSE keep-alive interval (default: 5 seconds)
    #[serde(default = "default_keep_alive", with = "duration_ms_serde")]
    pub keep_alive: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            cors_enabled: true,
            cors_origins: Vec::new(),
            keep_alive: default_keep_alive(),
        }
    }
}

/// Main configuration for YtdlService
///
/// Fields are organized into logical sub-configs:
/// - [`download`](DownloadConfig): directories, concurrency, limits
/// - [`tools`](ToolsConfig): external binary paths and bounds
/// - [`sponsorblock`](SponsorBlockConfig): segment removal
/// - [`reencode`](ReencodeConfig): re-encoding and its progress estimate
/// - [`staging`](StagingConfig): side-channel polling
/// - [`events`](EventConfig): channel sizing
/// - [`retry`](RetryConfig): backoff for stalled jobs
/// - [`api`](ApiConfig): HTTP adapter
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(default)]
    pub download: DownloadConfig,

    /// External tool paths
    #[serde(default)]
    pub tools: ToolsConfig,

    /// SponsorBlock settings
    #[serde(default)]
    pub sponsorblock: SponsorBlockConfig,

    /// Re-encoding settings
    #[serde(default)]
    pub reencode: ReencodeConfig,

    /// Side-channel polling
    #[serde(default)]
    pub staging: StagingConfig,

    /// Event channel sizing
    #[serde(default)]
    pub events: EventConfig,

    /// Retry policy for stalled jobs
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP adapter settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Absolute-or-relative directory holding finished files (`<web_root>/<out_path>`)
    pub fn output_dir(&self) -> PathBuf {
        self.download.web_root.join(&self.download.out_path)
    }

    /// Working directory for in-progress files (`<web_root>/<out_path>/t`)
    pub fn temp_dir(&self) -> PathBuf {
        self.output_dir().join("t")
    }

    /// Normalize and check the configuration
    ///
    /// A processing budget below the 30 second floor is replaced by the default. Zero-sized
    /// buffers and a zero concurrency limit are rejected.
    pub fn validate(mut self) -> Result<Self> {
        if self.download.max_process_time < MIN_MAX_PROCESS_TIME {
            tracing::warn!(
                requested = ?self.download.max_process_time,
                default = ?DEFAULT_MAX_PROCESS_TIME,
                "max_process_time below floor, using default"
            );
            self.download.max_process_time = DEFAULT_MAX_PROCESS_TIME;
        }

        if self.download.max_concurrent_downloads == 0 {
            return Err(config_error(
                "max_concurrent_downloads must be at least 1",
                "max_concurrent_downloads",
            ));
        }

        if self.download.out_path.is_empty()
            || self.download.out_path.contains("..")
            || self.download.out_path.starts_with('/')
        {
            return Err(config_error(
                "out_path must be a non-empty relative path",
                "out_path",
            ));
        }

        for (value, key) in [
            (self.events.line_buffer, "line_buffer"),
            (self.events.output_buffer, "output_buffer"),
            (self.events.subscriber_buffer, "subscriber_buffer"),
        ] {
            if value == 0 {
                return Err(config_error(format!("{key} must be at least 1"), key));
            }
        }

        if self.staging.metadata_poll_attempts == 0 {
            return Err(config_error(
                "metadata_poll_attempts must be at least 1",
                "metadata_poll_attempts",
            ));
        }

        if self.reencode.compression_ratio <= 0.0 {
            return Err(config_error(
                "compression_ratio must be positive",
                "compression_ratio",
            ));
        }

        Ok(self)
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_web_root() -> PathBuf {
    PathBuf::from("html")
}

fn default_out_path() -> String {
    "dl".to_string()
}

fn default_max_concurrent() -> usize {
    10
}

fn default_max_process_time() -> Duration {
    DEFAULT_MAX_PROCESS_TIME
}

fn default_max_file_size() -> i64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_progress_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_expiry() -> Duration {
    Duration::from_secs(2 * 60 * 60)
}

fn default_cleanup_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_stall_after() -> Duration {
    Duration::from_secs(5)
}

fn default_stall_min_percent() -> f32 {
    10.0
}

fn default_true() -> bool {
    true
}

fn default_socket_timeout() -> u64 {
    10
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_sponsorblock_categories() -> String {
    "sponsor".to_string()
}

fn default_no_reencode_sites() -> Vec<String> {
    ["youtube.com", "twitter.com", "rumble.com"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_audio_format() -> String {
    "opus".to_string()
}

fn default_audio_quality() -> String {
    "32K".to_string()
}

fn default_source_extension() -> String {
    "mp3".to_string()
}

fn default_compression_ratio() -> f64 {
    4.0
}

fn default_stream_threshold() -> u64 {
    10_000
}

fn default_estimate_interval() -> Duration {
    Duration::from_secs(1)
}

fn default_metadata_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_metadata_poll_attempts() -> u32 {
    20
}

fn default_line_buffer() -> usize {
    64
}

fn default_output_buffer() -> usize {
    1000
}

fn default_subscriber_buffer() -> usize {
    256
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_keep_alive() -> Duration {
    Duration::from_secs(5)
}

// Durations are carried as integer milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.download.web_root, PathBuf::from("html"));
        assert_eq!(config.download.out_path, "dl");
        assert_eq!(config.download.max_concurrent_downloads, 10);
        assert_eq!(config.download.max_process_time, DEFAULT_MAX_PROCESS_TIME);
        assert_eq!(config.download.max_file_size, 500 * 1024 * 1024);
        assert!(config.download.stall.is_none());
        assert_eq!(config.staging.metadata_poll_attempts, 20);
        assert_eq!(
            config.staging.metadata_poll_interval,
            Duration::from_millis(500)
        );
        assert_eq!(config.reencode.audio_format, "opus");
        assert_eq!(config.reencode.compression_ratio, 4.0);
        assert!(config.tools.search_path);
        assert!(!config.sponsorblock.enabled);
    }

    #[test]
    fn durations_round_trip_as_milliseconds() {
        let mut config = Config::default();
        config.staging.metadata_poll_interval = Duration::from_millis(50);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["staging"]["metadata_poll_interval"], 50);

        let back: Config = serde_json::from_value(json).unwrap();
        assert_eq!(
            back.staging.metadata_poll_interval,
            Duration::from_millis(50)
        );
    }

    #[test]
    fn validate_replaces_budget_below_floor() {
        let mut config = Config::default();
        config.download.max_process_time = Duration::from_secs(5);

        let config = config.validate().unwrap();
        assert_eq!(config.download.max_process_time, DEFAULT_MAX_PROCESS_TIME);
    }

    #[test]
    fn validate_keeps_budget_at_floor() {
        let mut config = Config::default();
        config.download.max_process_time = MIN_MAX_PROCESS_TIME;

        let config = config.validate().unwrap();
        assert_eq!(config.download.max_process_time, MIN_MAX_PROCESS_TIME);
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.download.max_concurrent_downloads = 0;

        match config.validate() {
            Err(Error::Config { key, .. }) => {
                assert_eq!(key.as_deref(), Some("max_concurrent_downloads"))
            }
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn validate_rejects_escaping_out_path() {
        let mut config = Config::default();
        config.download.out_path = "../elsewhere".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_subscriber_buffer() {
        let mut config = Config::default();
        config.events.subscriber_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_ytdlp_path_wins() {
        let tools = ToolsConfig {
            ytdlp_path: Some(PathBuf::from("/opt/yt-dlp")),
            ..ToolsConfig::default()
        };
        assert_eq!(tools.ytdlp_binary(), PathBuf::from("/opt/yt-dlp"));
    }

    #[test]
    fn ytdlp_falls_back_to_bare_name_without_search() {
        let tools = ToolsConfig {
            search_path: false,
            ..ToolsConfig::default()
        };
        assert_eq!(tools.ytdlp_binary(), PathBuf::from(YTDLP_BINARY));
    }

    #[test]
    fn derived_directories() {
        let mut config = Config::default();
        config.download.web_root = PathBuf::from("/srv/www");
        config.download.out_path = "media".to_string();

        assert_eq!(config.output_dir(), PathBuf::from("/srv/www/media"));
        assert_eq!(config.temp_dir(), PathBuf::from("/srv/www/media/t"));
    }
}
