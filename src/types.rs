//! Core types for ytdl-web

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use utoipa::ToSchema;

/// Identifier of a single download task
///
/// Ids are derived from the submission time in microseconds and are strictly increasing
/// within a process, even when two jobs are claimed in the same microsecond.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
)]
#[serde(transparent)]
pub struct JobId(pub i64);

static LAST_JOB_ID: AtomicI64 = AtomicI64::new(0);

impl JobId {
    /// Generate the next id from the current time
    pub fn generate() -> Self {
        let now = Utc::now().timestamp_micros();
        let mut prev = LAST_JOB_ID.load(Ordering::Relaxed);
        loop {
            let next = now.max(prev + 1);
            match LAST_JOB_ID.compare_exchange_weak(prev, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return Self(next),
                Err(actual) => prev = actual,
            }
        }
    }

    /// Get the inner i64 value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work submitted to the dispatcher
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Job {
    /// Media URL to download
    #[serde(rename = "URL")]
    pub url: String,
}

impl Job {
    /// Create a job for the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// Download progress parsed from one tool output line
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Progress {
    /// Completion percentage in `[0, 100]`
    #[serde(rename = "Pct")]
    pub pct: f32,

    /// Total size in bytes (exact or estimated)
    #[serde(rename = "FileSize")]
    pub file_size: i64,

    /// Estimated time remaining, serialized as whole seconds
    #[serde(rename = "ETA", with = "duration_secs_serde")]
    #[schema(value_type = u64)]
    pub eta: Duration,
}

/// Metadata describing the media being downloaded
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct Info {
    /// Job id
    pub id: JobId,

    /// Media title
    pub title: String,

    /// Channel or series name
    pub artist: String,

    /// Declared size in bytes
    pub file_size: i64,

    /// Extension the tool will produce before post-processing
    pub extension: String,

    /// Link the client can fetch (set on `link_stream`)
    #[serde(rename = "DownloadURL")]
    pub download_url: String,

    /// Whether sponsor segments were removed (playback timing differs from the source)
    pub sponsor_block: bool,

    /// Latest progress, if any has been reported
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub progress: Option<Progress>,
}

/// Payload of terminal `completed` and `error` events
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "PascalCase")]
pub struct StatusMsg {
    /// Job id
    pub id: JobId,

    /// Human-readable message
    pub msg: String,
}

/// Events delivered to subscribers
///
/// Serialized as `{"Key": "<key>", "Value": <payload>}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "Key", content = "Value", rename_all = "snake_case")]
pub enum Event {
    /// Metadata became available or progress was reported
    Info(Info),

    /// Raw tool output that is not a progress line
    Unknown(String),

    /// A playable (possibly partial) file is available at `DownloadURL`
    LinkStream(Info),

    /// The job finished successfully
    Completed(StatusMsg),

    /// The job failed
    Error(StatusMsg),
}

impl Event {
    /// The event's key
    pub fn key(&self) -> EventKey {
        match self {
            Event::Info(_) => EventKey::Info,
            Event::Unknown(_) => EventKey::Unknown,
            Event::LinkStream(_) => EventKey::LinkStream,
            Event::Completed(_) => EventKey::Completed,
            Event::Error(_) => EventKey::Error,
        }
    }

    /// Whether this event ends a job's event sequence
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Completed(_) | Event::Error(_))
    }
}

/// Discriminant of [`Event`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum EventKey {
    /// `info`
    Info,
    /// `unknown`
    Unknown,
    /// `link_stream`
    LinkStream,
    /// `completed`
    Completed,
    /// `error`
    Error,
}

impl EventKey {
    /// Wire name of the key
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKey::Info => "info",
            EventKey::Unknown => "unknown",
            EventKey::LinkStream => "link_stream",
            EventKey::Completed => "completed",
            EventKey::Error => "error",
        }
    }
}

impl std::fmt::Display for EventKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A previously downloaded file still present in the output directory
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct RecentEntry {
    /// Link relative to the web root
    #[serde(rename = "URL")]
    pub url: String,

    /// Title tag, or empty
    #[serde(rename = "Title")]
    pub title: String,

    /// Artist tag, or empty
    #[serde(rename = "Artist")]
    pub artist: String,

    /// File modification time
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
}

/// How a single [`Worker`](crate::dispatcher::Worker) invocation ended
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum JobOutcome {
    /// A `completed` event was emitted
    Completed,
    /// An `error` event was emitted
    Failed,
    /// The per-job deadline expired or the job was cancelled; nothing was emitted
    TimedOut,
    /// The download made no headway and should be run again
    Stalled,
}

mod duration_secs_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
