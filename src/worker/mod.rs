//! Download worker
//!
//! [`Downloader`] turns one submitted URL into a stream of [`Event`]s: it launches the
//! extraction tool, waits for the metadata side-channel, relays progress and promotes the
//! finished file into the output directory. Every job runs under the configured process
//! deadline; when it expires the tool's process group is killed and the job ends without a
//! terminal event.

mod args;
mod metadata;
mod reencode;
mod task;

pub use args::should_reencode;
pub use metadata::MediaMetadata;
pub use reencode::estimate_progress;
pub use task::TaskState;

pub(crate) use args::url_host;

use crate::config::Config;
use crate::dispatcher::Worker;
use crate::staging::{FileProbe, FsProbe, StagingPaths};
use crate::types::{Event, Info, Job, JobId, JobOutcome, StatusMsg};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use task::{DownloadTask, Finish};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs the extraction tool for one job at a time per call
#[derive(Clone)]
pub struct Downloader {
    config: Arc<Config>,
    ytdlp: PathBuf,
    events: mpsc::Sender<Event>,
    file_probe: Arc<dyn FileProbe>,
}

impl std::fmt::Debug for Downloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Downloader")
            .field("ytdlp", &self.ytdlp)
            .field("output_dir", &self.config.output_dir())
            .finish()
    }
}

impl Downloader {
    /// Create a downloader publishing into `events`
    pub fn new(config: Arc<Config>, events: mpsc::Sender<Event>) -> Self {
        let ytdlp = config.tools.ytdlp_binary();
        Self {
            config,
            ytdlp,
            events,
            file_probe: Arc::new(FsProbe),
        }
    }

    /// Replace the probe used to detect the metadata side-channel
    pub fn with_file_probe(mut self, probe: Arc<dyn FileProbe>) -> Self {
        self.file_probe = probe;
        self
    }

    /// Path of the extraction tool this downloader runs
    pub fn ytdlp_path(&self) -> &std::path::Path {
        &self.ytdlp
    }

    /// Run one job to its end
    ///
    /// Emits `error` for failures other than the deadline; a timed out job emits nothing
    /// further.
    pub async fn download(&self, job: &Job) -> JobOutcome {
        let id = JobId::generate();

        let reencode = match url_host(&job.url) {
            Ok(host) => should_reencode(&host, &self.config.reencode.no_reencode_sites),
            Err(e) => {
                tracing::warn!(job_id = id.0, url = %job.url, error = %e, "rejecting job");
                self.report_error(id, &e).await;
                return JobOutcome::Failed;
            }
        };

        let mut task = DownloadTask {
            id,
            url: job.url.clone(),
            reencode,
            paths: StagingPaths::for_url(&self.config.temp_dir(), &job.url),
            config: &self.config,
            ytdlp: &self.ytdlp,
            events: &self.events,
            file_probe: self.file_probe.as_ref(),
            state: TaskState::Queued,
            info: Info {
                id,
                ..Info::default()
            },
        };

        // Leaving this scope on any path kills the tool's process group.
        let cancel = CancellationToken::new();
        let _guard = cancel.clone().drop_guard();

        let deadline = self.config.download.max_process_time;
        let result = tokio::time::timeout(deadline, task.run(cancel)).await;
        match result {
            Ok(Ok(Finish::Completed)) => JobOutcome::Completed,
            Ok(Ok(Finish::Stalled)) => JobOutcome::Stalled,
            Ok(Err(e)) => {
                let state = task.state;
                task.state = TaskState::Failed;
                tracing::error!(job_id = id.0, url = %job.url, ?state, error = %e, "download failed");
                self.report_error(id, &e).await;
                JobOutcome::Failed
            }
            Err(_) => {
                tracing::warn!(
                    job_id = id.0,
                    url = %job.url,
                    state = ?task.state,
                    deadline_secs = deadline.as_secs(),
                    "download exceeded its deadline, killing process"
                );
                task.state = TaskState::Failed;
                JobOutcome::TimedOut
            }
        }
    }

    async fn report_error(&self, id: JobId, error: &crate::Error) {
        let event = Event::Error(StatusMsg {
            id,
            msg: error.to_string(),
        });
        self.events.send(event).await.ok();
    }
}

#[async_trait]
impl Worker for Downloader {
    async fn work(&self, job: Job) -> JobOutcome {
        self.download(&job).await
    }
}
