//! Per-job state machine
//!
//! ```text
//! Queued -> Launching -> AwaitingMetadata -> Streaming -> Finalizing -> Completed
//!    \__________\_______________\________________\____________\______-> Failed
//! ```
//!
//! The task itself never emits `error`: it returns the error and the caller reports it. A
//! deadline expiry simply drops the task future.

use super::args::build_args;
use super::metadata::read_metadata;
use super::reencode::Estimator;
use crate::command::{LineStream, run_command_lines};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::progress::parse_progress;
use crate::staging::{
    FileProbe, StagingPaths, await_file, display_name, download_url, final_destination, promote,
    read_final_path,
};
use crate::types::{Event, Info, JobId, Progress, StatusMsg};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Lifecycle states of a download task
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Handed over by the dispatcher
    Queued,
    /// Spawning the extraction tool
    Launching,
    /// Waiting for the metadata side-channel
    AwaitingMetadata,
    /// Consuming progress output
    Streaming,
    /// Renaming the output into place
    Finalizing,
    /// `completed` was emitted
    Completed,
    /// The job ended with an error
    Failed,
}

/// How a task ended when it did not fail
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) enum Finish {
    Completed,
    Stalled,
}

/// Emits at most one progress event per interval
///
/// The first progress line and any line at 100% always pass.
#[derive(Debug)]
pub(crate) struct ProgressThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl ProgressThrottle {
    pub(crate) fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub(crate) fn admit(&mut self, progress: &Progress) -> bool {
        let now = Instant::now();
        let due = match self.last {
            None => true,
            Some(last) => progress.pct >= 100.0 || now.duration_since(last) >= self.interval,
        };
        if due {
            self.last = Some(now);
        }
        due
    }
}

pub(super) struct DownloadTask<'a> {
    pub(super) id: JobId,
    pub(super) url: String,
    pub(super) reencode: bool,
    pub(super) paths: StagingPaths,
    pub(super) config: &'a Config,
    pub(super) ytdlp: &'a Path,
    pub(super) events: &'a mpsc::Sender<Event>,
    pub(super) file_probe: &'a dyn FileProbe,
    pub(super) state: TaskState,
    pub(super) info: Info,
}

impl DownloadTask<'_> {
    fn transition(&mut self, next: TaskState) {
        tracing::debug!(job_id = self.id.0, from = ?self.state, to = ?next, "state transition");
        self.state = next;
    }

    async fn emit(&self, event: Event) {
        // A closed output channel means the service is going away; nothing to report to.
        self.events.send(event).await.ok();
    }

    /// Drive the job to completion
    ///
    /// `cancel` scopes the subprocess: cancelling it kills the tool's process group.
    pub(super) async fn run(&mut self, cancel: CancellationToken) -> Result<Finish> {
        self.transition(TaskState::Launching);
        let args = build_args(self.config, &self.paths, &self.url, self.reencode);
        tracing::info!(job_id = self.id.0, url = %self.url, reencode = self.reencode, "fetching url");

        let mut stream = run_command_lines(
            cancel,
            self.ytdlp,
            &args,
            self.config.events.line_buffer,
        )?;

        self.transition(TaskState::AwaitingMetadata);
        let info_path = self.paths.info_json();
        let staging = &self.config.staging;
        let mut lines_open = true;
        let mut errors_open = true;
        {
            let wait = await_file(
                self.file_probe,
                &info_path,
                staging.metadata_poll_attempts,
                staging.metadata_poll_interval,
            );
            tokio::pin!(wait);

            loop {
                tokio::select! {
                    found = &mut wait => {
                        found?;
                        break;
                    }
                    err = stream.errors.recv(), if errors_open => match err {
                        Some(e) => {
                            self.flush_lines(&mut stream).await;
                            return Err(e);
                        }
                        None => errors_open = false,
                    },
                    line = stream.lines.recv(), if lines_open => match line {
                        Some(line) => self.emit(Event::Unknown(line)).await,
                        None => lines_open = false,
                    },
                }
            }
        }

        let metadata = read_metadata(&info_path, staging.metadata_poll_interval).await?;
        self.info = metadata.to_info(self.id);
        let limit = self.config.download.max_file_size;
        if self.info.file_size > limit {
            return Err(Error::FileTooLarge {
                size: self.info.file_size,
                limit,
            });
        }
        self.emit(Event::Info(self.info.clone())).await;

        self.transition(TaskState::Streaming);
        let link_sent = Arc::new(AtomicBool::new(false));
        let mut estimating = self.reencode;
        let estimator = self.estimator(Arc::clone(&link_sent)).run();
        tokio::pin!(estimator);

        let mut throttle = ProgressThrottle::new(self.config.download.progress_interval);
        let mut first_progress: Option<Instant> = None;

        while lines_open || errors_open {
            tokio::select! {
                res = &mut estimator, if estimating => {
                    res?;
                    estimating = false;
                }
                err = stream.errors.recv(), if errors_open => match err {
                    Some(e) => {
                        self.flush_lines(&mut stream).await;
                        return Err(e);
                    }
                    None => errors_open = false,
                },
                line = stream.lines.recv(), if lines_open => match line {
                    Some(line) => match parse_progress(&line) {
                        Some(progress) => {
                            let started = *first_progress.get_or_insert_with(Instant::now);
                            if self.stalled(started, &progress) {
                                tracing::warn!(
                                    job_id = self.id.0,
                                    pct = progress.pct,
                                    "download stalled, restarting"
                                );
                                self.emit(Event::Unknown("Restarting download...".into())).await;
                                return Ok(Finish::Stalled);
                            }
                            if throttle.admit(&progress) {
                                self.info.progress = Some(progress);
                                self.emit(Event::Info(self.info.clone())).await;
                            }
                        }
                        None => self.emit(Event::Unknown(line)).await,
                    },
                    None => lines_open = false,
                },
            }
        }

        self.transition(TaskState::Finalizing);
        let link_already_sent = link_sent.load(Ordering::Acquire);
        self.finalize(link_already_sent).await?;

        self.transition(TaskState::Completed);
        Ok(Finish::Completed)
    }

    /// Relay output that was already buffered when the tool reported failure
    async fn flush_lines(&self, stream: &mut LineStream) {
        while let Ok(line) = stream.lines.try_recv() {
            self.emit(Event::Unknown(line)).await;
        }
    }

    fn stalled(&self, started: Instant, progress: &Progress) -> bool {
        match &self.config.download.stall {
            Some(stall) => started.elapsed() > stall.after && progress.pct < stall.min_percent,
            None => false,
        }
    }

    fn estimator(&self, link_sent: Arc<AtomicBool>) -> Estimator {
        let reencode = &self.config.reencode;
        let encoded_name = self.paths.file_name(&reencode.audio_format);
        let source_path = (self.info.extension == reencode.source_extension)
            .then(|| self.paths.with_extension(&reencode.source_extension));

        Estimator {
            encoded_path: self.paths.with_extension(&reencode.audio_format),
            source_path,
            stream_url: format!(
                "{}/stream/t/{encoded_name}",
                self.config.download.out_path.trim_end_matches('/')
            ),
            info: self.info.clone(),
            config: reencode.clone(),
            events: self.events.clone(),
            link_sent,
        }
    }

    async fn finalize(&mut self, link_already_sent: bool) -> Result<()> {
        let produced = read_final_path(&self.paths.final_path_file()).await?;

        let name = display_name(&self.info.artist, &self.info.title);
        let destination = final_destination(&self.config.output_dir(), &name, &produced);

        promote(&produced, &destination).await?;

        let file_name = destination
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.info.download_url = download_url(&self.config.download.out_path, &file_name);

        if !link_already_sent {
            self.emit(Event::LinkStream(self.info.clone())).await;
        }

        tracing::info!(job_id = self.id.0, url = %self.info.download_url, "download complete");
        self.emit(Event::Completed(StatusMsg {
            id: self.id,
            msg: self.info.download_url.clone(),
        }))
        .await;
        Ok(())
    }
}
