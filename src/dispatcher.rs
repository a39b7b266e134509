//! Bounded-concurrency job dispatcher
//!
//! Jobs enter through [`Dispatcher::enqueue`], which returns only once the dispatcher loop has
//! claimed a worker slot for the job: the loop acquires a semaphore permit, takes the next job
//! and acknowledges it, so callers are held back while every slot is busy. The job then runs on
//! its own task and the permit is released when the task ends. A job that was never
//! acknowledged is not run, and its `enqueue` call reports [`Error::ShuttingDown`].
//!
//! Workers report how a job ended through [`JobOutcome`]. A stalled job is run again with
//! exponential backoff (see [`crate::retry`]); every other outcome ends the job. A worker that
//! panics is logged and its slot released; the dispatcher keeps running.
//!
//! On shutdown the loop stops taking jobs, later `enqueue` calls fail with
//! [`Error::ShuttingDown`], and [`Dispatcher::start`] returns only after every in-flight job
//! has finished. Jobs are not killed; each is bounded by its own deadline.

use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::retry::run_with_retry;
use crate::types::{Job, JobOutcome};
use async_trait::async_trait;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Turns one job into events
///
/// Implementations must not fail: every error is reported as an event and summarized in the
/// returned [`JobOutcome`].
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Process a single job to completion
    async fn work(&self, job: Job) -> JobOutcome;
}

/// A job waiting to be claimed, with the channel that tells its submitter it was
struct Handoff {
    job: Job,
    claimed: oneshot::Sender<()>,
}

/// Runs jobs through a [`Worker`] with at most `max_concurrency` in flight
pub struct Dispatcher {
    worker: Arc<dyn Worker>,
    max_concurrency: usize,
    retry: RetryConfig,
    queue_tx: mpsc::Sender<Handoff>,
    queue_rx: Mutex<Option<mpsc::Receiver<Handoff>>>,
    tracker: TaskTracker,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("max_concurrency", &self.max_concurrency)
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

impl Dispatcher {
    /// Create a dispatcher; `max_concurrency` is raised to 1 if zero
    pub fn new(worker: Arc<dyn Worker>, max_concurrency: usize, retry: RetryConfig) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(1);
        Self {
            worker,
            max_concurrency: max_concurrency.max(1),
            retry,
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            tracker: TaskTracker::new(),
        }
    }

    /// Submit a job, waiting until a worker slot has been claimed for it
    ///
    /// Once this returns `Ok` the job is guaranteed to run, even if shutdown follows. If the
    /// returned future is dropped before then, the job is discarded.
    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let (claimed, ack) = oneshot::channel();
        self.queue_tx
            .send(Handoff { job, claimed })
            .await
            .map_err(|_| Error::ShuttingDown)?;
        // The sender is dropped unclaimed when the loop stops first.
        ack.await.map_err(|_| Error::ShuttingDown)
    }

    /// Number of jobs currently running
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Run the dispatch loop until `shutdown` is cancelled, then drain in-flight jobs
    ///
    /// May only be called once.
    pub async fn start(&self, shutdown: CancellationToken) -> Result<()> {
        let mut queue = match self.queue_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
        .ok_or_else(|| Error::Other("dispatcher already started".into()))?;

        let slots = Arc::new(Semaphore::new(self.max_concurrency));
        tracing::info!(max_concurrency = self.max_concurrency, "dispatcher started");

        loop {
            let permit = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                permit = Arc::clone(&slots).acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
            };

            let Handoff { job, claimed } = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                handoff = queue.recv() => match handoff {
                    Some(handoff) => handoff,
                    None => break,
                },
            };

            if claimed.send(()).is_err() {
                tracing::debug!(url = %job.url, "submitter gave up before the job was claimed");
                continue;
            }

            tracing::debug!(url = %job.url, in_flight = self.tracker.len() + 1, "job claimed");

            let worker = Arc::clone(&self.worker);
            let retry = self.retry.clone();
            self.tracker.spawn(async move {
                let _permit = permit;
                let url = job.url.clone();
                let run = run_with_retry(&retry, |attempt| {
                    let worker = Arc::clone(&worker);
                    let job = job.clone();
                    async move {
                        if attempt > 0 {
                            tracing::info!(url = %job.url, attempt, "restarting stalled job");
                        }
                        worker.work(job).await
                    }
                });

                match AssertUnwindSafe(run).catch_unwind().await {
                    Ok(outcome) => tracing::debug!(url = %url, ?outcome, "job finished"),
                    Err(_) => tracing::error!(url = %url, "worker panicked, job abandoned"),
                }
            });
        }

        // Closing the queue makes later enqueue calls fail fast; dropping it releases any
        // unclaimed handoff so its submitter sees `ShuttingDown`.
        queue.close();
        drop(queue);

        tracing::info!(in_flight = self.tracker.len(), "dispatcher stopping, waiting for jobs");
        self.tracker.close();
        self.tracker.wait().await;
        tracing::info!("dispatcher stopped");
        Ok(())
    }
}
