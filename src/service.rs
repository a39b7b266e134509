//! Service composition: configuration, event hub, downloader, dispatcher and file library

use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};
use crate::fanout::{EventHub, SubscriberId, Subscription};
use crate::library::Library;
use crate::probe::probe_from_config;
use crate::types::{Event, Job, RecentEntry};
use crate::worker::{Downloader, url_host};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// The download service
///
/// Created with [`YtdlService::new`], started with [`YtdlService::start`] and stopped with
/// [`YtdlService::shutdown`]. Consumers submit URLs through [`YtdlService::enqueue`] and
/// observe progress by subscribing to events.
pub struct YtdlService {
    config: Arc<Config>,
    hub: EventHub,
    dispatcher: Arc<Dispatcher>,
    library: Library,
    output_rx: Mutex<Option<mpsc::Receiver<Event>>>,
    dispatcher_task: Mutex<Option<JoinHandle<Result<()>>>>,
    accepting: AtomicBool,
    /// Stops the dispatch loop
    dispatch_stop: CancellationToken,
    /// Stops the forwarder and the expiry sweep once jobs have drained
    background_stop: CancellationToken,
    background: TaskTracker,
}

impl std::fmt::Debug for YtdlService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YtdlService")
            .field("output_dir", &self.config.output_dir())
            .field("dispatcher", &self.dispatcher)
            .field("hub", &self.hub)
            .field("accepting", &self.accepting.load(Ordering::Relaxed))
            .finish()
    }
}

impl YtdlService {
    /// Build the service from a configuration
    ///
    /// Validates the configuration and creates the working directory.
    pub async fn new(config: Config) -> Result<Self> {
        let config = Arc::new(config.validate()?);

        let temp_dir = config.temp_dir();
        tokio::fs::create_dir_all(&temp_dir).await?;
        tracing::info!(output_dir = ?config.output_dir(), "output directory ready");

        let hub = EventHub::new(config.events.subscriber_buffer);
        let (output_tx, output_rx) = mpsc::channel(config.events.output_buffer);

        let downloader = Downloader::new(Arc::clone(&config), output_tx);
        tracing::info!(ytdlp = ?downloader.ytdlp_path(), "extraction tool resolved");

        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(downloader),
            config.download.max_concurrent_downloads,
            config.retry.clone(),
        ));

        let library = Library::new(
            config.download.web_root.clone(),
            config.download.out_path.clone(),
            probe_from_config(&config.tools),
        );

        Ok(Self {
            config,
            hub,
            dispatcher,
            library,
            output_rx: Mutex::new(Some(output_rx)),
            dispatcher_task: Mutex::new(None),
            accepting: AtomicBool::new(true),
            dispatch_stop: CancellationToken::new(),
            background_stop: CancellationToken::new(),
            background: TaskTracker::new(),
        })
    }

    /// Start the event forwarder, the dispatch loop and the expiry sweep
    ///
    /// Must be called once before jobs are enqueued.
    pub fn start(&self) -> Result<()> {
        let output_rx = match self.output_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
        .ok_or_else(|| Error::Other("service already started".into()))?;

        let hub = self.hub.clone();
        let stop = self.background_stop.clone();
        self.background
            .spawn(async move { hub.forward(output_rx, stop).await });

        let dispatcher = Arc::clone(&self.dispatcher);
        let stop = self.dispatch_stop.clone();
        let handle = self
            .background
            .spawn(async move { dispatcher.start(stop).await });
        match self.dispatcher_task.lock() {
            Ok(mut guard) => *guard = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }

        let library = self.library.clone();
        let download = &self.config.download;
        let (interval, expiry) = (download.cleanup_interval, download.expiry);
        let stop = self.background_stop.clone();
        self.background.spawn(async move {
            library.run_expiry_sweep(interval, expiry, stop).await;
        });

        tracing::info!("service started");
        Ok(())
    }

    /// Submit a URL for download
    ///
    /// Waits while every worker slot is busy. Fails with [`Error::InvalidUrl`] for an empty or
    /// unparsable URL and [`Error::ShuttingDown`] once shutdown has begun.
    pub async fn enqueue(&self, url: impl Into<String>) -> Result<()> {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(Error::ShuttingDown);
        }
        let url = url.into();
        url_host(&url)?;
        tracing::debug!(url = %url, "job submitted");
        self.dispatcher.enqueue(Job::new(url)).await
    }

    /// Register an event subscriber
    pub fn subscribe(&self) -> Subscription {
        self.hub.subscribe()
    }

    /// Remove an event subscriber by id
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.hub.unsubscribe(id)
    }

    /// The event hub
    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Finished downloads still present in the output directory, newest first
    pub async fn recent(&self) -> Result<Vec<RecentEntry>> {
        self.library.recent().await
    }

    /// Delete previously issued download links
    pub async fn delete_files(&self, urls: &[String]) -> Result<()> {
        self.library.delete_files(urls).await
    }

    /// Number of jobs currently running
    pub fn in_flight(&self) -> usize {
        self.dispatcher.in_flight()
    }

    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// Active configuration
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Stop accepting jobs, wait for in-flight jobs, then stop background tasks
    ///
    /// Running jobs are not killed; each ends by itself or at its own deadline.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("initiating graceful shutdown");
        self.accepting.store(false, Ordering::SeqCst);
        self.dispatch_stop.cancel();

        let handle = match self.dispatcher_task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            match handle.await {
                Ok(Ok(())) => tracing::info!("all jobs finished"),
                Ok(Err(e)) => tracing::warn!(error = %e, "dispatcher stopped with error"),
                Err(e) => tracing::error!(error = %e, "dispatcher task failed"),
            }
        }

        self.background_stop.cancel();
        self.background.close();
        self.background.wait().await;

        tracing::info!("graceful shutdown complete");
        Ok(())
    }
}
