//! # ytdl-web
//!
//! Job dispatch and download worker pipeline for a media-extraction web frontend.
//!
//! Submitted URLs are queued, run through an external extraction tool under a bounded
//! number of concurrent workers, and every step of every job is broadcast as an [`Event`]
//! to any number of independently paced subscribers.
//!
//! ## Pipeline
//!
//! - [`dispatcher`] - bounded-concurrency queue with graceful drain and retry of stalled jobs
//! - [`worker`] - per-job state machine driving the extraction tool
//! - [`command`] - subprocess runner with line streaming and process-group cancellation
//! - [`progress`] - progress line parser
//! - [`staging`] - side-channel polling, filename sanitization, final rename
//! - [`fanout`] - at-most-once event broadcast to subscribers
//!
//! ## Quick Start
//!
//! ```no_run
//! use ytdl_web::{Config, YtdlService};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = YtdlService::new(Config::default()).await?;
//!     service.start()?;
//!
//!     let mut events = service.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}: {:?}", event.key(), event);
//!         }
//!     });
//!
//!     service.enqueue("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
//!     service.shutdown().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// HTTP adapter
pub mod api;
/// Subprocess execution
pub mod command;
/// Configuration types
pub mod config;
/// Job dispatcher
pub mod dispatcher;
/// Error types
pub mod error;
/// Event fan-out
pub mod fanout;
/// Served-file library
pub mod library;
/// Media tag probing
pub mod probe;
/// Progress line parsing
pub mod progress;
/// Retry logic with exponential backoff
pub mod retry;
/// Service composition and lifecycle
pub mod service;
/// File staging
pub mod staging;
/// Core types and events
pub mod types;
/// Download worker
pub mod worker;

// Re-export commonly used types
pub use config::Config;
pub use dispatcher::{Dispatcher, Worker};
pub use error::{ApiError, Error, ErrorDetail, Result, ToHttpStatus};
pub use fanout::{EventHub, SubscriberId, Subscription};
pub use probe::{FfprobeProbe, MediaProbe, NoOpProbe, ProbeTags};
pub use service::YtdlService;
pub use types::{Event, EventKey, Info, Job, JobId, JobOutcome, Progress, RecentEntry, StatusMsg};
pub use worker::Downloader;

/// Wait for SIGTERM or SIGINT (Ctrl+C elsewhere), then shut the service down gracefully
///
/// # Example
///
/// ```no_run
/// use ytdl_web::{Config, YtdlService, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = YtdlService::new(Config::default()).await?;
///     service.start()?;
///     run_with_shutdown(&service).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(service: &YtdlService) -> Result<()> {
    wait_for_signal().await;
    service.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments; fall back to whatever is available.
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("received SIGTERM"),
                _ = sigint.recv() => tracing::info!("received SIGINT"),
            }
        }
        (Ok(mut only), Err(e)) | (Err(e), Ok(mut only)) => {
            tracing::warn!(error = %e, "could not register both signal handlers");
            only.recv().await;
            tracing::info!("received termination signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(error = %e, "could not register signal handlers, using ctrl_c");
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
    }
}
