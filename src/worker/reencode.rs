//! Progress estimate for re-encoded output
//!
//! While the tool transcodes, its own progress lines stop. The size of the growing encoded
//! file, compared against the source size scaled by the expected compression ratio, gives a
//! rough completion figure. Once the encoded file holds enough bytes a stream link is
//! published so clients can start playback early.

use crate::config::ReencodeConfig;
use crate::error::{Error, Result};
use crate::types::{Event, Info, Progress};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Estimated progress of an encode
///
/// `encoded` bytes written so far against a `source` of known size, assuming the encoder
/// shrinks its input by `ratio`. Returns `None` when no estimate is possible.
pub fn estimate_progress(
    encoded: u64,
    source: u64,
    ratio: f64,
    elapsed: Duration,
) -> Option<Progress> {
    if source == 0 || ratio <= 0.0 {
        return None;
    }
    let expected = source as f64 / ratio;
    let pct = (encoded as f64 / expected * 100.0).clamp(0.0, 100.0);
    let eta = if pct > 0.0 {
        Duration::from_secs_f64(elapsed.as_secs_f64() / pct * (100.0 - pct))
    } else {
        Duration::ZERO
    };

    Some(Progress {
        pct: pct as f32,
        file_size: expected as i64,
        eta: Duration::from_secs(eta.as_secs_f64().round() as u64),
    })
}

/// Polls the encoded output of one job
pub(super) struct Estimator {
    pub(super) encoded_path: PathBuf,
    /// Source file to compare against, when its format supports an estimate
    pub(super) source_path: Option<PathBuf>,
    pub(super) stream_url: String,
    pub(super) info: Info,
    pub(super) config: ReencodeConfig,
    pub(super) events: mpsc::Sender<Event>,
    pub(super) link_sent: Arc<AtomicBool>,
}

impl Estimator {
    /// Run until dropped; returns only on an unexpected filesystem error
    pub(super) async fn run(self) -> Result<()> {
        let mut started: Option<Instant> = None;

        loop {
            let encoded = match tokio::fs::metadata(&self.encoded_path).await {
                Ok(m) => m.len(),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tokio::time::sleep(self.config.estimate_interval).await;
                    continue;
                }
                Err(e) => {
                    return Err(Error::ExternalTool(format!(
                        "error getting stat on encoded file '{}': {e}",
                        self.encoded_path.display()
                    )));
                }
            };
            let started = *started.get_or_insert_with(Instant::now);

            if encoded > self.config.stream_threshold_bytes
                && !self.link_sent.swap(true, Ordering::AcqRel)
            {
                let mut info = self.info.clone();
                info.download_url = self.stream_url.clone();
                tracing::debug!(job_id = info.id.0, url = %info.download_url, "stream link ready");
                self.events.send(Event::LinkStream(info)).await.ok();
            }

            if let Some(source_path) = &self.source_path
                && let Ok(source) = tokio::fs::metadata(source_path).await
                && let Some(progress) = estimate_progress(
                    encoded,
                    source.len(),
                    self.config.compression_ratio,
                    started.elapsed(),
                )
            {
                let mut info = self.info.clone();
                info.progress = Some(progress);
                self.events.send(Event::Info(info)).await.ok();
            }

            self.events
                .send(Event::Unknown(format!(
                    "encoded file size {:.2} MB",
                    encoded as f64 * 1e-6
                )))
                .await
                .ok();

            tokio::time::sleep(self.config.estimate_interval).await;
        }
    }
}
