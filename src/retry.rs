//! Retry logic with exponential backoff
//!
//! The dispatcher uses this to re-run jobs whose download stalled. Each attempt returns an
//! outcome; outcomes that report themselves as retryable are re-run after an exponentially
//! growing delay (optionally jittered) until `max_attempts` retries have been made.
//!
//! # Example
//!
//! ```no_run
//! use ytdl_web::config::RetryConfig;
//! use ytdl_web::retry::run_with_retry;
//! use ytdl_web::types::JobOutcome;
//!
//! # async fn example() {
//! let config = RetryConfig::default();
//! let outcome = run_with_retry(&config, |_attempt| async { JobOutcome::Completed }).await;
//! assert_eq!(outcome, JobOutcome::Completed);
//! # }
//! ```

use crate::config::RetryConfig;
use crate::types::JobOutcome;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Outcomes that can ask to be attempted again
pub trait IsRetryable {
    /// Returns true if the operation should be run again
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for JobOutcome {
    fn is_retryable(&self) -> bool {
        matches!(self, JobOutcome::Stalled)
    }
}

/// Run `operation` until it yields a non-retryable outcome or retries are exhausted
///
/// `operation` receives the zero-based attempt number. The last outcome is returned,
/// retryable or not.
pub async fn run_with_retry<F, Fut, T>(config: &RetryConfig, mut operation: F) -> T
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = T>,
    T: IsRetryable + std::fmt::Debug,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        let outcome = operation(attempt).await;

        if !outcome.is_retryable() {
            if attempt > 0 {
                tracing::info!(attempts = attempt + 1, ?outcome, "operation finished after retry");
            }
            return outcome;
        }

        if attempt >= config.max_attempts {
            tracing::warn!(
                attempts = attempt + 1,
                ?outcome,
                "operation still retryable after all retry attempts exhausted"
            );
            return outcome;
        }

        attempt += 1;

        tracing::warn!(
            ?outcome,
            attempt = attempt,
            max_attempts = config.max_attempts,
            delay_ms = delay.as_millis(),
            "operation asked for retry"
        );

        let jittered_delay = if config.jitter {
            add_jitter(delay)
        } else {
            delay
        };
        tokio::time::sleep(jittered_delay).await;

        let next_delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier);
        delay = next_delay.min(config.max_delay);
    }
}

/// Add random jitter to a delay to prevent thundering herd
///
/// Jitter is uniformly distributed between 0% and 100% of the delay, so the actual delay
/// lies between `delay` and `2 * delay`.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
