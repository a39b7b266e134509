//! Event collection and ordering assertions

use std::time::Duration;
use ytdl_web::{Event, EventKey, Subscription};

/// Collect events until `stop` matches one (inclusive) or `timeout` elapses
pub async fn collect_events_until<F>(
    subscription: &mut Subscription,
    timeout: Duration,
    stop: F,
) -> Vec<Event>
where
    F: Fn(&Event) -> bool,
{
    let mut collected = Vec::new();

    let _ = tokio::time::timeout(timeout, async {
        while let Some(event) = subscription.recv().await {
            let should_stop = stop(&event);
            collected.push(event);
            if should_stop {
                break;
            }
        }
    })
    .await;

    collected
}

/// Collect events until the job's terminal event
pub async fn collect_until_terminal(subscription: &mut Subscription, timeout: Duration) -> Vec<Event> {
    collect_events_until(subscription, timeout, Event::is_terminal).await
}

/// Keys of `events`, dropping `unknown` lines
pub fn significant_keys(events: &[Event]) -> Vec<EventKey> {
    events
        .iter()
        .map(Event::key)
        .filter(|k| *k != EventKey::Unknown)
        .collect()
}

/// Progress percentages carried by `info` events, in order
pub fn progress_pcts(events: &[Event]) -> Vec<f32> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::Info(info) => info.progress.as_ref().map(|p| p.pct),
            _ => None,
        })
        .collect()
}

/// Assert `expected` appears in `events` as a subsequence of keys
pub fn assert_keys_in_order(events: &[Event], expected: &[EventKey]) {
    let keys: Vec<EventKey> = events.iter().map(Event::key).collect();
    let mut wanted = expected.iter().peekable();
    for key in &keys {
        if wanted.peek() == Some(&key) {
            wanted.next();
        }
    }
    assert!(
        wanted.peek().is_none(),
        "expected key order {expected:?} in {keys:?}"
    );
}
