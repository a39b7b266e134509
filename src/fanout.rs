//! Event fan-out
//!
//! Workers write every [`Event`] to one shared output channel. A single forwarder loop reads
//! that channel and copies each event to every registered subscriber.
//!
//! Delivery is at-most-once per subscriber: each subscriber has its own bounded buffer and
//! a send that finds the buffer full drops the event for that subscriber only (logged as a
//! warning). A slow or dead subscriber therefore never stalls workers or other subscribers.
//! Per-subscriber arrival order matches emission order.
//!
//! The subscriber map is only touched under its lock for insertion, removal and taking a
//! snapshot; sends happen outside the map lock. Each subscriber's sender sits behind its own
//! gate, which removal empties, so a publish working from an older snapshot cannot write to a
//! subscriber once it has been removed.

use crate::types::Event;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Identifier of a registered subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Write end of one subscriber; `None` once removed
type Gate = Arc<Mutex<Option<mpsc::Sender<Event>>>>;

fn lock_gate(gate: &Gate) -> std::sync::MutexGuard<'_, Option<mpsc::Sender<Event>>> {
    match gate.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Offer `event` to one subscriber; `None` if it has been removed
fn try_deliver(
    gate: &Gate,
    event: &Event,
) -> Option<std::result::Result<(), mpsc::error::TrySendError<Event>>> {
    lock_gate(gate)
        .as_ref()
        .map(|tx| tx.try_send(event.clone()))
}

struct Slot {
    gate: Gate,
    removed: Arc<AtomicBool>,
}

struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, Slot>>,
    next_id: AtomicU64,
    buffer: usize,
}

impl HubInner {
    fn remove(&self, id: SubscriberId) -> bool {
        let slot = match self.subscribers.lock() {
            Ok(mut map) => map.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        match slot {
            Some(slot) => {
                slot.removed.store(true, Ordering::Release);
                lock_gate(&slot.gate).take();
                true
            }
            None => false,
        }
    }
}

/// Broadcasts events to a dynamic set of subscribers
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl std::fmt::Debug for EventHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .field("buffer", &self.inner.buffer)
            .finish()
    }
}

impl EventHub {
    /// Create a hub whose subscribers buffer up to `buffer` events each
    pub fn new(buffer: usize) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                buffer: buffer.max(1),
            }),
        }
    }

    /// Register a subscriber with the hub's default buffer size
    pub fn subscribe(&self) -> Subscription {
        self.subscribe_with_buffer(self.inner.buffer)
    }

    /// Register a subscriber with its own buffer size
    pub fn subscribe_with_buffer(&self, buffer: usize) -> Subscription {
        let id = SubscriberId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, receiver) = mpsc::channel(buffer.max(1));
        let removed = Arc::new(AtomicBool::new(false));

        self.lock().insert(
            id,
            Slot {
                gate: Arc::new(Mutex::new(Some(tx))),
                removed: Arc::clone(&removed),
            },
        );
        tracing::debug!(subscriber = %id, "subscriber added");

        Subscription {
            id,
            receiver,
            removed,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Remove a subscriber
    ///
    /// The subscription yields nothing further once this returns, including events already
    /// sitting in its buffer. Returns false if the id was not registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let removed = self.inner.remove(id);
        if removed {
            tracing::debug!(subscriber = %id, "subscriber removed");
        }
        removed
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Copy `event` to every registered subscriber without waiting
    ///
    /// Returns the number of subscribers that accepted the event.
    pub fn publish(&self, event: &Event) -> usize {
        let snapshot: Vec<(SubscriberId, Gate)> = self
            .lock()
            .iter()
            .map(|(id, slot)| (*id, Arc::clone(&slot.gate)))
            .collect();

        let mut delivered = 0;
        let mut closed = Vec::new();
        for (id, gate) in snapshot {
            match try_deliver(&gate, event) {
                // removed after the snapshot was taken
                None => {}
                Some(Ok(())) => delivered += 1,
                Some(Err(mpsc::error::TrySendError::Full(_))) => {
                    tracing::warn!(
                        subscriber = %id,
                        key = %event.key(),
                        "subscriber buffer full, event dropped"
                    );
                }
                Some(Err(mpsc::error::TrySendError::Closed(_))) => closed.push(id),
            }
        }

        for id in closed {
            self.inner.remove(id);
            tracing::debug!(subscriber = %id, "subscriber gone, removed");
        }

        delivered
    }

    /// Publish everything arriving on `events` until it closes or `shutdown` fires
    ///
    /// Events already queued when `shutdown` fires are still published.
    pub async fn forward(&self, mut events: mpsc::Receiver<Event>, shutdown: CancellationToken) {
        tracing::info!("event forwarder starting");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    while let Ok(event) = events.try_recv() {
                        self.publish(&event);
                    }
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.publish(&event);
                    }
                    None => break,
                },
            }
        }
        tracing::info!("event forwarder stopped");
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<SubscriberId, Slot>> {
        match self.inner.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A registered subscriber's receiving end
///
/// Dropping the subscription unsubscribes it.
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<Event>,
    removed: Arc<AtomicBool>,
    hub: Weak<HubInner>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

impl Subscription {
    /// This subscriber's id
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Next event, or `None` once unsubscribed or the hub is gone
    pub async fn recv(&mut self) -> Option<Event> {
        if self.removed.load(Ordering::Acquire) {
            self.receiver.close();
            return None;
        }
        let event = self.receiver.recv().await?;
        if self.removed.load(Ordering::Acquire) {
            self.receiver.close();
            return None;
        }
        Some(event)
    }

    /// Next buffered event without waiting
    pub fn try_recv(&mut self) -> Option<Event> {
        if self.removed.load(Ordering::Acquire) {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Stop receiving; no further events are written to this subscriber
    pub fn unsubscribe(mut self) {
        self.receiver.close();
        self.detach();
    }

    fn detach(&mut self) {
        self.removed.store(true, Ordering::Release);
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.detach();
    }
}
