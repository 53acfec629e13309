//! Event fan-out
//!
//! The [`BroadcastHub`] delivers every published event to every subscriber
//! registered at publish time. Each subscriber owns a bounded tokio channel;
//! when it is full the configured [`BackpressurePolicy`] applies to that
//! subscriber alone, so `publish` never waits on a slow viewer.
//!
//! ```text
//!   Ingestion thread                            Viewer tasks
//!   ────────────────                            ────────────
//!   hub.publish(event) ──┬──► outlet[a] ──► sub_a.recv().await
//!        (Arc clone)     ├──► outlet[b] ──► sub_b.recv().await
//!                        └──► outlet[c] ──► sub_c.recv().await
//! ```
//!
//! The subscriber set lives behind a mutex held only while the set is
//! copied or changed; events are sent outside that lock.

mod subscriber;

pub use subscriber::{SubscriberId, Subscription, TryRecvError};

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::frame::TelemetryEvent;
use subscriber::{Offer, Outlet};

/// Default number of events buffered per subscriber
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

/// What happens when a subscriber's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackpressurePolicy {
    /// Discard the subscriber's oldest buffered event
    #[default]
    DropOldest,
    /// Remove the subscriber from the hub
    Disconnect,
}

impl FromStr for BackpressurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop-oldest" | "drop_oldest" | "drop" => Ok(Self::DropOldest),
            "disconnect" => Ok(Self::Disconnect),
            other => Err(format!("unknown backpressure policy '{}'", other)),
        }
    }
}

/// Anything that accepts decoded events
pub trait EventSink: Send + Sync {
    /// Deliver one event
    fn publish(&self, event: TelemetryEvent);
}

/// Hub counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct HubStats {
    /// Currently registered subscribers
    pub subscribers: usize,
    /// Events published since creation
    pub published: u64,
    /// Subscribers removed by the disconnect policy
    pub evicted: u64,
}

pub(crate) struct HubInner {
    subscribers: Mutex<HashMap<SubscriberId, Outlet>>,
    capacity: usize,
    policy: BackpressurePolicy,
    published: AtomicU64,
    evicted: AtomicU64,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<SubscriberId, Outlet>> {
        self.subscribers.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.lock().contains_key(&id)
    }

    /// Drop the subscriber's sender; its receiver drains, then reports closed
    pub(crate) fn remove(&self, id: SubscriberId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(_) => {
                tracing::debug!("subscriber {} removed", id);
                true
            }
            None => false,
        }
    }
}

/// Fan-out of decoded events to connected viewers
///
/// Cheap to clone; clones share the same subscriber set.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    /// Create a hub with the given per-subscriber capacity and policy
    pub fn new(capacity: usize, policy: BackpressurePolicy) -> Self {
        Self {
            inner: Arc::new(HubInner {
                subscribers: Mutex::new(HashMap::new()),
                capacity: capacity.max(1),
                policy,
                published: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
            }),
        }
    }

    /// Per-subscriber queue capacity
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Register a new subscriber
    ///
    /// It receives every event published from now on.
    pub fn subscribe(&self) -> Subscription {
        let (outlet, subscription) = subscriber::channel(
            self.inner.capacity,
            self.inner.policy,
            Arc::downgrade(&self.inner),
        );
        self.inner.lock().insert(subscription.id(), outlet);
        tracing::debug!("subscriber {} registered", subscription.id());
        subscription
    }

    /// Remove a subscriber; its handle reports closed once drained
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.remove(id)
    }

    /// Number of registered subscribers
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().len()
    }

    /// Deliver an event to every registered subscriber
    ///
    /// Returns how many subscribers accepted it. Never blocks on a
    /// subscriber; full queues are handled by the backpressure policy.
    pub fn publish(&self, event: TelemetryEvent) -> usize {
        let event = Arc::new(event);
        let targets: Vec<(SubscriberId, Outlet)> = self
            .inner
            .lock()
            .iter()
            .map(|(id, outlet)| (*id, outlet.clone()))
            .collect();

        let mut delivered = 0;
        let mut overflowed = Vec::new();
        for (id, outlet) in &targets {
            match outlet.offer(Arc::clone(&event)) {
                Offer::Delivered => delivered += 1,
                Offer::Full => overflowed.push(*id),
                Offer::Gone => {}
            }
        }
        drop(targets);

        if !overflowed.is_empty() {
            let mut subscribers = self.inner.lock();
            for id in overflowed {
                if subscribers.remove(&id).is_some() {
                    self.inner.evicted.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("subscriber {} could not keep up, disconnected", id);
                }
            }
        }

        self.inner.published.fetch_add(1, Ordering::Relaxed);
        delivered
    }

    /// Snapshot of the hub counters
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            published: self.inner.published.load(Ordering::Relaxed),
            evicted: self.inner.evicted.load(Ordering::Relaxed),
        }
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_SUBSCRIBER_CAPACITY, BackpressurePolicy::default())
    }
}

impl std::fmt::Debug for BroadcastHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastHub")
            .field("capacity", &self.inner.capacity)
            .field("policy", &self.inner.policy)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl EventSink for BroadcastHub {
    fn publish(&self, event: TelemetryEvent) {
        BroadcastHub::publish(self, event);
    }
}
