//! Subscriber handles and their channels
//!
//! Each subscriber gets its own bounded tokio channel, picked by the hub's
//! [`BackpressurePolicy`]:
//! - `DropOldest`: a `broadcast` ring. A lagging receiver skips what was
//!   overwritten and the skipped count is recorded as dropped.
//! - `Disconnect`: an `mpsc` queue fed with `try_send`. A full queue gets its
//!   sender removed from the hub.
//!
//! The hub owns the only sender. Removing it lets the receiver drain what is
//! already buffered and then report closed.

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

pub use tokio::sync::mpsc::error::TryRecvError;

use super::{BackpressurePolicy, HubInner};
use crate::frame::TelemetryEvent;

/// Identifier of one connected viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of offering one event to a subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    Delivered,
    /// Queue full under the disconnect policy
    Full,
    /// Receiver already gone
    Gone,
}

/// Hub-side end of a subscriber channel
#[derive(Clone)]
pub(crate) enum Outlet {
    Ring(broadcast::Sender<Arc<TelemetryEvent>>),
    Queue(mpsc::Sender<Arc<TelemetryEvent>>),
}

impl Outlet {
    pub(crate) fn offer(&self, event: Arc<TelemetryEvent>) -> Offer {
        match self {
            Outlet::Ring(tx) => match tx.send(event) {
                Ok(_) => Offer::Delivered,
                Err(_) => Offer::Gone,
            },
            Outlet::Queue(tx) => match tx.try_send(event) {
                Ok(()) => Offer::Delivered,
                Err(mpsc::error::TrySendError::Full(_)) => Offer::Full,
                Err(mpsc::error::TrySendError::Closed(_)) => Offer::Gone,
            },
        }
    }
}

enum Inlet {
    Ring(broadcast::Receiver<Arc<TelemetryEvent>>),
    Queue(mpsc::Receiver<Arc<TelemetryEvent>>),
}

/// Create the channel for one subscriber of `hub`
pub(crate) fn channel(
    capacity: usize,
    policy: BackpressurePolicy,
    hub: Weak<HubInner>,
) -> (Outlet, Subscription) {
    let (outlet, inlet) = match policy {
        BackpressurePolicy::DropOldest => {
            let (tx, rx) = broadcast::channel(capacity);
            (Outlet::Ring(tx), Inlet::Ring(rx))
        }
        BackpressurePolicy::Disconnect => {
            let (tx, rx) = mpsc::channel(capacity);
            (Outlet::Queue(tx), Inlet::Queue(rx))
        }
    };
    let subscription = Subscription {
        id: SubscriberId::new(),
        inlet,
        dropped: 0,
        hub,
    };
    (outlet, subscription)
}

/// Receiving end for one subscriber
///
/// Dropping the handle unsubscribes it. Events arrive in publish order.
pub struct Subscription {
    id: SubscriberId,
    inlet: Inlet,
    dropped: u64,
    hub: Weak<HubInner>,
}

impl Subscription {
    /// This subscriber's identifier
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event
    ///
    /// Returns `None` once the hub has removed this subscriber and every
    /// event buffered before removal has been received.
    pub async fn recv(&mut self) -> Option<Arc<TelemetryEvent>> {
        match &mut self.inlet {
            Inlet::Queue(rx) => rx.recv().await,
            Inlet::Ring(rx) => loop {
                match rx.recv().await {
                    Ok(event) => return Some(event),
                    Err(broadcast::error::RecvError::Lagged(n)) => self.dropped += n,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            },
        }
    }

    /// Take the next event without waiting
    pub fn try_recv(&mut self) -> Result<Arc<TelemetryEvent>, TryRecvError> {
        match &mut self.inlet {
            Inlet::Queue(rx) => rx.try_recv(),
            Inlet::Ring(rx) => loop {
                match rx.try_recv() {
                    Ok(event) => return Ok(event),
                    Err(broadcast::error::TryRecvError::Lagged(n)) => self.dropped += n,
                    Err(broadcast::error::TryRecvError::Empty) => return Err(TryRecvError::Empty),
                    Err(broadcast::error::TryRecvError::Closed) => {
                        return Err(TryRecvError::Disconnected)
                    }
                }
            },
        }
    }

    /// Events skipped so far under the drop-oldest policy
    ///
    /// Counted when the receiver catches up past them.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Whether the hub has stopped delivering to this subscriber
    ///
    /// Buffered events may still be pending.
    pub fn is_closed(&self) -> bool {
        match self.hub.upgrade() {
            Some(hub) => !hub.contains(self.id),
            None => true,
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("dropped", &self.dropped)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.remove(self.id);
        }
    }
}
