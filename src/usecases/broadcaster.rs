//! Broadcaster - Per-Symbol Publish/Subscribe Fan-out
//!
//! Subscribers register once, then join or leave symbol groups. A
//! publish delivers to whoever is in the group at that moment. Delivery
//! uses non-blocking sends: a slow subscriber loses updates instead of
//! stalling the ingestion path.

use std::collections::HashSet;
use std::fmt;

use dashmap::DashMap;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::{InternalSymbol, PriceUpdate};

/// Opaque identity of one push subscriber (one client connection).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberHandle(Uuid);

impl SubscriberHandle {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Outcome of a single publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Subscribers that accepted the update.
    pub delivered: usize,
    /// Subscribers whose queue was full.
    pub dropped: usize,
}

/// Fan-out keyed by internal symbol.
pub struct Broadcaster {
    /// Delivery queue per registered subscriber.
    subscribers: DashMap<SubscriberHandle, mpsc::Sender<PriceUpdate>>,
    /// Group membership per symbol.
    groups: DashMap<InternalSymbol, HashSet<SubscriberHandle>>,
    /// Per-subscriber queue depth.
    buffer: usize,
}

impl Broadcaster {
    pub fn new(buffer: usize) -> Self {
        Self {
            subscribers: DashMap::new(),
            groups: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Allocate a handle and the receiver its updates arrive on.
    pub fn register(&self) -> (SubscriberHandle, mpsc::Receiver<PriceUpdate>) {
        let (tx, rx) = mpsc::channel(self.buffer);
        let handle = SubscriberHandle::new();
        self.subscribers.insert(handle, tx);
        debug!(subscriber = %handle, "Subscriber registered");
        (handle, rx)
    }

    /// Remove a handle from every group and drop its queue.
    pub fn unregister(&self, handle: SubscriberHandle) {
        self.subscribers.remove(&handle);
        self.groups.retain(|_, members| {
            members.remove(&handle);
            !members.is_empty()
        });
        debug!(subscriber = %handle, "Subscriber unregistered");
    }

    /// Add `handle` to `symbol`'s group.
    ///
    /// Returns `true` if membership changed; `false` when already a
    /// member or when the handle is not registered.
    pub fn join(&self, handle: SubscriberHandle, symbol: &InternalSymbol) -> bool {
        if !self.subscribers.contains_key(&handle) {
            warn!(subscriber = %handle, symbol = %symbol, "Join from unregistered subscriber");
            return false;
        }
        self.groups.entry(symbol.clone()).or_default().insert(handle)
    }

    /// Remove `handle` from `symbol`'s group. Returns `true` if it was a member.
    pub fn leave(&self, handle: SubscriberHandle, symbol: &InternalSymbol) -> bool {
        let removed = self
            .groups
            .get_mut(symbol)
            .is_some_and(|mut members| members.remove(&handle));
        self.groups.remove_if(symbol, |_, members| members.is_empty());
        removed
    }

    /// Deliver `update` to every current member of `symbol`'s group.
    pub fn publish(&self, symbol: &InternalSymbol, update: &PriceUpdate) -> PublishOutcome {
        // Snapshot members so no group shard lock is held while sending.
        let members: Vec<SubscriberHandle> = match self.groups.get(symbol) {
            Some(group) => group.iter().copied().collect(),
            None => return PublishOutcome::default(),
        };

        let mut outcome = PublishOutcome::default();
        let mut closed = Vec::new();

        for handle in members {
            let Some(tx) = self.subscribers.get(&handle).map(|tx| tx.clone()) else {
                continue;
            };
            match tx.try_send(update.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    outcome.dropped += 1;
                    debug!(subscriber = %handle, symbol = %symbol, "Subscriber queue full, update dropped");
                }
                Err(TrySendError::Closed(_)) => closed.push(handle),
            }
        }

        for handle in closed {
            self.unregister(handle);
        }

        outcome
    }

    pub fn group_size(&self, symbol: &InternalSymbol) -> usize {
        self.groups.get(symbol).map_or(0, |group| group.len())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl fmt::Debug for Broadcaster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcaster")
            .field("subscribers", &self.subscribers.len())
            .field("groups", &self.groups.len())
            .field("buffer", &self.buffer)
            .finish()
    }
}
