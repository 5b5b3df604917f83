// SPDX-License-Identifier: MIT OR Apache-2.0
//! Broadcast-based event bus for decoupled [`Event`] distribution.
//!
//! Every event is published on a single process-local topic; subscribers may
//! take everything (`:all`, via [`EventBus::subscribe`]) or filter down to a
//! single run (via [`EventBus::subscribe_run`]).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

use crate::event::Event;

const DEFAULT_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct StatsInner {
    total_published: AtomicU64,
    dropped_events: AtomicU64,
}

/// Broadcast-based event bus distributing [`Event`]s to multiple
/// subscribers, with publish statistics.
pub struct EventBus {
    tx: broadcast::Sender<Event>,
    stats: Arc<StatsInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            stats: Arc::new(StatsInner::default()),
        }
    }

    /// Subscribe to every event on the bus (the `:all` topic).
    pub fn subscribe(&self) -> EventSubscription {
        EventSubscription {
            rx: self.tx.subscribe(),
            stats: Arc::clone(&self.stats),
        }
    }

    /// Subscribe to events for a single run only.
    pub fn subscribe_run(&self, run_id: impl Into<String>) -> FilteredSubscription {
        let run_id = run_id.into();
        FilteredSubscription::new(self.subscribe(), Box::new(move |ev| ev.run_id == run_id))
    }

    /// Publish an event to all current subscribers. Dropped (no
    /// subscribers) events are counted but never treated as an error —
    /// publishing is fire-and-forget.
    pub fn publish(&self, event: Event) {
        self.stats.total_published.fetch_add(1, Ordering::Relaxed);
        if self.tx.send(event).is_err() {
            self.stats.dropped_events.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            total_published: self.stats.total_published.load(Ordering::Relaxed),
            active_subscribers: self.tx.receiver_count(),
            dropped_events: self.stats.dropped_events.load(Ordering::Relaxed),
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// A handle for receiving events from an [`EventBus`].
pub struct EventSubscription {
    rx: broadcast::Receiver<Event>,
    stats: Arc<StatsInner>,
}

impl EventSubscription {
    /// Receive the next event, waiting asynchronously. Returns `None` once
    /// the bus has been dropped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.rx.recv().await {
                Ok(ev) => return Some(ev),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(ev) => Some(ev),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                self.stats.dropped_events.fetch_add(n, Ordering::Relaxed);
                self.rx.try_recv().ok()
            }
            Err(_) => None,
        }
    }
}

/// Wraps an [`EventSubscription`] with a predicate filter so only matching
/// events are yielded — used for per-run subscriptions.
pub struct FilteredSubscription {
    inner: EventSubscription,
    filter: Box<dyn Fn(&Event) -> bool + Send + Sync>,
}

impl FilteredSubscription {
    pub fn new(sub: EventSubscription, filter: Box<dyn Fn(&Event) -> bool + Send + Sync>) -> Self {
        Self { inner: sub, filter }
    }

    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.inner.recv().await {
                Some(ev) if (self.filter)(&ev) => return Some(ev),
                Some(_) => continue,
                None => return None,
            }
        }
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.inner.try_recv() {
                Some(ev) if (self.filter)(&ev) => return Some(ev),
                Some(_) => continue,
                None => return None,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventBusStats {
    pub total_published: u64,
    pub active_subscribers: usize,
    pub dropped_events: u64,
}
