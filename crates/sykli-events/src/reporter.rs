// SPDX-License-Identifier: MIT OR Apache-2.0
//! Buffered forwarding of events to an optional remote coordinator.
//!
//! The reporter does not own a transport — it only decides, per event,
//! whether to hand it to the caller for immediate forwarding or to buffer it
//! for later. Callers own the actual wire connection to the coordinator and
//! drive [`Reporter::set_connected`] / [`Reporter::drain`] accordingly.

use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::warn;

use crate::event::{Event, EventType};

const DEFAULT_CAPACITY: usize = 1000;

/// What a caller should do with an event just handed to [`Reporter::record`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReporterAction {
    /// Forward this event to the coordinator now.
    Forward(Event),
    /// No coordinator is connected; the event was appended to the buffer.
    Buffered,
    /// The buffer was full and this is a `task_output` event, which is
    /// dropped rather than evicting an older, higher-value event.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReporterStatus {
    pub connected: bool,
    pub buffered: usize,
}

struct Inner {
    connected: bool,
    buffer: VecDeque<Event>,
}

/// Tracks connection state to an optional coordinator and buffers events
/// while disconnected, per §4.6's reporter contract.
pub struct Reporter {
    coordinator: Option<String>,
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Reporter {
    pub fn new(coordinator: Option<String>) -> Self {
        Self::with_capacity(coordinator, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(coordinator: Option<String>, capacity: usize) -> Self {
        Self {
            coordinator,
            capacity,
            inner: Mutex::new(Inner {
                connected: false,
                buffer: VecDeque::new(),
            }),
        }
    }

    pub fn coordinator(&self) -> Option<&str> {
        self.coordinator.as_deref()
    }

    pub fn status(&self) -> ReporterStatus {
        let inner = self.inner.lock().unwrap();
        ReporterStatus {
            connected: inner.connected,
            buffered: inner.buffer.len(),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.inner.lock().unwrap().connected = connected;
    }

    /// Record an event produced locally. When connected, the caller should
    /// forward it immediately; when not, it is queued, with `task_output`
    /// dropped once the buffer is full since a stale log chunk is worthless
    /// once overtaken by newer output.
    pub fn record(&self, event: Event) -> ReporterAction {
        let mut inner = self.inner.lock().unwrap();
        if inner.connected {
            return ReporterAction::Forward(event);
        }
        if inner.buffer.len() >= self.capacity {
            if event.event_type == EventType::TaskOutput {
                return ReporterAction::Dropped;
            }
            warn!("reporter buffer full, evicting oldest event to make room");
            inner.buffer.pop_front();
        }
        inner.buffer.push_back(event);
        ReporterAction::Buffered
    }

    /// Drain the buffer in insertion order, for replay after reconnecting.
    pub fn drain(&self) -> Vec<Event> {
        let mut inner = self.inner.lock().unwrap();
        inner.buffer.drain(..).collect()
    }
}
