//! Bounded priority-aware event queue
//!
//! `emit` never waits: on a full queue a high-priority event evicts the
//! oldest queued event, a lower-priority one is dropped. Consumers `pull`
//! with a timeout.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

use super::MonitorEvent;
use crate::metrics;

/// What happened to an emitted event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Queued,
    /// Queued after evicting the oldest event
    Evicted,
    Dropped,
}

/// Queue counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Events accepted into the queue
    pub sent: u64,
    /// Events handed to consumers
    pub received: u64,
    pub dropped: u64,
    pub evicted: u64,
    pub depth: usize,
    pub capacity: usize,
}

pub struct EventQueue {
    events: Mutex<VecDeque<MonitorEvent>>,
    capacity: usize,
    notify: Notify,
    sent: AtomicU64,
    received: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            notify: Notify::new(),
            sent: AtomicU64::new(0),
            received: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            evicted: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<MonitorEvent>> {
        // A panic while holding the lock cannot leave the deque half-updated
        self.events.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Enqueue without blocking
    pub fn emit(&self, event: MonitorEvent) -> EmitOutcome {
        let kind = event.kind;
        let outcome = {
            let mut events = self.lock();

            let outcome = if events.len() < self.capacity {
                EmitOutcome::Queued
            } else if event.priority.may_evict() {
                events.pop_front();
                EmitOutcome::Evicted
            } else {
                EmitOutcome::Dropped
            };

            if outcome != EmitOutcome::Dropped {
                events.push_back(event);
            }
            metrics::set_queue_depth(events.len());
            outcome
        };

        match outcome {
            EmitOutcome::Dropped => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_dropped();
                tracing::debug!(kind = %kind, "Event queue full, event dropped");
                return outcome;
            }
            EmitOutcome::Evicted => {
                self.evicted.fetch_add(1, Ordering::Relaxed);
                metrics::record_event_evicted();
                tracing::debug!(kind = %kind, "Event queue full, oldest event evicted");
            }
            EmitOutcome::Queued => {}
        }

        self.sent.fetch_add(1, Ordering::Relaxed);
        metrics::record_event_emitted(kind.as_str());
        self.notify.notify_one();
        outcome
    }

    /// Take the oldest event if one is waiting
    pub fn try_pull(&self) -> Option<MonitorEvent> {
        let event = {
            let mut events = self.lock();
            let event = events.pop_front();
            metrics::set_queue_depth(events.len());
            event
        };

        if event.is_some() {
            self.received.fetch_add(1, Ordering::Relaxed);
        }
        event
    }

    /// Wait up to `timeout` for the next event
    pub async fn pull(&self, timeout: Duration) -> Option<MonitorEvent> {
        tokio::time::timeout(timeout, async {
            loop {
                let notified = self.notify.notified();
                if let Some(event) = self.try_pull() {
                    return event;
                }
                notified.await;
            }
        })
        .await
        .ok()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the queued events, oldest first
    pub fn snapshot(&self) -> Vec<MonitorEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            sent: self.sent.load(Ordering::Relaxed),
            received: self.received.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
            depth: self.len(),
            capacity: self.capacity,
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(1000)
    }
}
