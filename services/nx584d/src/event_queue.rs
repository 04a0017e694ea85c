//! Bounded, indexed event fan-out for HTTP long-pollers.
//!
//! Every push gets the next monotone number; the ring keeps only the last
//! `length` events. `get(index, timeout)` returns everything numbered
//! strictly after the caller's cursor, waiting up to `timeout` when the
//! queue has nothing new yet. A cursor that fell off the ring gets the
//! whole retained queue, so delivery is at-least-once and never reorders.

use serde::Serialize;
use std::collections::VecDeque;
use std::pin::pin;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};

/// One queued event.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub number: u64,
    pub payload: serde_json::Value,
}

struct Ring {
    queue: VecDeque<Event>,
    length: usize,
    max: u64,
}

impl Ring {
    fn suffix_after(&self, index: u64) -> Vec<Event> {
        self.queue
            .iter()
            .filter(|e| e.number > index)
            .cloned()
            .collect()
    }
}

/// Thread-safe event ring with blocking long-poll reads.
pub struct EventQueue {
    ring: Mutex<Ring>,
    notify: Notify,
}

impl EventQueue {
    /// A queue retaining the last `length` events, numbering from 1.
    pub fn new(length: usize) -> EventQueue {
        EventQueue::with_start(length, 0)
    }

    /// A queue whose first pushed event is numbered `start + 1`.
    pub fn with_start(length: usize, start: u64) -> EventQueue {
        EventQueue {
            ring: Mutex::new(Ring {
                queue: VecDeque::with_capacity(length),
                length,
                max: start,
            }),
            notify: Notify::new(),
        }
    }

    /// Append an event and wake every waiting long-poller.
    pub async fn push(&self, payload: serde_json::Value) {
        {
            let mut ring = self.ring.lock().await;
            ring.max += 1;
            let number = ring.max;
            ring.queue.push_back(Event { number, payload });
            while ring.queue.len() > ring.length {
                ring.queue.pop_front();
            }
        }
        self.notify.notify_waiters();
    }

    /// The number of the most recently pushed event.
    pub async fn current(&self) -> u64 {
        self.ring.lock().await.max
    }

    /// Every retained event numbered after `index`. Blocks up to `timeout`
    /// when nothing is available yet; returns empty on timeout.
    pub async fn get(&self, index: u64, timeout: Duration) -> Vec<Event> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let mut notified = pin!(self.notify.notified());
            // Register before checking, so a push between the check and the
            // await still wakes us.
            notified.as_mut().enable();
            {
                let ring = self.ring.lock().await;
                let ready = ring.suffix_after(index);
                if !ready.is_empty() {
                    return ready;
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Vec::new();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
