//! FIFO hand-off between the capture path and the writer thread.
//!
//! The producer side never waits: a bounded queue that is full applies its
//! [`OverflowPolicy`] and counts the overflow instead of blocking. The single
//! consumer blocks in [`SampleQueue::pop`] until a sample arrives or the queue is
//! closed and drained.
//!
//! ```text
//!   on_edge / window timer ──push──▶ [ s0 s1 s2 ... ] ──pop──▶ writer thread
//!                                   (drop oldest/newest when full)
//! ```

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::measurement::Sample;

/// What a full bounded queue gives up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest pending sample to make room
    #[default]
    DropOldest,
    /// Discard the incoming sample
    DropNewest,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Sample queued, nothing lost
    Enqueued,
    /// Sample queued after evicting the oldest pending one
    EvictedOldest,
    /// Queue full; the incoming sample was discarded
    Rejected,
    /// Queue closed; the sample was discarded
    Closed,
}

/// Counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Samples accepted into the queue
    pub enqueued: u64,
    /// Samples handed to the consumer
    pub dequeued: u64,
    /// Samples lost to the overflow policy
    pub overflows: u64,
    /// Samples pending right now
    pub pending: usize,
}

struct QueueInner {
    items: VecDeque<Sample>,
    closed: bool,
}

/// Single-producer, single-consumer sample queue.
pub struct SampleQueue {
    inner: Mutex<QueueInner>,
    available: Condvar,
    capacity: Option<NonZeroUsize>,
    policy: OverflowPolicy,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    overflows: AtomicU64,
}

impl SampleQueue {
    /// An unbounded queue.
    pub fn unbounded() -> Self {
        Self::new(None, OverflowPolicy::default())
    }

    /// A bounded queue holding at most `capacity` samples.
    pub fn bounded(capacity: NonZeroUsize, policy: OverflowPolicy) -> Self {
        Self::new(Some(capacity), policy)
    }

    /// Build from configuration values; a capacity of 0 means unbounded.
    pub fn with_capacity(capacity: usize, policy: OverflowPolicy) -> Self {
        Self::new(NonZeroUsize::new(capacity), policy)
    }

    fn new(capacity: Option<NonZeroUsize>, policy: OverflowPolicy) -> Self {
        let initial = capacity.map_or(64, |c| c.get().min(4096));
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(initial),
                closed: false,
            }),
            available: Condvar::new(),
            capacity,
            policy,
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
            overflows: AtomicU64::new(0),
        }
    }

    /// Queue a sample without waiting on the consumer.
    pub fn push(&self, sample: Sample) -> PushOutcome {
        let outcome = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return PushOutcome::Closed;
            }

            let full = self
                .capacity
                .is_some_and(|cap| inner.items.len() >= cap.get());

            if full {
                self.overflows.fetch_add(1, Ordering::Relaxed);
                match self.policy {
                    OverflowPolicy::DropNewest => {
                        trace!(timestamp_ns = sample.timestamp_ns, "Queue full, dropped newest");
                        return PushOutcome::Rejected;
                    }
                    OverflowPolicy::DropOldest => {
                        inner.items.pop_front();
                        inner.items.push_back(sample);
                        PushOutcome::EvictedOldest
                    }
                }
            } else {
                inner.items.push_back(sample);
                PushOutcome::Enqueued
            }
        };

        self.enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        outcome
    }

    /// Block until a sample is available.
    ///
    /// Returns `None` once the queue is closed and every pending sample has been
    /// handed out.
    pub fn pop(&self) -> Option<Sample> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(sample) = inner.items.pop_front() {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                return Some(sample);
            }
            if inner.closed {
                return None;
            }
            self.available.wait(&mut inner);
        }
    }

    /// Like [`pop`](Self::pop) but gives up after `timeout`.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Sample> {
        let mut inner = self.inner.lock();
        loop {
            if let Some(sample) = inner.items.pop_front() {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                return Some(sample);
            }
            if inner.closed {
                return None;
            }
            if self.available.wait_for(&mut inner, timeout).timed_out() {
                let sample = inner.items.pop_front();
                if sample.is_some() {
                    self.dequeued.fetch_add(1, Ordering::Relaxed);
                }
                return sample;
            }
        }
    }

    /// Stop accepting samples and wake the consumer. Pending samples can still
    /// be popped.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.available.notify_all();
    }

    /// Whether [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Pending samples.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Whether no sample is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured bound, if any.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity.map(NonZeroUsize::get)
    }

    /// Samples lost to the overflow policy so far.
    pub fn overflow_count(&self) -> u64 {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            dequeued: self.dequeued.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            pending: self.len(),
        }
    }
}

impl Default for SampleQueue {
    fn default() -> Self {
        Self::unbounded()
    }
}
