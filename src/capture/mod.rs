//! Pulse capture: the interrupt-side end of the pipeline.
//!
//! A [`PulseSource`] (GPIO edge detector, simulated encoder, ...) calls
//! [`EdgeSink::on_edge`] once per qualifying edge. [`PulseCapture`] is the core's
//! sink: it reads its own monotonic [`Clock`], runs the configured
//! [`PulseFilter`](filter::PulseFilter) and pushes any resulting sample onto the
//! queue. No estimation or I/O happens here.
//!
//! ```text
//!   PulseSource ──on_edge()──▶ PulseCapture ──Sample──▶ SampleQueue
//!                                  │
//!                         (windowed) counter ◀── WindowTimer thread
//! ```

pub mod filter;
pub mod window;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::error::AppResult;
use crate::queue::{PushOutcome, SampleQueue};
use filter::PulseFilter;

/// Monotonic nanosecond time source.
pub trait Clock: Send + Sync {
    /// Nanoseconds since an arbitrary, fixed epoch. Never decreases.
    fn now_ns(&self) -> u64;
}

/// [`Clock`] backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    /// A clock whose epoch is now.
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// Externally driven [`Clock`] for deterministic tests and replays.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ns: AtomicU64,
}

impl ManualClock {
    /// A clock reading `start_ns`.
    pub fn new(start_ns: u64) -> Self {
        Self {
            now_ns: AtomicU64::new(start_ns),
        }
    }

    /// Jump to `now_ns`. Moving backwards is ignored.
    pub fn set(&self, now_ns: u64) {
        self.now_ns.fetch_max(now_ns, Ordering::AcqRel);
    }

    /// Move forward by `delta_ns`.
    pub fn advance(&self, delta_ns: u64) {
        self.now_ns.fetch_add(delta_ns, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::Acquire)
    }
}

/// Receiver of edge notifications.
///
/// Implementations must be O(1) and must not wait on other threads.
pub trait EdgeSink: Send + Sync {
    /// One qualifying edge happened. Carries no payload; the sink timestamps it.
    fn on_edge(&self);
}

/// Something that detects edges and reports them to an [`EdgeSink`].
pub trait PulseSource: Send {
    /// Begin delivering edges to `sink`.
    fn start(&mut self, sink: Arc<dyn EdgeSink>) -> AppResult<()>;

    /// Stop delivering edges. Idempotent.
    fn stop(&mut self) -> AppResult<()>;
}

/// Capture-side counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Edges delivered to the sink
    pub edges: u64,
    /// Edges rejected as bounce (debounce strategy)
    pub rejected: u64,
    /// Pulses accepted (debounce) or counted in the open window (windowed)
    pub pulses: u64,
}

/// The core's edge sink.
pub struct PulseCapture {
    clock: Arc<dyn Clock>,
    filter: Arc<PulseFilter>,
    queue: Arc<SampleQueue>,
    edges: AtomicU64,
}

impl PulseCapture {
    /// Wire a filter to a queue, timestamping with `clock`.
    pub fn new(clock: Arc<dyn Clock>, filter: Arc<PulseFilter>, queue: Arc<SampleQueue>) -> Self {
        Self {
            clock,
            filter,
            queue,
            edges: AtomicU64::new(0),
        }
    }

    /// Process one edge. Returns the queue outcome when a sample was produced.
    pub fn capture(&self) -> Option<PushOutcome> {
        self.edges.fetch_add(1, Ordering::Relaxed);
        let now_ns = self.clock.now_ns();

        match self.filter.as_ref() {
            PulseFilter::Debounce(debounce) => {
                debounce.on_edge(now_ns).map(|sample| self.queue.push(sample))
            }
            PulseFilter::Windowed(counter) => {
                counter.on_edge();
                None
            }
        }
    }

    /// The configured filter.
    pub fn filter(&self) -> &Arc<PulseFilter> {
        &self.filter
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CaptureStats {
        let (rejected, pulses) = match self.filter.as_ref() {
            PulseFilter::Debounce(debounce) => (debounce.rejected_count(), debounce.pulse_count()),
            PulseFilter::Windowed(counter) => (0, counter.pending_pulses()),
        };

        CaptureStats {
            edges: self.edges.load(Ordering::Relaxed),
            rejected,
            pulses,
        }
    }
}

impl EdgeSink for PulseCapture {
    fn on_edge(&self) {
        self.capture();
    }
}
