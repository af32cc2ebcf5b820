//! Pulse filters: per-pulse debounce and fixed-window counting.
//!
//! Both run their edge path inside the capture callback, so that path is a
//! handful of atomic operations and nothing else.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::EncoderConfig;
use crate::measurement::Sample;

const NO_TIMESTAMP: u64 = u64::MAX;

/// Filter strategy, chosen at configuration time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterStrategy {
    /// One sample per accepted edge
    #[default]
    Debounce,
    /// One sample per non-empty counting window
    Windowed,
}

/// What a rejected (bouncing) edge does to the debounce reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DebounceReference {
    /// Every edge moves the reference, rejected or not
    #[default]
    Advance,
    /// Only accepted edges move the reference
    Hold,
}

/// Per-pulse debounced strategy.
#[derive(Debug)]
pub struct DebounceFilter {
    min_delta_ns: u64,
    reference: DebounceReference,
    last_ns: AtomicU64,
    pulses: AtomicU64,
    rejected: AtomicU64,
}

impl DebounceFilter {
    /// Create a filter rejecting edges closer than `min_delta_ns`.
    pub fn new(min_delta_ns: u64, reference: DebounceReference) -> Self {
        Self {
            min_delta_ns,
            reference,
            last_ns: AtomicU64::new(NO_TIMESTAMP),
            pulses: AtomicU64::new(0),
            rejected: AtomicU64::new(0),
        }
    }

    /// Fold one edge at `now_ns` into the filter.
    ///
    /// The first edge only sets the baseline. A delta of zero is always
    /// rejected, whatever the noise floor.
    pub fn on_edge(&self, now_ns: u64) -> Option<Sample> {
        let prev = match self.reference {
            DebounceReference::Advance => self.last_ns.swap(now_ns, Ordering::AcqRel),
            DebounceReference::Hold => self.last_ns.load(Ordering::Acquire),
        };

        if prev == NO_TIMESTAMP {
            self.last_ns.store(now_ns, Ordering::Release);
            return None;
        }

        let delta_ns = now_ns.saturating_sub(prev);
        if delta_ns == 0 || delta_ns < self.min_delta_ns {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        if self.reference == DebounceReference::Hold {
            self.last_ns.store(now_ns, Ordering::Release);
        }

        let index = self.pulses.fetch_add(1, Ordering::AcqRel) + 1;
        Some(Sample::pulse(index, delta_ns, now_ns))
    }

    /// Accepted pulses so far.
    pub fn pulse_count(&self) -> u64 {
        self.pulses.load(Ordering::Acquire)
    }

    /// Restart pulse numbering at 1. The timing reference is kept, so the next
    /// edge still measures a full interval.
    pub fn reset_index(&self) {
        self.pulses.store(0, Ordering::Release);
    }

    /// Edges rejected as bounce so far.
    pub fn rejected_count(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Noise floor in nanoseconds.
    pub fn min_delta_ns(&self) -> u64 {
        self.min_delta_ns
    }
}

/// Fixed-window counting strategy.
///
/// The edge path is a single `fetch_add`; the window timer closes windows with
/// [`close_window`](Self::close_window), which swaps the counter to zero.
#[derive(Debug)]
pub struct WindowCounter {
    window_size_ns: u64,
    pulses: AtomicU64,
    window_start_ns: AtomicU64,
}

impl WindowCounter {
    /// Create a counter whose first window starts at `start_ns`.
    pub fn new(window_size_ns: u64, start_ns: u64) -> Self {
        Self {
            window_size_ns,
            pulses: AtomicU64::new(0),
            window_start_ns: AtomicU64::new(start_ns),
        }
    }

    /// Count one edge.
    pub fn on_edge(&self) {
        self.pulses.fetch_add(1, Ordering::Relaxed);
    }

    /// Close the window ending at `now_ns` and open the next one.
    ///
    /// Returns a sample covering the measured elapsed time when at least one
    /// pulse was counted; an idle window emits nothing.
    pub fn close_window(&self, now_ns: u64) -> Option<Sample> {
        let start = self.window_start_ns.load(Ordering::Acquire);
        let elapsed_ns = now_ns.saturating_sub(start);
        if elapsed_ns == 0 {
            return None;
        }

        self.window_start_ns.store(now_ns, Ordering::Release);
        let pulses = self.pulses.swap(0, Ordering::AcqRel);
        if pulses == 0 {
            return None;
        }

        Some(Sample::window(pulses, elapsed_ns, now_ns))
    }

    /// Start of the open window.
    pub fn window_start_ns(&self) -> u64 {
        self.window_start_ns.load(Ordering::Acquire)
    }

    /// Configured window length.
    pub fn window_size_ns(&self) -> u64 {
        self.window_size_ns
    }

    /// Edges counted in the open window.
    pub fn pending_pulses(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }
}

/// The configured strategy.
#[derive(Debug)]
pub enum PulseFilter {
    /// Per-pulse debounce
    Debounce(DebounceFilter),
    /// Fixed-window counting, shared with the window timer
    Windowed(Arc<WindowCounter>),
}

impl PulseFilter {
    /// Build the strategy named in `config`, with windows starting at `start_ns`.
    pub fn from_config(config: &EncoderConfig, start_ns: u64) -> Self {
        match config.strategy {
            FilterStrategy::Debounce => PulseFilter::Debounce(DebounceFilter::new(
                config.min_delta_ns,
                config.debounce_reference,
            )),
            FilterStrategy::Windowed => PulseFilter::Windowed(Arc::new(WindowCounter::new(
                config.window_size_ns,
                start_ns,
            ))),
        }
    }

    /// Restart pulse numbering for a new recording session.
    ///
    /// Window counts are per window and need no reset.
    pub fn reset_index(&self) {
        if let PulseFilter::Debounce(debounce) = self {
            debounce.reset_index();
        }
    }

    /// The strategy this filter implements.
    pub fn strategy(&self) -> FilterStrategy {
        match self {
            PulseFilter::Debounce(_) => FilterStrategy::Debounce,
            PulseFilter::Windowed(_) => FilterStrategy::Windowed,
        }
    }
}
