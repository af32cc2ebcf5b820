//! Samples flowing through the queue and the records derived from them.

use serde::{Deserialize, Serialize};

/// Which filter strategy produced a sample; selects the estimator formula.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleKind {
    /// One accepted edge; `count` is the running pulse index.
    Pulse,
    /// One closed counting window; `count` is the pulses seen in it.
    Window,
}

/// The unit handed from the capture path to the writer.
///
/// Moved through the pipeline, never shared: the capture side builds it, the
/// queue owns it while pending, and the writer consumes it exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    /// Pulse index (per-pulse) or pulses in window (windowed)
    pub count: u64,
    /// Elapsed time backing the frequency estimate
    pub interval_ns: u64,
    /// Capture time of this sample on the pipeline clock
    pub timestamp_ns: u64,
    /// Producing strategy
    pub kind: SampleKind,
}

impl Sample {
    /// A debounced single-pulse sample.
    pub fn pulse(index: u64, delta_ns: u64, timestamp_ns: u64) -> Self {
        Self {
            count: index,
            interval_ns: delta_ns,
            timestamp_ns,
            kind: SampleKind::Pulse,
        }
    }

    /// A closed-window sample.
    pub fn window(pulses: u64, elapsed_ns: u64, timestamp_ns: u64) -> Self {
        Self {
            count: pulses,
            interval_ns: elapsed_ns,
            timestamp_ns,
            kind: SampleKind::Window,
        }
    }

    /// Capture time in seconds.
    pub fn time_s(&self) -> f64 {
        self.timestamp_ns as f64 / 1e9
    }
}

/// One row of the rolling series and the durable log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Pulse index or pulses in window, copied from the sample
    pub count: u64,
    /// Interval the estimate is based on
    pub interval_ns: u64,
    /// Revolutions per minute
    pub rpm: f64,
    /// Angular velocity in rad/s
    pub omega: f64,
    /// Torque in N·m; negative while decelerating
    pub torque: f64,
    /// Power in W; negative while decelerating
    pub power: f64,
    /// Capture time in seconds
    pub time_s: f64,
}
