//! Recording sessions: the Idle/Recording gate and the rolling series.
//!
//! ## Gate
//!
//! `RecordingController` is the command entry point for the dashboard. It shares
//! one mutex with the writer thread; that mutex guards the recording state and
//! the kinematics reference together, so a session start (clear series, forget
//! previous ω, set recording) can never interleave with a record computation.
//!
//! ## Rolling series
//!
//! `RollingSeries` is the read side handed to the dashboard and the summary
//! plotter. Reads clone a snapshot under a read lock; a snapshot may miss a
//! record appended a moment later, which is acceptable for display.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::capture::filter::PulseFilter;
use crate::measurement::{KinematicsEngine, MeasurementRecord};

/// Recording state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecordingState {
    /// Samples are discarded at dequeue
    #[default]
    Idle,
    /// Samples are measured, logged and retained
    Recording,
}

/// One point of the torque/power-vs-RPM summary curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerCurvePoint {
    /// Revolutions per minute
    pub rpm: f64,
    /// N·m
    pub torque: f64,
    /// kW
    pub power_kw: f64,
}

/// Shared, append-only (while recording) sequence of records.
#[derive(Debug, Clone, Default)]
pub struct RollingSeries {
    records: Arc<RwLock<Vec<MeasurementRecord>>>,
}

impl RollingSeries {
    /// An empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record of the current or last session.
    pub fn snapshot(&self) -> Vec<MeasurementRecord> {
        self.records.read().clone()
    }

    /// Most recent record.
    pub fn latest(&self) -> Option<MeasurementRecord> {
        self.records.read().last().copied()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the series holds no record.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    /// Records captured within `window_s` seconds of the latest one, for the
    /// live chart.
    pub fn recent(&self, window_s: f64) -> Vec<MeasurementRecord> {
        let records = self.records.read();
        let Some(last) = records.last() else {
            return Vec::new();
        };
        let start = last.time_s - window_s;
        // time_s is non-decreasing, so the window is a suffix
        let first = records.partition_point(|r| r.time_s < start);
        records[first..].to_vec()
    }

    /// Torque and power against RPM for the end-of-run summary.
    ///
    /// Points with negative torque or power are left out; the stored series is
    /// untouched.
    pub fn power_curve(&self) -> Vec<PowerCurvePoint> {
        self.records
            .read()
            .iter()
            .filter(|r| r.torque >= 0.0 && r.power >= 0.0)
            .map(|r| PowerCurvePoint {
                rpm: r.rpm,
                torque: r.torque,
                power_kw: r.power / 1000.0,
            })
            .collect()
    }

    pub(crate) fn push(&self, record: MeasurementRecord) {
        self.records.write().push(record);
    }

    pub(crate) fn clear(&self) {
        self.records.write().clear();
    }
}

/// State guarded by the recording mutex.
#[derive(Debug)]
pub(crate) struct SessionGate {
    pub(crate) state: RecordingState,
    pub(crate) kinematics: KinematicsEngine,
    pub(crate) session: u64,
}

/// Start/stop entry point and recording flag.
#[derive(Debug, Clone)]
pub struct RecordingController {
    gate: Arc<Mutex<SessionGate>>,
    series: RollingSeries,
    filter: Option<Arc<PulseFilter>>,
}

impl RecordingController {
    /// A controller in `Idle`, owning the kinematics engine used by the writer.
    pub fn new(kinematics: KinematicsEngine, series: RollingSeries) -> Self {
        Self {
            gate: Arc::new(Mutex::new(SessionGate {
                state: RecordingState::Idle,
                kinematics,
                session: 0,
            })),
            series,
            filter: None,
        }
    }

    /// Restart `filter`'s pulse numbering on every session start.
    pub fn with_pulse_filter(mut self, filter: Arc<PulseFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// `Idle → Recording`: clear the series, forget the previous ω, restart
    /// pulse numbering, start retaining samples. Returns `false` if already
    /// recording.
    pub fn start(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state == RecordingState::Recording {
            return false;
        }

        self.series.clear();
        gate.kinematics.reset();
        if let Some(filter) = &self.filter {
            filter.reset_index();
        }
        gate.state = RecordingState::Recording;
        gate.session += 1;

        info!(session = gate.session, "Recording started");
        true
    }

    /// `Recording → Idle`. The series is kept for the summary. Returns `false`
    /// if already idle.
    pub fn stop(&self) -> bool {
        let mut gate = self.gate.lock();
        if gate.state == RecordingState::Idle {
            return false;
        }

        gate.state = RecordingState::Idle;
        info!(
            session = gate.session,
            records = self.series.len(),
            "Recording stopped"
        );
        true
    }

    /// Current state.
    pub fn state(&self) -> RecordingState {
        self.gate.lock().state
    }

    /// Whether samples are currently retained.
    pub fn is_recording(&self) -> bool {
        self.state() == RecordingState::Recording
    }

    /// Number of sessions started so far.
    pub fn session(&self) -> u64 {
        self.gate.lock().session
    }

    /// The series this controller resets.
    pub fn series(&self) -> &RollingSeries {
        &self.series
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, SessionGate> {
        self.gate.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(time_s: f64, rpm: f64, torque: f64, power: f64) -> MeasurementRecord {
        MeasurementRecord {
            count: 0,
            interval_ns: 1,
            rpm,
            omega: rpm * std::f64::consts::TAU / 60.0,
            torque,
            power,
            time_s,
        }
    }

    fn controller() -> RecordingController {
        RecordingController::new(KinematicsEngine::new(0.038), RollingSeries::new())
    }

    #[test]
    fn starts_idle() {
        let controller = controller();
        assert_eq!(controller.state(), RecordingState::Idle);
        assert!(!controller.is_recording());
        assert_eq!(controller.session(), 0);
    }

    #[test]
    fn start_clears_series_and_resets_kinematics() {
        let controller = controller();
        controller.series().push(record(1.0, 1000.0, 0.0, 0.0));
        controller.lock().kinematics.compute(100.0, 1.0);

        assert!(controller.start());
        assert!(controller.is_recording());
        assert!(controller.series().is_empty());
        assert!(!controller.lock().kinematics.has_previous());
        assert_eq!(controller.session(), 1);
    }

    #[test]
    fn start_restarts_pulse_numbering() {
        use crate::capture::filter::{DebounceFilter, DebounceReference};

        let filter = Arc::new(PulseFilter::Debounce(DebounceFilter::new(
            6,
            DebounceReference::Advance,
        )));
        let controller = controller().with_pulse_filter(Arc::clone(&filter));
        let PulseFilter::Debounce(debounce) = filter.as_ref() else {
            unreachable!()
        };
        for t in [0, 10, 20, 30] {
            debounce.on_edge(t);
        }
        assert_eq!(debounce.pulse_count(), 3);

        controller.start();
        assert_eq!(debounce.pulse_count(), 0);
        assert_eq!(debounce.on_edge(40).map(|s| s.count), Some(1));
    }

    #[test]
    fn repeated_commands_are_no_ops() {
        let controller = controller();
        assert!(!controller.stop());
        assert!(controller.start());
        controller.series().push(record(1.0, 1000.0, 0.0, 0.0));
        assert!(!controller.start());
        assert_eq!(controller.series().len(), 1);
        assert!(controller.stop());
        assert!(!controller.stop());
    }

    #[test]
    fn stop_keeps_series() {
        let controller = controller();
        controller.start();
        controller.series().push(record(1.0, 1000.0, 0.0, 0.0));
        controller.stop();
        assert_eq!(controller.series().len(), 1);
    }

    #[test]
    fn recent_returns_trailing_window() {
        let series = RollingSeries::new();
        for i in 0..=40 {
            series.push(record(f64::from(i), 1000.0, 0.0, 0.0));
        }

        let recent = series.recent(30.0);
        assert_eq!(recent.len(), 31);
        assert_eq!(recent.first().map(|r| r.time_s), Some(10.0));
        assert_eq!(series.latest().map(|r| r.time_s), Some(40.0));
        assert!(RollingSeries::new().recent(30.0).is_empty());
    }

    #[test]
    fn power_curve_skips_negative_points() {
        let series = RollingSeries::new();
        series.push(record(0.1, 2000.0, 1.5, 314.0));
        series.push(record(0.2, 1900.0, -0.4, -80.0));
        series.push(record(0.3, 2100.0, 2.0, 440.0));

        let curve = series.power_curve();
        assert_eq!(curve.len(), 2);
        assert!((curve[0].power_kw - 0.314).abs() < 1e-12);
        assert_eq!(curve[1].rpm, 2100.0);
        // stored data keeps the deceleration point
        assert_eq!(series.len(), 3);
    }
}
