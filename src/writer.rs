//! Writer/aggregator: the single consumer of the sample queue.
//!
//! For every dequeued sample the writer takes the session gate, discards the
//! sample if the controller is idle, otherwise estimates rate and kinematics and
//! appends the record to the rolling series. The gate is released before the
//! log line is written, so a slow disk never stalls a start/stop command.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tracing::{debug, error, info, trace, warn};

use crate::error::{AppResult, DynoError};
use crate::measurement::{measure, MeasurementRecord, Sample};
use crate::queue::SampleQueue;
use crate::session::{RecordingController, RecordingState};
use crate::storage::MeasurementLog;

/// Thread name, visible in log output.
pub const WRITER_THREAD_NAME: &str = "dyno-writer";

/// What happened to one dequeued sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProcessOutcome {
    /// Controller idle, sample dropped
    Discarded,
    /// Estimator rejected the sample
    Faulted,
    /// Record retained; `persisted` tells whether the log line was written
    Recorded {
        /// Derived record
        record: MeasurementRecord,
        /// Log append succeeded
        persisted: bool,
    },
}

/// Counters shared between the writer thread and its observers.
#[derive(Debug, Default)]
pub struct WriterCounters {
    processed: AtomicU64,
    discarded: AtomicU64,
    estimator_faults: AtomicU64,
    persistence_failures: AtomicU64,
    over_speed: AtomicU64,
    handled: AtomicU64,
    log_degraded: AtomicBool,
}

/// Snapshot of [`WriterCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records added to the series
    pub processed: u64,
    /// Samples dequeued while idle
    pub discarded: u64,
    /// Samples rejected by the estimator
    pub estimator_faults: u64,
    /// Failed log appends
    pub persistence_failures: u64,
    /// Records above the configured maximum RPM
    pub over_speed: u64,
    /// Samples taken off the queue and fully handled
    pub handled: u64,
    /// Whether the durable log is currently failing
    pub log_degraded: bool,
}

impl WriterCounters {
    /// Snapshot of the counters.
    pub fn snapshot(&self) -> WriterStats {
        WriterStats {
            processed: self.processed.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
            estimator_faults: self.estimator_faults.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            over_speed: self.over_speed.load(Ordering::Relaxed),
            handled: self.handled.load(Ordering::Acquire),
            log_degraded: self.log_degraded.load(Ordering::Relaxed),
        }
    }
}

/// Consumer-side state: the log handle and the plausibility limit.
pub struct Aggregator {
    controller: RecordingController,
    log: MeasurementLog,
    max_rpm: f64,
    counters: Arc<WriterCounters>,
}

impl Aggregator {
    /// Consumer gated by `controller`, writing to `log`, flagging records above `max_rpm`.
    pub fn new(controller: RecordingController, log: MeasurementLog, max_rpm: f64) -> Self {
        Self {
            controller,
            log,
            max_rpm,
            counters: Arc::new(WriterCounters::default()),
        }
    }

    /// Shared counters, readable while the writer runs.
    pub fn counters(&self) -> Arc<WriterCounters> {
        Arc::clone(&self.counters)
    }

    /// Handle one dequeued sample.
    pub fn process(&mut self, sample: &Sample) -> ProcessOutcome {
        let outcome = self.process_inner(sample);
        self.counters.handled.fetch_add(1, Ordering::Release);
        outcome
    }

    fn process_inner(&mut self, sample: &Sample) -> ProcessOutcome {
        let record = {
            let mut gate = self.controller.lock();
            if gate.state == RecordingState::Idle {
                self.counters.discarded.fetch_add(1, Ordering::Relaxed);
                trace!(count = sample.count, "Discarded sample while idle");
                return ProcessOutcome::Discarded;
            }

            let record = match measure(sample, &mut gate.kinematics) {
                Ok(record) => record,
                Err(e) => {
                    self.counters.estimator_faults.fetch_add(1, Ordering::Relaxed);
                    warn!(count = sample.count, interval_ns = sample.interval_ns, error = %e, "Dropped sample");
                    return ProcessOutcome::Faulted;
                }
            };

            if record.rpm > self.max_rpm {
                self.counters.over_speed.fetch_add(1, Ordering::Relaxed);
                warn!(rpm = record.rpm, max_rpm = self.max_rpm, "RPM above plausible maximum");
            }

            self.controller.series().push(record);
            self.counters.processed.fetch_add(1, Ordering::Relaxed);
            record
        };

        let persisted = match self.log.append(&record) {
            Ok(()) => true,
            Err(e) => {
                self.counters
                    .persistence_failures
                    .fetch_add(1, Ordering::Relaxed);
                debug!(error = %e, "Log append failed, will retry on next record");
                false
            }
        };
        self.counters
            .log_degraded
            .store(self.log.is_degraded(), Ordering::Relaxed);

        ProcessOutcome::Recorded { record, persisted }
    }

    /// Drain `queue` until it is closed and empty, then close the log.
    pub fn run(mut self, queue: &SampleQueue) -> AppResult<()> {
        info!(path = %self.log.path().display(), "Writer started");
        while let Some(sample) = queue.pop() {
            self.process(&sample);
        }

        let stats = self.counters.snapshot();
        info!(
            processed = stats.processed,
            discarded = stats.discarded,
            faults = stats.estimator_faults,
            "Writer drained queue"
        );
        self.log.close()
    }
}

/// The running consumer thread.
pub struct WriterHandle {
    counters: Arc<WriterCounters>,
    handle: Option<JoinHandle<AppResult<()>>>,
}

impl WriterHandle {
    /// Move `aggregator` onto a new `dyno-writer` thread consuming `queue`.
    pub fn spawn(aggregator: Aggregator, queue: Arc<SampleQueue>) -> AppResult<Self> {
        let counters = aggregator.counters();
        let handle = thread::Builder::new()
            .name(WRITER_THREAD_NAME.to_string())
            .spawn(move || aggregator.run(&queue))
            .map_err(|e| {
                error!(error = %e, "Failed to spawn writer thread");
                DynoError::ThreadSpawn(WRITER_THREAD_NAME.to_string())
            })?;

        Ok(Self {
            counters,
            handle: Some(handle),
        })
    }

    /// Snapshot of the writer counters.
    pub fn stats(&self) -> WriterStats {
        self.counters.snapshot()
    }

    /// Wait for the thread to finish. The queue must be closed first.
    pub fn join(&mut self) -> AppResult<()> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or_else(|e| {
                error!("Writer thread panicked: {:?}", e);
                Err(DynoError::ThreadSpawn(format!(
                    "{WRITER_THREAD_NAME} panicked"
                )))
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurement::{KinematicsEngine, SampleKind};
    use crate::session::RollingSeries;
    use crate::storage::Delimiter;
    use tempfile::tempdir;

    fn aggregator(dir: &std::path::Path, max_rpm: f64) -> (Aggregator, RecordingController) {
        let controller =
            RecordingController::new(KinematicsEngine::new(0.038), RollingSeries::new());
        let log = MeasurementLog::create(dir.join("log.txt"), Delimiter::Tab, SampleKind::Pulse);
        (Aggregator::new(controller.clone(), log, max_rpm), controller)
    }

    #[test]
    fn idle_samples_are_discarded() {
        let dir = tempdir().unwrap();
        let (mut agg, controller) = aggregator(dir.path(), 9000.0);

        let outcome = agg.process(&Sample::pulse(1, 10_000_000, 10_000_000));
        assert_eq!(outcome, ProcessOutcome::Discarded);
        assert!(controller.series().is_empty());

        let stats = agg.counters().snapshot();
        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.handled, 1);
    }

    #[test]
    fn recording_sample_reaches_series_and_log() {
        let dir = tempdir().unwrap();
        let (mut agg, controller) = aggregator(dir.path(), 9000.0);
        controller.start();

        match agg.process(&Sample::pulse(1, 10_000_000, 10_000_000)) {
            ProcessOutcome::Recorded { record, persisted } => {
                assert!(persisted);
                assert!((record.rpm - 6000.0).abs() < 1e-9);
                assert_eq!(record.torque, 0.0);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(controller.series().len(), 1);
        assert_eq!(agg.log.rows_written(), 1);
    }

    #[test]
    fn zero_interval_counts_as_fault() {
        let dir = tempdir().unwrap();
        let (mut agg, controller) = aggregator(dir.path(), 9000.0);
        controller.start();

        assert_eq!(agg.process(&Sample::pulse(1, 0, 5)), ProcessOutcome::Faulted);
        assert_eq!(agg.counters().snapshot().estimator_faults, 1);
        assert!(controller.series().is_empty());
    }

    #[test]
    fn over_speed_records_are_kept_and_counted() {
        let dir = tempdir().unwrap();
        let (mut agg, controller) = aggregator(dir.path(), 5000.0);
        controller.start();

        agg.process(&Sample::pulse(1, 10_000_000, 10_000_000));
        assert_eq!(agg.counters().snapshot().over_speed, 1);
        assert_eq!(controller.series().len(), 1);
    }

    #[test]
    fn run_exits_when_queue_closes() {
        let dir = tempdir().unwrap();
        let (agg, controller) = aggregator(dir.path(), 9000.0);
        controller.start();

        let queue = Arc::new(SampleQueue::unbounded());
        let mut handle = WriterHandle::spawn(agg, Arc::clone(&queue)).unwrap();
        queue.push(Sample::pulse(1, 10_000_000, 10_000_000));
        queue.push(Sample::pulse(2, 10_000_000, 20_000_000));
        queue.close();

        handle.join().unwrap();
        assert_eq!(handle.stats().processed, 2);
        assert_eq!(controller.series().len(), 2);
    }
}
