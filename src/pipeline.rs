//! Assembly of the measurement pipeline.
//!
//! [`Pipeline::start`] validates the configuration, creates the log, and starts
//! the writer thread (plus the window timer in windowed mode). The returned
//! pipeline exposes the edge sink for a pulse source, the recording controller,
//! and the rolling series.
//!
//! Shutdown order: window timer stopped and joined, queue closed, writer drains
//! the remainder and closes the log, writer joined.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use tracing::{info, warn};

use crate::capture::filter::PulseFilter;
use crate::capture::window::WindowTimer;
use crate::capture::{CaptureStats, Clock, EdgeSink, MonotonicClock, PulseCapture};
use crate::config::DynoConfig;
use crate::error::AppResult;
use crate::measurement::{KinematicsEngine, SampleKind};
use crate::queue::{QueueStats, SampleQueue};
use crate::session::{RecordingController, RecordingState, RollingSeries};
use crate::storage::MeasurementLog;
use crate::writer::{Aggregator, WriterHandle, WriterStats};

const DRAIN_POLL: Duration = Duration::from_millis(2);

/// Combined counters of every stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Capture-side counters
    pub capture: CaptureStats,
    /// Queue counters
    pub queue: QueueStats,
    /// Writer counters
    pub writer: WriterStats,
    /// Recording state at snapshot time
    pub state: RecordingState,
}

/// A running pipeline.
pub struct Pipeline {
    queue: Arc<SampleQueue>,
    capture: Arc<PulseCapture>,
    controller: RecordingController,
    timer: Option<WindowTimer>,
    writer: Option<WriterHandle>,
    last_writer_stats: WriterStats,
    log_path: PathBuf,
}

impl Pipeline {
    /// Start a pipeline timestamping with the process monotonic clock.
    pub fn start(config: &DynoConfig) -> AppResult<Self> {
        Self::start_with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Start a pipeline with an explicit clock.
    ///
    /// Configuration errors are returned before any thread or file is created.
    pub fn start_with_clock(config: &DynoConfig, clock: Arc<dyn Clock>) -> AppResult<Self> {
        config.validate()?;

        let queue = Arc::new(SampleQueue::with_capacity(
            config.queue.capacity,
            config.queue.overflow,
        ));
        let filter = Arc::new(PulseFilter::from_config(&config.encoder, clock.now_ns()));
        let kind = match filter.as_ref() {
            PulseFilter::Debounce(_) => SampleKind::Pulse,
            PulseFilter::Windowed(_) => SampleKind::Window,
        };

        let controller = RecordingController::new(
            KinematicsEngine::new(config.kinematics.moment_of_inertia),
            RollingSeries::new(),
        )
        .with_pulse_filter(Arc::clone(&filter));

        // timer before writer: an early return must not leave a thread blocked on the queue
        let timer = match filter.as_ref() {
            PulseFilter::Windowed(counter) => Some(WindowTimer::spawn(
                Arc::clone(counter),
                Arc::clone(&clock),
                Arc::clone(&queue),
            )?),
            PulseFilter::Debounce(_) => None,
        };

        let log_path = config.storage.log_path(Local::now());
        let log = MeasurementLog::create(&log_path, config.storage.delimiter, kind);
        let aggregator = Aggregator::new(controller.clone(), log, config.encoder.max_rpm);
        let writer = WriterHandle::spawn(aggregator, Arc::clone(&queue))?;

        let capture = Arc::new(PulseCapture::new(clock, filter, Arc::clone(&queue)));

        info!(
            strategy = ?config.encoder.strategy,
            pin = config.encoder.pin,
            log = %log_path.display(),
            "Pipeline started"
        );

        Ok(Self {
            queue,
            capture,
            controller,
            timer,
            writer: Some(writer),
            last_writer_stats: WriterStats::default(),
            log_path,
        })
    }

    /// Sink to hand to a [`PulseSource`](crate::capture::PulseSource).
    pub fn edge_sink(&self) -> Arc<dyn EdgeSink> {
        self.capture.clone()
    }

    /// The capture stage itself.
    pub fn capture(&self) -> &Arc<PulseCapture> {
        &self.capture
    }

    /// Start/stop handle.
    pub fn controller(&self) -> RecordingController {
        self.controller.clone()
    }

    /// Read handle on the rolling series.
    pub fn series(&self) -> RollingSeries {
        self.controller.series().clone()
    }

    /// Path of this run's log file.
    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    /// Snapshot of every stage's counters.
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            capture: self.capture.stats(),
            queue: self.queue.stats(),
            writer: self
                .writer
                .as_ref()
                .map_or(self.last_writer_stats, WriterHandle::stats),
            state: self.controller.state(),
        }
    }

    /// Wait until every sample queued so far has been handled by the writer.
    ///
    /// Returns `false` if `timeout` elapsed first.
    pub fn drain(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            // pending before dequeued: a sample popped in between must not be missed
            let pending = self.queue.len();
            let dequeued = self.queue.stats().dequeued;
            let handled = self.stats().writer.handled;
            if pending == 0 && dequeued == handled {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(DRAIN_POLL);
        }
    }

    /// Stop every thread, drain the queue and close the log.
    pub fn shutdown(mut self) -> AppResult<PipelineStats> {
        self.stop_threads()?;
        Ok(self.stats())
    }

    fn stop_threads(&mut self) -> AppResult<()> {
        if let Some(mut timer) = self.timer.take() {
            timer.stop();
        }

        self.queue.close();

        if let Some(mut writer) = self.writer.take() {
            let result = writer.join();
            self.last_writer_stats = writer.stats();
            result?;
            info!(path = %self.log_path.display(), "Pipeline stopped");
        }
        Ok(())
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop_threads() {
            warn!(error = %e, "Pipeline shutdown reported an error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ManualClock;
    use crate::error::DynoError;
    use tempfile::tempdir;

    #[test]
    fn invalid_config_creates_nothing() {
        let dir = tempdir().unwrap();
        let mut config = DynoConfig::default();
        config.storage.output_dir = dir.path().to_path_buf();
        config.kinematics.moment_of_inertia = -1.0;

        let result = Pipeline::start_with_clock(&config, Arc::new(ManualClock::new(0)));
        assert!(matches!(result, Err(DynoError::Configuration(_))));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn shutdown_reports_final_counters() {
        let dir = tempdir().unwrap();
        let mut config = DynoConfig::default();
        config.storage.output_dir = dir.path().to_path_buf();
        config.storage.log_file = Some("run.txt".to_string());

        let clock = Arc::new(ManualClock::new(0));
        let pipeline = Pipeline::start_with_clock(&config, clock.clone()).unwrap();
        pipeline.controller().start();

        let sink = pipeline.edge_sink();
        for _ in 0..4 {
            sink.on_edge();
            clock.advance(10_000_000);
        }

        let stats = pipeline.shutdown().unwrap();
        assert_eq!(stats.capture.edges, 4);
        assert_eq!(stats.writer.processed, 3);
        assert_eq!(stats.queue.pending, 0);
    }
}
