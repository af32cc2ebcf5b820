//! Simulated encoder driving a real-time pipeline
//!
//! Uses the process monotonic clock, so only properties that hold under
//! scheduler jitter are asserted.

use dyno_daq::sim::{DynoRunProfile, SimulatedEncoder};
use dyno_daq::{DynoConfig, Pipeline, PulseSource};
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn simulated_run_fills_series_and_log() {
    let dir = TempDir::new().unwrap();
    let mut config = DynoConfig::default();
    config.storage.output_dir = dir.path().to_path_buf();

    let pipeline = Pipeline::start(&config).unwrap();
    let controller = pipeline.controller();
    controller.start();

    let profile = DynoRunProfile {
        min_rpm: 3000.0,
        max_rpm: 3000.0,
        ..DynoRunProfile::default()
    }
    .with_duration(0.3);
    let mut encoder = SimulatedEncoder::new(profile, Some(42));
    encoder.start(pipeline.edge_sink()).unwrap();

    std::thread::sleep(Duration::from_millis(400));
    encoder.stop().unwrap();
    assert!(pipeline.drain(Duration::from_secs(5)));
    controller.stop();

    let series = pipeline.series();
    let path = pipeline.log_path().to_path_buf();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    let stats = pipeline.shutdown().unwrap();

    assert!(name.starts_with("log_") && name.ends_with(".txt"));
    assert!(encoder.pulses_emitted() > 1);
    assert_eq!(stats.capture.edges, encoder.pulses_emitted());
    assert_eq!(stats.writer.processed as usize, series.len());

    let records = series.snapshot();
    assert!(!records.is_empty());
    assert!(records.windows(2).all(|w| w[0].time_s <= w[1].time_s));
    assert!(records.iter().all(|r| r.rpm.is_finite() && r.rpm > 0.0));

    let contents = std::fs::read_to_string(&path).unwrap();
    assert_eq!(contents.lines().count(), records.len() + 1);
}
