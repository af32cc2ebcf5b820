//! # Dyno DAQ Core Library
//!
//! This crate turns encoder pulses from a dynamometer rig into RPM, angular
//! velocity, torque and power, in real time, without ever blocking the code
//! path that timestamps the pulses. The library holds the whole pipeline so the
//! CLI (`main.rs`), a dashboard, or a test harness can drive it the same way.
//!
//! ## Crate Structure
//!
//! - **`capture`**: The edge sink called by a pulse source, the monotonic clock,
//!   the debounce and windowed filters, and the window timer thread.
//! - **`queue`**: The FIFO between capture and the writer, with its overflow policy.
//! - **`measurement`**: Samples and records, the frequency estimator and the
//!   kinematics engine (torque and power from ω over time).
//! - **`session`**: The recording controller (Idle/Recording gate) and the rolling
//!   series read by visualization.
//! - **`writer`**: The single consumer thread feeding the series and the log.
//! - **`storage`**: The delimited measurement log file.
//! - **`pipeline`**: Wires the stages together and owns their threads.
//! - **`sim`**: A simulated encoder replaying a dyno run profile.
//! - **`config`**: Layered configuration using `figment`.
//! - **`logging`**: `tracing-subscriber` initialisation.
//! - **`error`**: The crate-wide `DynoError` enum.
//!
//! ## Example
//!
//! ```no_run
//! use dyno_daq::config::DynoConfig;
//! use dyno_daq::pipeline::Pipeline;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DynoConfig::load()?;
//! let pipeline = Pipeline::start(&config)?;
//! pipeline.controller().start();
//! // hand pipeline.edge_sink() to a pulse source ...
//! let stats = pipeline.shutdown()?;
//! println!("{} records", stats.writer.processed);
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod logging;
pub mod measurement;
pub mod pipeline;
pub mod queue;
pub mod session;
pub mod sim;
pub mod storage;
pub mod writer;

pub use capture::{Clock, EdgeSink, ManualClock, MonotonicClock, PulseSource};
pub use config::DynoConfig;
pub use error::{AppResult, DynoError};
pub use measurement::{MeasurementRecord, Sample, SampleKind};
pub use pipeline::{Pipeline, PipelineStats};
pub use session::{RecordingController, RecordingState, RollingSeries};
