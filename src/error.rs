//! Custom error types for the measurement pipeline.
//!
//! This module defines the primary error type, `DynoError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized way to describe the faults
//! that can occur between the encoder callback and the durable log.
//!
//! ## Error Hierarchy
//!
//! - **`Config`**: Wraps errors from `figment`, typically parsing or type errors in
//!   the TOML file or the environment overrides.
//! - **`Configuration`**: Semantic errors in a configuration that parsed fine but is
//!   logically unusable (zero window, negative inertia, ...). Fatal at startup.
//! - **`DivisionByZero`**: A sample with a zero interval reached the estimator. The
//!   sample is dropped and the pipeline continues.
//! - **`PersistenceFailure`** / **`Io`** / **`Csv`**: The durable log could not be
//!   written. The live series keeps accumulating and the write is retried.
//! - **`ThreadSpawn`** / **`PulseSource`**: Failures starting the worker threads or
//!   the external pulse source.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DynoError>;

#[derive(Error, Debug)]
pub enum DynoError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Division by zero: sample interval is {interval_ns} ns")]
    DivisionByZero { interval_ns: u64 },

    #[error("Failed to persist measurement: {0}")]
    PersistenceFailure(String),

    #[error("Failed to spawn thread '{0}'")]
    ThreadSpawn(String),

    #[error("Pulse source error: {0}")]
    PulseSource(String),
}

impl From<figment::Error> for DynoError {
    fn from(value: figment::Error) -> Self {
        DynoError::Config(Box::new(value))
    }
}

impl DynoError {
    /// Whether the pipeline keeps running after this fault.
    ///
    /// Configuration and startup failures halt the process; estimator and
    /// persistence faults only cost the affected sample or log line.
    pub fn is_recoverable(&self) -> bool {
        match self {
            DynoError::DivisionByZero { .. }
            | DynoError::PersistenceFailure(_)
            | DynoError::Io(_)
            | DynoError::Csv(_) => true,
            DynoError::Config(_)
            | DynoError::Configuration(_)
            | DynoError::ThreadSpawn(_)
            | DynoError::PulseSource(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimator_and_persistence_faults_are_recoverable() {
        assert!(DynoError::DivisionByZero { interval_ns: 0 }.is_recoverable());
        assert!(DynoError::PersistenceFailure("disk full".into()).is_recoverable());
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert!(DynoError::from(io).is_recoverable());
    }

    #[test]
    fn configuration_faults_are_fatal() {
        assert!(!DynoError::Configuration("window_size_ns must be > 0".into()).is_recoverable());
        assert!(!DynoError::ThreadSpawn("dyno-writer".into()).is_recoverable());
    }

    #[test]
    fn division_by_zero_message_names_interval() {
        let err = DynoError::DivisionByZero { interval_ns: 0 };
        assert_eq!(err.to_string(), "Division by zero: sample interval is 0 ns");
    }
}
