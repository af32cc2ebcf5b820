//! Tracing Infrastructure
//!
//! Structured logging for the pipeline, built on `tracing` and `tracing-subscriber`.
//! The output format comes from `application.log_format`:
//!
//! - `compact` (default): one line per event, no colors, for the rig's terminal
//! - `pretty`: multi-line colored output for development
//! - `json`: one JSON object per event, for log collectors
//!
//! `RUST_LOG` overrides `application.log_level` when set. Thread names are always
//! printed, so events from `dyno-writer`, `dyno-window` and the pulse source are
//! easy to tell apart.
//!
//! # Example
//! ```no_run
//! use dyno_daq::{config::DynoConfig, logging};
//! use tracing::info;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DynoConfig::load()?;
//! logging::init_from_config(&config)?;
//! info!(pin = config.encoder.pin, "Encoder configured");
//! # Ok(())
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::DynoConfig;
use crate::error::{AppResult, DynoError};

/// Event output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// Single line, no colors
    #[default]
    Compact,
    /// One JSON object per line
    Json,
}

/// Resolved subscriber settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TracingConfig {
    /// Fallback level when `RUST_LOG` is unset
    pub level: Level,
    /// Output format
    pub format: LogFormat,
}

impl TracingConfig {
    /// Resolve the `application` section.
    pub fn from_config(config: &DynoConfig) -> AppResult<Self> {
        Ok(Self {
            level: parse_log_level(&config.application.log_level)?,
            format: config.application.log_format,
        })
    }
}

/// Initialize tracing from the application configuration
pub fn init_from_config(config: &DynoConfig) -> AppResult<()> {
    init(TracingConfig::from_config(config)?)
}

/// Install the global subscriber.
///
/// Returns `Ok(())` without changes when a subscriber is already installed, so
/// tests and repeated CLI setup can call it freely.
pub fn init(config: TracingConfig) -> AppResult<()> {
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(config.level).into())
        .from_env_lossy();

    let fmt_layer = match config.format {
        LogFormat::Pretty => fmt::layer().pretty().with_thread_names(true).boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_thread_names(true)
            .with_ansi(false)
            .boxed(),
        LogFormat::Json => fmt::layer().json().with_thread_names(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .or_else(|e| {
            // lost a race with another initializer
            if tracing::dispatcher::has_been_set() {
                Ok(())
            } else {
                Err(DynoError::Configuration(format!(
                    "Failed to initialize tracing: {e}"
                )))
            }
        })
}

/// Parse log level string into tracing Level
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    level.trim().parse::<Level>().map_err(|_| {
        DynoError::Configuration(format!(
            "Invalid log level '{level}'. Must be one of: trace, debug, info, warn, error"
        ))
    })
}
