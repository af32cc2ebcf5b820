//! Configuration System using Figment
//!
//! This module provides strongly-typed configuration loading for the dyno pipeline.
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults (`DynoConfig::default()`)
//! 2. `config/dyno.toml` (or any file passed to [`DynoConfig::load_from`])
//! 3. Environment variables prefixed with `DYNO_DAQ_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use dyno_daq::config::DynoConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DynoConfig::load()?;
//! config.validate()?;
//! println!("Encoder on pin {}", config.encoder.pin);
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Local};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::capture::filter::{DebounceReference, FilterStrategy};
use crate::error::{AppResult, DynoError};
use crate::logging::LogFormat;
use crate::queue::OverflowPolicy;
use crate::storage::Delimiter;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/dyno.toml";

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "DYNO_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DynoConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Pulse capture settings
    pub encoder: EncoderConfig,
    /// Rig mechanics
    pub kinematics: KinematicsConfig,
    /// Capture-to-writer queue settings
    pub queue: QueueConfig,
    /// Durable log settings
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: LogFormat,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Dyno DAQ".to_string(),
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
        }
    }
}

/// Encoder and pulse filter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderConfig {
    /// Pin identifier handed to the pulse source
    pub pin: u8,
    /// Per-pulse debounce or fixed-window counting
    pub strategy: FilterStrategy,
    /// Debounce noise floor in nanoseconds
    pub min_delta_ns: u64,
    /// Whether a rejected edge moves the debounce reference
    pub debounce_reference: DebounceReference,
    /// Counting window in nanoseconds (windowed strategy)
    pub window_size_ns: u64,
    /// Plausibility ceiling; faster records are flagged but kept
    pub max_rpm: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            pin: 16,
            strategy: FilterStrategy::Debounce,
            // ~10000 RPM at one pulse per revolution
            min_delta_ns: 6_000_000,
            debounce_reference: DebounceReference::Advance,
            window_size_ns: 500_000_000,
            max_rpm: 9000.0,
        }
    }
}

/// Rig mechanics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KinematicsConfig {
    /// Moment of inertia of the rotating mass in kg·m²
    pub moment_of_inertia: f64,
}

impl Default for KinematicsConfig {
    fn default() -> Self {
        Self {
            moment_of_inertia: 0.038,
        }
    }
}

/// Sample queue configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Maximum queued samples (0 = unbounded)
    pub capacity: usize,
    /// What to drop when a bounded queue is full
    pub overflow: OverflowPolicy,
}

/// Durable log configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory the log file is created in
    pub output_dir: PathBuf,
    /// Log file name; a timestamped name is generated when unset
    pub log_file: Option<String>,
    /// Column delimiter, fixed for the lifetime of one file
    pub delimiter: Delimiter,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            log_file: None,
            delimiter: Delimiter::Tab,
        }
    }
}

impl StorageConfig {
    /// Resolve the log file path, generating `log_%Y%m%d_%H%M%S.txt` when no
    /// name is configured.
    pub fn log_path(&self, now: DateTime<Local>) -> PathBuf {
        let name = match &self.log_file {
            Some(name) => name.clone(),
            None => now.format("log_%Y%m%d_%H%M%S.txt").to_string(),
        };
        self.output_dir.join(name)
    }
}

impl DynoConfig {
    /// Load configuration from `config/dyno.toml` and environment variables
    ///
    /// Environment variables can override configuration with prefix `DYNO_DAQ_`
    /// Example: `DYNO_DAQ_ENCODER__MIN_DELTA_NS=2000000`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    /// The layered provider stack, exposed for tests and tooling.
    pub fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(DynoConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    ///
    /// Any error here is fatal: the pipeline must not start any thread with a
    /// configuration that would divide by zero or invert torque.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DynoError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.encoder.window_size_ns == 0 {
            return Err(DynoError::Configuration(
                "encoder.window_size_ns must be greater than 0".to_string(),
            ));
        }

        if !self.encoder.max_rpm.is_finite() || self.encoder.max_rpm <= 0.0 {
            return Err(DynoError::Configuration(format!(
                "encoder.max_rpm must be a positive number, got {}",
                self.encoder.max_rpm
            )));
        }

        let inertia = self.kinematics.moment_of_inertia;
        if !inertia.is_finite() || inertia <= 0.0 {
            return Err(DynoError::Configuration(format!(
                "kinematics.moment_of_inertia must be a positive number of kg·m², got {inertia}"
            )));
        }

        if let Some(name) = &self.storage.log_file {
            if name.trim().is_empty() {
                return Err(DynoError::Configuration(
                    "storage.log_file must not be empty when set".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config_is_valid() {
        let config = DynoConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.encoder.pin, 16);
        assert_eq!(config.encoder.window_size_ns, 500_000_000);
        assert!((config.kinematics.moment_of_inertia - 0.038).abs() < f64::EPSILON);
    }

    #[test]
    fn test_zero_window_is_rejected() {
        let mut config = DynoConfig::default();
        config.encoder.window_size_ns = 0;
        assert!(matches!(
            config.validate(),
            Err(DynoError::Configuration(_))
        ));
    }

    #[test]
    fn test_negative_inertia_is_rejected() {
        let mut config = DynoConfig::default();
        config.kinematics.moment_of_inertia = -0.5;
        assert!(config.validate().is_err());

        config.kinematics.moment_of_inertia = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let mut config = DynoConfig::default();
        config.application.log_level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_log_file_is_rejected() {
        let mut config = DynoConfig::default();
        config.storage.log_file = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generated_log_name_is_timestamped() {
        let storage = StorageConfig {
            output_dir: PathBuf::from("runs"),
            ..Default::default()
        };
        let now = Local
            .with_ymd_and_hms(2025, 3, 14, 9, 26, 53)
            .single()
            .unwrap();
        assert_eq!(
            storage.log_path(now),
            PathBuf::from("runs").join("log_20250314_092653.txt")
        );
    }

    #[test]
    fn test_toml_and_env_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "dyno.toml",
                r#"
                [application]
                log_format = "json"

                [encoder]
                strategy = "windowed"
                window_size_ns = 250000000

                [storage]
                delimiter = "comma"
                log_file = "bench.csv"
                "#,
            )?;
            jail.set_env("DYNO_DAQ_KINEMATICS__MOMENT_OF_INERTIA", "0.05");

            let config = DynoConfig::load_from("dyno.toml").unwrap();
            assert_eq!(config.application.log_format, LogFormat::Json);
            assert_eq!(config.encoder.strategy, FilterStrategy::Windowed);
            assert_eq!(config.encoder.window_size_ns, 250_000_000);
            assert_eq!(config.storage.delimiter, Delimiter::Comma);
            assert_eq!(config.storage.log_file.as_deref(), Some("bench.csv"));
            assert!((config.kinematics.moment_of_inertia - 0.05).abs() < 1e-12);
            // untouched sections keep their defaults
            assert_eq!(config.encoder.pin, 16);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        figment::Jail::expect_with(|_jail| {
            let config = DynoConfig::load_from("does-not-exist.toml").unwrap();
            assert_eq!(config, DynoConfig::default());
            Ok(())
        });
    }
}
