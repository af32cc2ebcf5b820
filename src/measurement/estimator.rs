//! Frequency estimation: turns a sample's pulse timing into RPM and ω.

use std::f64::consts::TAU;

use crate::error::{AppResult, DynoError};
use crate::measurement::sample::{Sample, SampleKind};

const NS_PER_S: f64 = 1e9;

/// Instantaneous rotational speed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AngularRate {
    /// Revolutions per minute
    pub rpm: f64,
    /// Angular velocity in rad/s
    pub omega: f64,
}

impl AngularRate {
    /// Build from a rotation frequency in Hz.
    pub fn from_hz(freq_hz: f64) -> Self {
        Self {
            rpm: freq_hz * 60.0,
            omega: TAU * freq_hz,
        }
    }

    /// Build from revolutions per minute.
    pub fn from_rpm(rpm: f64) -> Self {
        Self {
            rpm,
            omega: TAU * rpm / 60.0,
        }
    }
}

/// Estimate rotational speed from a sample.
///
/// Per-pulse samples use `60e9 / delta_ns`; window samples use
/// `pulses / elapsed_s`. A zero interval is a filter contract violation and
/// yields [`DynoError::DivisionByZero`] instead of an infinite rate.
pub fn estimate(sample: &Sample) -> AppResult<AngularRate> {
    if sample.interval_ns == 0 {
        return Err(DynoError::DivisionByZero {
            interval_ns: sample.interval_ns,
        });
    }

    let rate = match sample.kind {
        SampleKind::Pulse => AngularRate::from_rpm(60.0 * NS_PER_S / sample.interval_ns as f64),
        SampleKind::Window => {
            let elapsed_s = sample.interval_ns as f64 / NS_PER_S;
            AngularRate::from_hz(sample.count as f64 / elapsed_s)
        }
    };

    Ok(rate)
}
