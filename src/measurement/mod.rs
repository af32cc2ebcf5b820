//! Pulse timing to physical quantities.
//!
//! - [`sample`]: the `Sample` handed over by the capture path and the
//!   `MeasurementRecord` derived from it
//! - [`estimator`]: sample → RPM and ω
//! - [`kinematics`]: ω over time → torque and power

pub mod estimator;
pub mod kinematics;
pub mod sample;

pub use estimator::{estimate, AngularRate};
pub use kinematics::{Dynamics, KinematicsEngine};
pub use sample::{MeasurementRecord, Sample, SampleKind};

use crate::error::AppResult;

/// Run one sample through the estimator and the kinematics engine.
///
/// The engine's reference is only advanced when the estimate succeeds, so a
/// faulty sample leaves the next record's torque unaffected.
pub fn measure(sample: &Sample, engine: &mut KinematicsEngine) -> AppResult<MeasurementRecord> {
    let rate = estimate(sample)?;
    let time_s = sample.time_s();
    let dynamics = engine.compute(rate.omega, time_s);

    Ok(MeasurementRecord {
        count: sample.count,
        interval_ns: sample.interval_ns,
        rpm: rate.rpm,
        omega: rate.omega,
        torque: dynamics.torque,
        power: dynamics.power,
        time_s,
    })
}
