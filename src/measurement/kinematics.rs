//! Torque and power by numeric differentiation of ω.

/// Torque and power for one record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dynamics {
    /// N·m
    pub torque: f64,
    /// W
    pub power: f64,
}

/// Differentiates angular velocity across consecutive records.
///
/// Holds the `(ω, t)` of the previous record. Without a previous record, or
/// when time did not advance, torque is zero. Negative values are returned
/// as-is; deceleration is a legitimate measurement.
#[derive(Debug, Clone)]
pub struct KinematicsEngine {
    moment_of_inertia: f64,
    prev: Option<(f64, f64)>,
}

impl KinematicsEngine {
    /// Create an engine for a rotating mass of `moment_of_inertia` kg·m².
    pub fn new(moment_of_inertia: f64) -> Self {
        Self {
            moment_of_inertia,
            prev: None,
        }
    }

    /// Moment of inertia in kg·m².
    pub fn moment_of_inertia(&self) -> f64 {
        self.moment_of_inertia
    }

    /// Compute torque and power for `omega` at `time_s`, then retain both as
    /// the reference for the next call.
    pub fn compute(&mut self, omega: f64, time_s: f64) -> Dynamics {
        let torque = match self.prev {
            Some((prev_omega, prev_time_s)) => {
                let delta_t = time_s - prev_time_s;
                if delta_t > 0.0 {
                    self.moment_of_inertia * (omega - prev_omega) / delta_t
                } else {
                    0.0
                }
            }
            None => 0.0,
        };

        self.prev = Some((omega, time_s));

        Dynamics {
            torque,
            power: torque * omega,
        }
    }

    /// Forget the previous record; the next one starts a new session.
    pub fn reset(&mut self) {
        self.prev = None;
    }

    /// Whether a previous record is retained.
    pub fn has_previous(&self) -> bool {
        self.prev.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::TAU;

    const INERTIA: f64 = 0.038;

    #[test]
    fn first_record_has_zero_torque_and_power() {
        let mut engine = KinematicsEngine::new(INERTIA);
        let dynamics = engine.compute(TAU * 100.0, 0.01);
        assert_eq!(dynamics.torque, 0.0);
        assert_eq!(dynamics.power, 0.0);
        assert!(engine.has_previous());
    }

    #[test]
    fn acceleration_gives_positive_torque() {
        let mut engine = KinematicsEngine::new(INERTIA);
        engine.compute(100.0, 1.0);
        let dynamics = engine.compute(110.0, 1.5);

        let expected_torque = INERTIA * 10.0 / 0.5;
        assert!((dynamics.torque - expected_torque).abs() < 1e-12);
        assert!((dynamics.power - expected_torque * 110.0).abs() < 1e-9);
    }

    #[test]
    fn deceleration_is_preserved_as_negative() {
        let mut engine = KinematicsEngine::new(INERTIA);
        engine.compute(200.0, 2.0);
        let dynamics = engine.compute(150.0, 2.1);

        assert!(dynamics.torque < 0.0);
        assert!(dynamics.power < 0.0);
    }

    #[test]
    fn non_advancing_time_gives_zero_torque() {
        let mut engine = KinematicsEngine::new(INERTIA);
        engine.compute(100.0, 3.0);
        let dynamics = engine.compute(500.0, 3.0);
        assert_eq!(dynamics.torque, 0.0);
        assert_eq!(dynamics.power, 0.0);
    }

    #[test]
    fn reset_forgets_previous_record() {
        let mut engine = KinematicsEngine::new(INERTIA);
        engine.compute(100.0, 1.0);
        engine.reset();
        assert!(!engine.has_previous());

        let dynamics = engine.compute(400.0, 1.2);
        assert_eq!(dynamics.torque, 0.0);
    }
}
