//! Simulated encoder for bench runs without hardware.
//!
//! Replays a smooth dyno run: a linear ramp to the top speed, a hold, a small
//! sinusoidal wobble and a little timing jitter. Seed the RNG to make a run
//! reproducible.

use std::f64::consts::TAU;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, error, info};

use crate::capture::{EdgeSink, PulseSource};
use crate::error::{AppResult, DynoError};

/// Thread name, visible in log output.
pub const SIM_THREAD_NAME: &str = "dyno-sim-encoder";

/// Speed profile of one simulated run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DynoRunProfile {
    /// Starting and minimum speed
    pub min_rpm: f64,
    /// Speed reached at the end of the ramp
    pub max_rpm: f64,
    /// Ramp length
    pub ramp_s: f64,
    /// Whole run length, after which the encoder stops pulsing
    pub total_s: f64,
    /// Relative amplitude of the wobble
    pub oscillation_amplitude: f64,
    /// Wobble frequency in Hz
    pub oscillation_hz: f64,
    /// Relative timing jitter bound
    pub jitter: f64,
    /// Longest gap between two pulses
    pub max_interval: Duration,
}

impl Default for DynoRunProfile {
    fn default() -> Self {
        Self {
            min_rpm: 100.0,
            max_rpm: 5000.0,
            ramp_s: 45.0,
            total_s: 60.0,
            oscillation_amplitude: 0.002,
            oscillation_hz: 0.3,
            jitter: 0.0005,
            max_interval: Duration::from_millis(100),
        }
    }
}

impl DynoRunProfile {
    /// Shortened profile with the same shape.
    pub fn with_duration(mut self, total_s: f64) -> Self {
        let ratio = self.ramp_s / self.total_s;
        self.total_s = total_s;
        self.ramp_s = total_s * ratio;
        self
    }

    /// Target speed `elapsed_s` seconds into the run, wobble included.
    pub fn target_rpm(&self, elapsed_s: f64) -> f64 {
        let base = if elapsed_s < self.ramp_s {
            self.min_rpm + (elapsed_s / self.ramp_s) * (self.max_rpm - self.min_rpm)
        } else {
            self.max_rpm
        };
        let wobble = self.oscillation_amplitude * (elapsed_s * TAU * self.oscillation_hz).sin();
        (base * (1.0 + wobble)).max(self.min_rpm)
    }

    /// Gap to the next pulse, given a jitter draw in `[-1, 1]`.
    pub fn pulse_interval(&self, elapsed_s: f64, jitter_unit: f64) -> Duration {
        let period_s = 60.0 / self.target_rpm(elapsed_s);
        let jittered = period_s * (1.0 + self.jitter * jitter_unit.clamp(-1.0, 1.0));
        Duration::from_secs_f64(jittered).min(self.max_interval)
    }
}

/// [`PulseSource`] driven by a [`DynoRunProfile`].
pub struct SimulatedEncoder {
    profile: DynoRunProfile,
    seed: Option<u64>,
    running: Arc<AtomicBool>,
    pulses: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedEncoder {
    /// An idle encoder; a `None` seed draws jitter from OS entropy.
    pub fn new(profile: DynoRunProfile, seed: Option<u64>) -> Self {
        Self {
            profile,
            seed,
            running: Arc::new(AtomicBool::new(false)),
            pulses: Arc::new(AtomicU64::new(0)),
            handle: None,
        }
    }

    /// Edges emitted so far.
    pub fn pulses_emitted(&self) -> u64 {
        self.pulses.load(Ordering::Relaxed)
    }

    /// Whether the profile is still playing.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl PulseSource for SimulatedEncoder {
    fn start(&mut self, sink: Arc<dyn EdgeSink>) -> AppResult<()> {
        if self.handle.is_some() {
            return Err(DynoError::PulseSource(
                "simulated encoder already started".to_string(),
            ));
        }

        self.running.store(true, Ordering::Release);
        let running = Arc::clone(&self.running);
        let pulses = Arc::clone(&self.pulses);
        let profile = self.profile;
        let mut rng = match self.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };

        let handle = thread::Builder::new()
            .name(SIM_THREAD_NAME.to_string())
            .spawn(move || {
                let started = Instant::now();
                while running.load(Ordering::Acquire) {
                    let elapsed_s = started.elapsed().as_secs_f64();
                    if elapsed_s >= profile.total_s {
                        debug!(elapsed_s, "Simulated run finished");
                        break;
                    }

                    sink.on_edge();
                    pulses.fetch_add(1, Ordering::Relaxed);

                    let jitter_unit: f64 = rng.gen_range(-1.0..=1.0);
                    thread::sleep(profile.pulse_interval(elapsed_s, jitter_unit));
                }
                running.store(false, Ordering::Release);
            })
            .map_err(|e| {
                error!(error = %e, "Failed to spawn simulated encoder");
                DynoError::ThreadSpawn(SIM_THREAD_NAME.to_string())
            })?;

        info!(
            max_rpm = self.profile.max_rpm,
            total_s = self.profile.total_s,
            seed = ?self.seed,
            "Simulated encoder started"
        );
        self.handle = Some(handle);
        Ok(())
    }

    fn stop(&mut self) -> AppResult<()> {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            handle
                .join()
                .map_err(|_| DynoError::PulseSource("simulated encoder panicked".to_string()))?;
            info!(pulses = self.pulses_emitted(), "Simulated encoder stopped");
        }
        Ok(())
    }
}

impl Drop for SimulatedEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!(error = %e, "Simulated encoder did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingSink(AtomicU64);

    impl EdgeSink for CountingSink {
        fn on_edge(&self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn profile_ramps_then_holds() {
        let profile = DynoRunProfile {
            oscillation_amplitude: 0.0,
            ..DynoRunProfile::default()
        };
        assert!((profile.target_rpm(0.0) - 100.0).abs() < 1e-9);
        assert!((profile.target_rpm(22.5) - 2550.0).abs() < 1e-9);
        assert!((profile.target_rpm(50.0) - 5000.0).abs() < 1e-9);
    }

    #[test]
    fn wobble_stays_within_amplitude() {
        let profile = DynoRunProfile::default();
        for i in 0..600 {
            let t = 45.0 + f64::from(i) * 0.025;
            let rpm = profile.target_rpm(t);
            assert!((rpm - 5000.0).abs() <= 5000.0 * 0.002 + 1e-9);
        }
    }

    #[test]
    fn interval_is_capped_and_jitter_bounded() {
        let profile = DynoRunProfile::default();
        // 100 rpm would be 600 ms between pulses
        assert_eq!(profile.pulse_interval(0.0, 0.0), Duration::from_millis(100));

        let nominal = 60.0 / profile.target_rpm(50.0);
        let high = profile.pulse_interval(50.0, 1.0).as_secs_f64();
        assert!((high / nominal - 1.0005).abs() < 1e-6);
    }

    #[test]
    fn with_duration_keeps_ramp_ratio() {
        let profile = DynoRunProfile::default().with_duration(6.0);
        assert!((profile.ramp_s - 4.5).abs() < 1e-12);
    }

    #[test]
    fn encoder_delivers_edges_until_stopped() {
        let profile = DynoRunProfile {
            min_rpm: 6000.0,
            max_rpm: 6000.0,
            ..DynoRunProfile::default()
        };
        let sink = Arc::new(CountingSink(AtomicU64::new(0)));
        let mut encoder = SimulatedEncoder::new(profile, Some(7));

        encoder.start(sink.clone()).unwrap();
        assert!(encoder.start(sink.clone()).is_err());
        thread::sleep(Duration::from_millis(100));
        encoder.stop().unwrap();

        let delivered = sink.0.load(Ordering::Relaxed);
        assert!(delivered > 0);
        assert_eq!(delivered, encoder.pulses_emitted());
        assert!(!encoder.is_running());
    }
}
