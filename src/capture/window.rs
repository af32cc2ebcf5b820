//! Background timer closing counting windows.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, trace};

use crate::capture::filter::WindowCounter;
use crate::capture::Clock;
use crate::error::{AppResult, DynoError};
use crate::queue::SampleQueue;

/// Longest single sleep, so a stop request is seen promptly.
const MAX_POLL: Duration = Duration::from_millis(20);

/// Thread name, visible in log output.
pub const WINDOW_THREAD_NAME: &str = "dyno-window";

/// Fires at every window boundary and enqueues the closed window's sample.
pub struct WindowTimer {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WindowTimer {
    /// Spawn the timer thread.
    pub fn spawn(
        counter: Arc<WindowCounter>,
        clock: Arc<dyn Clock>,
        queue: Arc<SampleQueue>,
    ) -> AppResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);
        let window_ns = counter.window_size_ns();

        let handle = thread::Builder::new()
            .name(WINDOW_THREAD_NAME.to_string())
            .spawn(move || {
                debug!(window_ns, "Window timer started");
                while flag.load(Ordering::Acquire) {
                    let now_ns = clock.now_ns();
                    let elapsed = now_ns.saturating_sub(counter.window_start_ns());

                    if elapsed >= window_ns {
                        if let Some(sample) = counter.close_window(now_ns) {
                            trace!(pulses = sample.count, elapsed_ns = sample.interval_ns, "Window closed");
                            queue.push(sample);
                        }
                        continue;
                    }

                    let remaining = Duration::from_nanos(window_ns - elapsed);
                    thread::sleep(remaining.min(MAX_POLL));
                }
                debug!("Window timer exiting");
            })
            .map_err(|e| {
                error!(error = %e, "Failed to spawn window timer");
                DynoError::ThreadSpawn(WINDOW_THREAD_NAME.to_string())
            })?;

        info!(window_ns, "Started window timer");
        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Whether the thread is still meant to run.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop and join the timer thread. The open window is abandoned.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.join() {
                error!("Window timer thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for WindowTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::ManualClock;

    #[test]
    fn closes_window_when_clock_crosses_boundary() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = Arc::new(SampleQueue::unbounded());
        let counter = Arc::new(WindowCounter::new(500_000_000, 0));

        let mut timer =
            WindowTimer::spawn(counter.clone(), clock.clone(), queue.clone()).unwrap();

        for _ in 0..42 {
            counter.on_edge();
        }
        clock.advance(500_000_000);

        let sample = queue.pop_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(sample.count, 42);
        assert_eq!(sample.interval_ns, 500_000_000);

        timer.stop();
        assert!(!timer.is_running());
    }

    #[test]
    fn dropping_timer_stops_thread() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = Arc::new(SampleQueue::unbounded());
        let counter = Arc::new(WindowCounter::new(1_000, 0));

        let timer = WindowTimer::spawn(counter.clone(), clock.clone(), queue.clone()).unwrap();
        drop(timer);

        counter.on_edge();
        clock.advance(10_000);
        assert!(queue.pop_timeout(Duration::from_millis(100)).is_none());
        assert_eq!(counter.pending_pulses(), 1);
    }

    #[test]
    fn idle_windows_emit_nothing() {
        let clock = Arc::new(ManualClock::new(0));
        let queue = Arc::new(SampleQueue::unbounded());
        let counter = Arc::new(WindowCounter::new(1_000, 0));

        let mut timer =
            WindowTimer::spawn(counter.clone(), clock.clone(), queue.clone()).unwrap();
        clock.advance(10_000);

        assert!(queue.pop_timeout(Duration::from_millis(100)).is_none());
        timer.stop();
    }
}
