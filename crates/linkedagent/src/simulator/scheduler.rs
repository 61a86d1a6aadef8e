//! Periodic simulator driver.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::simulator::ProgressSimulator;

/// Runs [`ProgressSimulator::tick`] on a fixed interval until stopped.
pub struct SimulatorScheduler {
    simulator: Arc<ProgressSimulator>,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    wake: Arc<Notify>,
}

impl SimulatorScheduler {
    pub fn new(simulator: Arc<ProgressSimulator>, interval: Duration) -> Self {
        Self {
            simulator,
            interval: interval.max(Duration::from_millis(1)),
            shutdown: Arc::new(AtomicBool::new(false)),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Starts the tick loop on the current tokio runtime.
    pub fn start(&self) -> JoinHandle<()> {
        let simulator = Arc::clone(&self.simulator);
        let shutdown = Arc::clone(&self.shutdown);
        let wake = Arc::clone(&self.wake);
        let period = self.interval;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(period);
            interval_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval_timer.tick().await; // skip immediate first tick

            log::info!("Simulator started, ticking every {}ms", period.as_millis());
            loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                tokio::select! {
                    _ = interval_timer.tick() => {},
                    _ = wake.notified() => {},
                }

                if shutdown.load(Ordering::Acquire) {
                    break;
                }

                simulator.tick();
            }
            log::info!("Simulator stopped");
        })
    }

    /// Signals the loop to exit. No tick starts after this returns.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
