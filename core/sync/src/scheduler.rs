//! Periodic auto-sync ticker.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Periods are clamped to this so the first deadline is representable.
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// What the tick callback wants the timer to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// The owner is gone; stop ticking.
    Stop,
}

/// Owned periodic timer driving automatic sync cycles.
///
/// The first tick fires one full period after start. Ticks that fall due
/// while a callback is still running are skipped, not queued. Stopping (or
/// dropping) the timer cancels any pending tick; a callback already running
/// is allowed to finish.
pub struct AutoSyncTimer {
    period: Duration,
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AutoSyncTimer {
    /// Spawn the timer on the current tokio runtime.
    pub fn start<F, Fut>(period: Duration, on_tick: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let period = period.min(MAX_PERIOD);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!("Auto-sync timer started ({:?})", period);

            loop {
                tokio::select! {
                    biased;
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        debug!("Auto-sync tick");
                        if on_tick().await == TickOutcome::Stop {
                            break;
                        }
                    }
                }
            }

            debug!("Auto-sync timer stopped");
        });

        Self {
            period,
            token,
            task: Some(task),
        }
    }

    /// Tick period.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether the timer task is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().map(|t| !t.is_finished()).unwrap_or(false)
    }

    /// Cancel pending ticks.
    pub fn stop(&mut self) {
        self.token.cancel();
        self.task = None;
    }

    /// Cancel pending ticks and wait for a running callback to finish.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for AutoSyncTimer {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
