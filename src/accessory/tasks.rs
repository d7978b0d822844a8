//! Cancellable scheduled tasks.
//!
//! The accessory runs two timers: a one-shot identity fetch and the recurring
//! poll. Both are started through here so shutdown has a handle to cancel.

use log::{debug, error, warn};
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Shortest period [`spawn_interval`] will schedule.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

/// Handle to a scheduled activity.
///
/// Dropping the handle leaves the task running; only [`TaskHandle::stop`]
/// cancels it.
pub struct TaskHandle {
    name: &'static str,
    token: CancellationToken,
    handle: JoinHandle<()>,
    in_flight: TaskTracker,
}

impl TaskHandle {
    /// Stop scheduling new runs. Runs already in flight finish on their own.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Number of runs currently executing.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Wait for the scheduler and every in-flight run to finish.
    ///
    /// Returns `false` when the scheduler itself died instead of stopping.
    pub async fn join(self) -> bool {
        let clean = match self.handle.await {
            Ok(()) => true,
            Err(e) => {
                error!("{} timer terminated abnormally: {}", self.name, e);
                false
            }
        };
        self.in_flight.close();
        self.in_flight.wait().await;
        clean
    }
}

/// Run `tick` every `period`, first run one period from now.
///
/// Each run is spawned on its own, so a run slower than `period` overlaps
/// the next one. Callers writing shared state must tolerate that. A period
/// below [`MIN_PERIOD`] is raised to it.
pub fn spawn_interval<F, Fut>(name: &'static str, period: Duration, tick: F) -> TaskHandle
where
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = if period < MIN_PERIOD {
        warn!(
            "{} period {:?} is too short, using {:?}",
            name, period, MIN_PERIOD
        );
        MIN_PERIOD
    } else {
        period
    };

    let token = CancellationToken::new();
    let in_flight = TaskTracker::new();

    let cancelled = token.clone();
    let tracker = in_flight.clone();
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancelled.cancelled() => break,
                _ = interval.tick() => {
                    tracker.spawn(tick());
                }
            }
        }
        debug!("{} timer stopped", name);
    });

    TaskHandle {
        name,
        token,
        handle,
        in_flight,
    }
}

/// Run `task` once after `delay`, unless stopped first.
pub fn spawn_delayed<F, Fut>(name: &'static str, delay: Duration, task: F) -> TaskHandle
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let token = CancellationToken::new();
    let in_flight = TaskTracker::new();

    let cancelled = token.clone();
    let tracker = in_flight.clone();
    let handle = tokio::spawn(async move {
        tokio::select! {
            _ = cancelled.cancelled() => {
                debug!("{} cancelled before it ran", name);
            }
            _ = tokio::time::sleep(delay) => {
                tracker.spawn(task());
            }
        }
    });

    TaskHandle {
        name,
        token,
        handle,
        in_flight,
    }
}
