//! Background jobs.
//!
//! Each job runs in one loop driven by `run_periodic`, so a slow pass delays
//! the next tick instead of overlapping it. `SingleFlight` additionally guards
//! `run_once` against callers outside the loop.

pub mod scoring;
pub mod unread_notifications;

pub use scoring::{ScoringJob, ScoringStats};
pub use unread_notifications::{NotificationStats, UnreadNotificationJob};

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Tick `task` every `period` (first tick immediately) until `shutdown` flips
/// to `true` or its sender is dropped.
pub async fn run_periodic<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut task: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let period = period.max(MIN_PERIOD);
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tracing::info!(job = name, period_secs = period.as_secs(), "job started");

    loop {
        tokio::select! {
            _ = interval.tick() => task().await,
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    tracing::info!(job = name, "job stopped");
}

#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

/// Held while a pass is in progress; releases the flight on drop.
pub struct FlightPermit<'a> {
    running: &'a AtomicBool,
}

impl SingleFlight {
    pub fn try_enter(&self) -> Option<FlightPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                running: &self.running,
            })
    }
}

impl Drop for FlightPermit<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
