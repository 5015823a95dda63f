//! Retry scheduling for the reconcile loop.
//!
//! Provides:
//! - `Scheduler`: arms one timer per check from the retry policy
//! - `ArmedTimer`: a one-shot timer that shutdown can cancel
//! - `ReconcileWorker`: the loop that alternates checks and timers

mod timer;
mod worker;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use capseek_reconcile::RetryPolicy;
use tracing::info;

use ninelives::Sleeper;

pub use timer::{ArmedTimer, TimerOutcome};
pub use worker::{FatalPolicy, ReconcileWorker, TickResult, WorkerExit};

/// Arms the timer that separates consecutive checks.
pub struct Scheduler {
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    armed: u64,
}

impl Scheduler {
    /// Create a new scheduler.
    pub fn new(policy: RetryPolicy, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            policy,
            sleeper,
            armed: 0,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Arm the timer for the next check.
    pub fn schedule_next(&mut self) -> ArmedTimer {
        let delay = self.policy.compute_delay();
        self.armed += 1;
        info!(delay_secs = delay.as_secs(), "Next check scheduled");
        ArmedTimer::new(delay, self.sleep_future(delay))
    }

    /// Arm the one-off delay before the first check, if startup jitter is on.
    pub fn startup_timer(&self) -> Option<ArmedTimer> {
        self.policy.startup_jitter()?;
        let delay = self.policy.startup_delay();
        info!(delay_secs = delay.as_secs(), "Delaying first check");
        Some(ArmedTimer::new(delay, self.sleep_future(delay)))
    }

    /// An owned sleep future for `delay`, detached from `&self`.
    fn sleep_future(&self, delay: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let sleeper = Arc::clone(&self.sleeper);
        Box::pin(async move { sleeper.sleep(delay).await })
    }

    /// Number of check timers armed so far. The startup timer is not counted.
    pub fn armed_count(&self) -> u64 {
        self.armed
    }
}
