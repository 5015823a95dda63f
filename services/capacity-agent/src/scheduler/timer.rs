//! One-shot cancellable timer.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::watch;

/// How an armed timer finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    Fired,
    Cancelled,
}

/// A timer armed for a single delay.
///
/// Consumed by [`ArmedTimer::wait`], so it fires at most once.
pub struct ArmedTimer {
    delay: Duration,
    sleep: Pin<Box<dyn Future<Output = ()> + Send>>,
}

impl ArmedTimer {
    pub fn new(delay: Duration, sleep: Pin<Box<dyn Future<Output = ()> + Send>>) -> Self {
        Self { delay, sleep }
    }

    /// The delay this timer was armed with.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Wait for the timer, or for `shutdown` to flip to true.
    ///
    /// If the shutdown sender goes away the timer simply runs to completion.
    pub async fn wait(self, shutdown: &mut watch::Receiver<bool>) -> TimerOutcome {
        if *shutdown.borrow() {
            return TimerOutcome::Cancelled;
        }

        let mut sleep = self.sleep;
        loop {
            tokio::select! {
                _ = &mut sleep => return TimerOutcome::Fired,
                changed = shutdown.changed() => match changed {
                    Ok(()) if *shutdown.borrow() => return TimerOutcome::Cancelled,
                    Ok(()) => continue,
                    Err(_) => {
                        sleep.await;
                        return TimerOutcome::Fired;
                    }
                },
            }
        }
    }
}

impl fmt::Debug for ArmedTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArmedTimer")
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}
