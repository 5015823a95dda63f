//! Bounded wait for an instance to reach RUNNING.

use std::future::Future;
use std::time::Duration;

use capseek_reconcile::{classify_error, FailureClass, LifecycleState};
use ninelives::{Backoff, Sleeper};
use tracing::{debug, warn};

use super::GatewayError;

/// Polling budget for [`wait_for_running`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitConfig {
    /// Delay before the second poll; doubles on each subsequent poll.
    pub initial_delay: Duration,

    /// Cap on the delay between polls.
    pub max_delay: Duration,

    /// Maximum number of polls.
    pub max_attempts: u32,

    /// Maximum total time spent waiting.
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            max_attempts: 120,
            timeout: Duration::from_secs(20 * 60),
        }
    }
}

impl WaitConfig {
    /// Capped exponential backoff between polls. A cap below the initial
    /// delay degrades to polling at the cap.
    fn backoff(&self) -> Backoff {
        Backoff::exponential(self.initial_delay)
            .with_max(self.max_delay)
            .map(Backoff::from)
            .unwrap_or_else(|_| Backoff::constant(self.max_delay).into())
    }
}

/// Poll `poll` until it reports RUNNING.
///
/// Terminal states abort the wait. Poll failures that classify as retryable
/// are absorbed into the budget; fatal ones are returned as-is.
pub async fn wait_for_running<F, Fut>(
    instance_id: &str,
    config: &WaitConfig,
    sleeper: &dyn Sleeper,
    mut poll: F,
) -> Result<(), GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<LifecycleState, GatewayError>>,
{
    let start = tokio::time::Instant::now();
    let backoff = config.backoff();
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    for attempt in 1..=max_attempts {
        attempts = attempt;
        match poll().await {
            Ok(LifecycleState::Running) => {
                debug!(instance_id, attempt, "Instance is RUNNING");
                return Ok(());
            }
            Ok(state) if state.is_terminal() => {
                return Err(GatewayError::UnexpectedState {
                    instance_id: instance_id.to_string(),
                    state,
                });
            }
            Ok(state) => {
                debug!(instance_id, attempt, state = %state, "Instance not RUNNING yet");
            }
            Err(e) if classify_error(&e) == FailureClass::Fatal => return Err(e),
            Err(e) => {
                warn!(instance_id, attempt, error = %e, "Polling instance state failed, will poll again");
            }
        }

        if attempt == max_attempts {
            break;
        }

        let delay = backoff.delay(attempt as usize);
        if start.elapsed() + delay > config.timeout {
            break;
        }
        sleeper.sleep(delay).await;
    }

    Err(GatewayError::WaitTimeout {
        instance_id: instance_id.to_string(),
        attempts,
        elapsed: start.elapsed(),
    })
}
