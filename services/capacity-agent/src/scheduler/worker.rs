//! Reconcile worker.
//!
//! Runs one check at a time. The next timer is armed only after the current
//! check has finished, whatever its outcome.

use tokio::sync::watch;
use tracing::{error, info, instrument, warn};

use super::{ArmedTimer, Scheduler, TimerOutcome};
use crate::orchestrator::{subjects, Orchestrator, TickOutcome};

/// What to do when checks keep failing fatally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FatalPolicy {
    /// Keep checking on the normal cadence.
    #[default]
    KeepRetrying,

    /// Stop after this many consecutive fatal checks.
    HaltAfter(u32),
}

impl FatalPolicy {
    fn should_halt(&self, consecutive_fatal: u32) -> bool {
        match self {
            Self::KeepRetrying => false,
            Self::HaltAfter(limit) => consecutive_fatal >= (*limit).max(1),
        }
    }
}

/// Why the worker stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Shutdown was requested.
    Shutdown,

    /// The fatal policy stopped the loop.
    Halted { consecutive_fatal: u32 },
}

/// Result of a single tick.
#[derive(Debug)]
pub struct TickResult {
    pub outcome: TickOutcome,

    /// Timer for the next check, or `None` if the loop should halt.
    pub next: Option<ArmedTimer>,
}

/// Alternates reconciliation checks with scheduler timers.
pub struct ReconcileWorker {
    orchestrator: Orchestrator,
    scheduler: Scheduler,
    fatal_policy: FatalPolicy,
    consecutive_fatal: u32,
}

impl ReconcileWorker {
    /// Create a new reconcile worker.
    pub fn new(orchestrator: Orchestrator, scheduler: Scheduler, fatal_policy: FatalPolicy) -> Self {
        Self {
            orchestrator,
            scheduler,
            fatal_policy,
            consecutive_fatal: 0,
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Run one check, then arm the timer for the next one.
    pub async fn tick(&mut self) -> TickResult {
        let outcome = self.orchestrator.run_check().await;

        if outcome.is_fatal() {
            self.consecutive_fatal += 1;
        } else {
            self.consecutive_fatal = 0;
        }

        if self.fatal_policy.should_halt(self.consecutive_fatal) {
            error!(
                consecutive_fatal = self.consecutive_fatal,
                "Too many consecutive fatal failures, halting"
            );
            self.orchestrator
                .notify(
                    subjects::HALTED,
                    &format!(
                        "Stopped after {} consecutive fatal failures. Fix the configuration and restart the agent.",
                        self.consecutive_fatal
                    ),
                )
                .await;
            return TickResult {
                outcome,
                next: None,
            };
        }

        TickResult {
            outcome,
            next: Some(self.scheduler.schedule_next()),
        }
    }

    /// Run until shutdown is signaled or the fatal policy halts the loop.
    ///
    /// A check that is already in flight when shutdown arrives runs to
    /// completion; only the pending timer is cancelled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> WorkerExit {
        let policy = self.scheduler.policy();
        info!(
            interval_secs = policy.base_interval().as_secs(),
            jitter_secs = policy.jitter_range().as_secs(),
            "Starting reconcile worker"
        );

        if let Some(timer) = self.scheduler.startup_timer() {
            if timer.wait(&mut shutdown).await == TimerOutcome::Cancelled {
                info!("Reconcile worker shutting down before first check");
                return WorkerExit::Shutdown;
            }
        }

        loop {
            if *shutdown.borrow() {
                info!("Reconcile worker shutting down");
                return WorkerExit::Shutdown;
            }

            let TickResult { next, .. } = self.tick().await;
            let Some(timer) = next else {
                warn!("Reconcile worker halted by fatal policy");
                return WorkerExit::Halted {
                    consecutive_fatal: self.consecutive_fatal,
                };
            };

            if timer.wait(&mut shutdown).await == TimerOutcome::Cancelled {
                info!("Reconcile worker shutting down, pending check cancelled");
                return WorkerExit::Shutdown;
            }
        }
    }
}
