//! One reconciliation check against the provider.
//!
//! Each check rehydrates the instance from the provider, plans a single
//! action, executes it and classifies whatever went wrong. Nothing observed
//! is carried over to the next check.

use std::fmt;
use std::sync::Arc;

use capseek_reconcile::{
    classify_error, plan, Action, AttemptCounter, FailureClass, LifecycleState, ResourceInstance,
    ResourceSpec,
};
use tracing::{error, info, instrument, warn};

use crate::gateway::{GatewayError, ResourceGateway};
use crate::notifier::Notifier;

/// Notification subjects.
pub mod subjects {
    pub const CREATED: &str = "capseek: instance created (initial shape)";
    pub const UPGRADED: &str = "capseek: instance upgraded (final shape)";
    pub const FAILED: &str = "capseek: reconciliation FAILED";
    pub const HALTED: &str = "capseek: agent halted";
}

/// Which part of a check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Lookup,
    Create,
    Upgrade,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Create => "create",
            Self::Upgrade => "upgrade",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a check ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Already at the final profile; nothing was done.
    Converged { instance_id: String },

    /// Below target but not running; left alone this time.
    Deferred {
        instance_id: String,
        state: LifecycleState,
    },

    /// An existing instance was resized to the final profile.
    Upgraded { instance_id: String },

    /// A new instance was launched and resized to the final profile.
    Provisioned { instance_id: String },

    /// A step failed.
    Failed { step: Step, class: FailureClass },
}

impl TickOutcome {
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Failed {
                class: FailureClass::Fatal,
                ..
            }
        )
    }
}

/// Drives the managed instance toward its final profile, one check at a time.
pub struct Orchestrator {
    spec: Arc<ResourceSpec>,
    gateway: Arc<dyn ResourceGateway>,
    notifier: Arc<dyn Notifier>,
    attempts: AttemptCounter,
}

impl Orchestrator {
    /// Create a new orchestrator.
    pub fn new(
        spec: Arc<ResourceSpec>,
        gateway: Arc<dyn ResourceGateway>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            spec,
            gateway,
            notifier,
            attempts: AttemptCounter::default(),
        }
    }

    /// Number of checks started so far.
    pub fn attempts(&self) -> u64 {
        self.attempts.get()
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Run one check. Failures are classified and reported here; this never
    /// returns an error.
    #[instrument(skip(self), fields(display_name = %self.spec.display_name))]
    pub async fn run_check(&mut self) -> TickOutcome {
        let attempt = self.attempts.advance();
        info!(attempt, "Checking instance");

        // A retryable lookup failure counts as "nothing found"; only a fatal
        // one ends the check before planning.
        let observed = match self.gateway.list_active(&self.spec.display_name).await {
            Ok(observed) => observed,
            Err(e) if classify_error(&e) == FailureClass::Fatal => {
                return self.fail(Step::Lookup, &e).await;
            }
            Err(e) => {
                warn!(error = %e, "Lookup failed, treating the instance as absent");
                None
            }
        };

        match plan(observed.as_ref(), &self.spec.final_profile) {
            Action::Converged { instance_id } => {
                info!(instance_id = %instance_id, "Instance is at its final profile, nothing to do");
                TickOutcome::Converged { instance_id }
            }
            Action::Defer { instance_id, state } => {
                info!(
                    instance_id = %instance_id,
                    state = %state,
                    "Instance is below target but not RUNNING, waiting for a later check"
                );
                TickOutcome::Deferred { instance_id, state }
            }
            Action::Upgrade { instance_id } => match self.upgrade(&instance_id).await {
                Ok(()) => TickOutcome::Upgraded { instance_id },
                Err(e) => self.fail(Step::Upgrade, &e).await,
            },
            Action::Create => {
                let instance = match self.create().await {
                    Ok(instance) => instance,
                    Err(e) => return self.fail(Step::Create, &e).await,
                };
                match self.upgrade(&instance.id).await {
                    Ok(()) => TickOutcome::Provisioned {
                        instance_id: instance.id,
                    },
                    Err(e) => self.fail(Step::Upgrade, &e).await,
                }
            }
        }
    }

    /// Launch at the initial profile and wait for RUNNING.
    async fn create(&self) -> Result<ResourceInstance, GatewayError> {
        info!(profile = %self.spec.initial_profile, "No active instance, launching");

        let instance = self.gateway.create(&self.spec).await?;
        info!(instance_id = %instance.id, "Launch accepted, waiting for RUNNING");

        self.gateway.wait_until_running(&instance.id).await?;
        info!(instance_id = %instance.id, "Instance is RUNNING at its initial profile");

        self.notify(
            subjects::CREATED,
            &format!(
                "Instance {} created and RUNNING.\nID: {}\nProfile: {}",
                self.spec.display_name, instance.id, self.spec.initial_profile
            ),
        )
        .await;

        Ok(instance)
    }

    /// Resize to the final profile and wait for RUNNING.
    async fn upgrade(&self, instance_id: &str) -> Result<(), GatewayError> {
        let target = &self.spec.final_profile;
        info!(instance_id, profile = %target, "Upgrading instance");

        self.gateway.update(instance_id, target).await?;
        self.gateway.wait_until_running(instance_id).await?;
        info!(instance_id, "Upgrade complete");

        self.notify(
            subjects::UPGRADED,
            &format!("Instance {instance_id} upgraded to {target}."),
        )
        .await;

        Ok(())
    }

    async fn fail(&self, step: Step, e: &GatewayError) -> TickOutcome {
        let class = classify_error(e);
        match class {
            FailureClass::CapacityExhausted => {
                warn!(step = %step, error = %e, "No capacity available, will retry");
            }
            FailureClass::TransientProviderError => {
                warn!(step = %step, error = %e, "Provider error, will retry");
            }
            FailureClass::Fatal => {
                error!(step = %step, error = %e, "Reconciliation failed");
            }
        }

        if class.should_notify() {
            self.notify(
                subjects::FAILED,
                &format!(
                    "Reconciliation of {} failed during {step}.\n\n{e}\n\nDetail: {e:?}",
                    self.spec.display_name
                ),
            )
            .await;
        }

        TickOutcome::Failed { step, class }
    }

    /// Send a message through the configured notifier.
    pub async fn notify(&self, subject: &str, body: &str) {
        self.notifier.send(subject, body).await;
    }
}
