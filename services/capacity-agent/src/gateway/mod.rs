//! Resource gateway interface.
//!
//! The gateway is the agent's only view of the provider. It exposes the four
//! operations the orchestrator needs and reports failures in a shape the
//! classifier understands.

mod http;
mod signer;
mod waiter;

use std::time::Duration;

use async_trait::async_trait;
use capseek_reconcile::{
    CapacityProfile, Classify, Fault, FaultKind, LifecycleState, ResourceInstance, ResourceSpec,
};
use thiserror::Error;

pub use http::{regional_endpoint, HttpGateway, HttpGatewayConfig};
pub use signer::{ApiKeyCredentials, RequestSigner};
pub use waiter::{wait_for_running, WaitConfig};

/// Errors raised by gateway operations.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The provider rejected the request.
    #[error("provider returned {status} {code}: {message}")]
    Provider {
        status: u16,
        code: String,
        message: String,
    },

    /// The request never completed.
    #[error("request to provider failed: {0}")]
    Transport(String),

    /// The instance did not reach RUNNING within the wait budget.
    #[error("timed out after {elapsed:?} ({attempts} polls) waiting for {instance_id} to reach RUNNING")]
    WaitTimeout {
        instance_id: String,
        attempts: u32,
        elapsed: Duration,
    },

    /// The instance entered a state it cannot leave while we were waiting.
    #[error("instance {instance_id} entered {state} while waiting for RUNNING")]
    UnexpectedState {
        instance_id: String,
        state: LifecycleState,
    },

    /// The provider answered with something we could not interpret.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    /// The request could not be signed with the configured API key.
    #[error("failed to sign request: {0}")]
    Signing(String),
}

impl Classify for GatewayError {
    fn fault(&self) -> Fault<'_> {
        match self {
            Self::Provider {
                status,
                code,
                message,
            } => Fault::status(*status, Some(code.as_str()), message),
            Self::Transport(message) => Fault::new(FaultKind::Connection, message),
            Self::WaitTimeout { .. } => Fault::new(FaultKind::WaitTimeout, "wait timed out"),
            Self::UnexpectedState { .. } => {
                Fault::new(FaultKind::UnexpectedState, "unexpected lifecycle state")
            }
            Self::InvalidResponse(message) | Self::Signing(message) => {
                Fault::new(FaultKind::Other, message)
            }
        }
    }
}

/// Operations on the remote instance.
#[async_trait]
pub trait ResourceGateway: Send + Sync {
    /// Find the instance with this display name, ignoring terminated ones.
    async fn list_active(
        &self,
        display_name: &str,
    ) -> Result<Option<ResourceInstance>, GatewayError>;

    /// Launch a new instance at the initial profile.
    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceInstance, GatewayError>;

    /// Resize an instance. The instance must be RUNNING.
    async fn update(
        &self,
        instance_id: &str,
        target: &CapacityProfile,
    ) -> Result<(), GatewayError>;

    /// Block until the instance reports RUNNING, within a bounded budget.
    async fn wait_until_running(&self, instance_id: &str) -> Result<(), GatewayError>;
}
