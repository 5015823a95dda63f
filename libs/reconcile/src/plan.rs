//! Decide what a single reconciliation tick should do.

use crate::model::{CapacityProfile, LifecycleState, ResourceInstance};

/// The one action a tick takes toward the desired state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No active instance exists: launch one at the initial profile, then
    /// upgrade it.
    Create,

    /// The instance is running below target: resize it.
    Upgrade { instance_id: String },

    /// The instance already has the final profile.
    Converged { instance_id: String },

    /// The instance is below target but not running yet; the provider rejects
    /// shape changes in this state, so wait for a later tick.
    Defer {
        instance_id: String,
        state: LifecycleState,
    },
}

impl Action {
    /// Returns true if the action issues a mutating provider request.
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::Upgrade { .. })
    }
}

/// Plan the next action from the observed instance and the final profile.
///
/// `observed` must already exclude terminated instances.
pub fn plan(observed: Option<&ResourceInstance>, target: &CapacityProfile) -> Action {
    let Some(instance) = observed else {
        return Action::Create;
    };

    if instance.has_profile(target) {
        return Action::Converged {
            instance_id: instance.id.clone(),
        };
    }

    if instance.state == LifecycleState::Running {
        Action::Upgrade {
            instance_id: instance.id.clone(),
        }
    } else {
        Action::Defer {
            instance_id: instance.id.clone(),
            state: instance.state,
        }
    }
}
