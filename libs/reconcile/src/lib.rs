//! Reconciliation primitives for keeping one compute instance alive at a
//! target capacity.
//!
//! This library holds the decision-making half of capseek. It performs no I/O
//! and never sleeps; the agent feeds it observed state and provider failures
//! and acts on what it returns. Key concepts:
//!
//! - **Desired state**: a [`ResourceSpec`] loaded once at startup.
//! - **Observed state**: a [`ResourceInstance`] rehydrated from the provider on
//!   every tick.
//! - **Plan**: the single [`Action`] that moves observed toward desired.
//! - **Classification**: mapping a provider [`Fault`] to a [`FailureClass`]
//!   that decides whether the operator hears about it.
//! - **Pacing**: a flat [`RetryPolicy`] with bounded jitter and a hard floor.
//!
//! # Invariants
//!
//! - Planning is deterministic given the same inputs
//! - Instances in `Terminated`/`Terminating` are never considered present
//! - A computed retry delay is never below [`MIN_FLOOR`]

mod classify;
mod model;
mod plan;
mod retry;

pub use classify::{
    classify, classify_error, Classify, FailureClass, Fault, FaultKind, CAPACITY_SIGNATURES,
};
pub use model::{
    select_active, CapacityProfile, LifecycleState, ResourceInstance, ResourceSpec,
    UnknownLifecycleState,
};
pub use plan::{plan, Action};
pub use retry::{
    AttemptCounter, RetryPolicy, DEFAULT_BASE_INTERVAL, DEFAULT_JITTER_RANGE, MIN_FLOOR,
};
