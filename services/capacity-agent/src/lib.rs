//! capseek capacity agent library.
//!
//! Keeps one compute instance alive at a target capacity on a provider whose
//! capacity pool is routinely exhausted. The agent checks on a jittered
//! cadence, launches at a small profile when nothing exists, resizes to the
//! final profile once the instance is running, and only alerts the operator
//! for failures that need a human.

pub mod api;
pub mod config;
pub mod gateway;
pub mod notifier;
pub mod orchestrator;
pub mod scheduler;
