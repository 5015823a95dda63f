//! Desired and observed resource state.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A compute shape plus the capacity allocated to it.
///
/// Equality compares the numeric capacity only. The provider reports the
/// shape name back verbatim, but two profiles with the same OCPU and memory
/// allocation are interchangeable for convergence purposes.
#[derive(Debug, Clone)]
pub struct CapacityProfile {
    /// Provider shape name (e.g. `VM.Standard.A1.Flex`).
    pub shape: String,

    /// Processing units.
    pub ocpus: f64,

    /// Memory in gigabytes.
    pub memory_gb: f64,
}

impl CapacityProfile {
    /// Create a new capacity profile.
    pub fn new(shape: impl Into<String>, ocpus: f64, memory_gb: f64) -> Self {
        Self {
            shape: shape.into(),
            ocpus,
            memory_gb,
        }
    }
}

impl PartialEq for CapacityProfile {
    fn eq(&self, other: &Self) -> bool {
        self.ocpus == other.ocpus && self.memory_gb == other.memory_gb
    }
}

impl fmt::Display for CapacityProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} OCPU, {} GB)",
            self.shape, self.ocpus, self.memory_gb
        )
    }
}

/// Lifecycle state of a remote instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    /// Being created by the provider.
    Provisioning,

    /// Up and accepting shape changes.
    Running,

    /// In a transition that is neither running nor gone (resize, start, stop).
    Upgrading,

    /// Being torn down.
    Terminating,

    /// Gone.
    Terminated,

    /// The provider gave up on the instance.
    Failed,
}

impl LifecycleState {
    /// Provider wire name for this state.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Running => "RUNNING",
            Self::Upgrading => "UPGRADING",
            Self::Terminating => "TERMINATING",
            Self::Terminated => "TERMINATED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns false for states that count as absent during lookup.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Terminating | Self::Terminated)
    }

    /// Returns true if the instance can never reach `Running` again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminating | Self::Terminated | Self::Failed)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when the provider reports a lifecycle state we do not know.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown lifecycle state: {0}")]
pub struct UnknownLifecycleState(pub String);

impl FromStr for LifecycleState {
    type Err = UnknownLifecycleState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROVISIONING" => Ok(Self::Provisioning),
            "RUNNING" => Ok(Self::Running),
            // Transitional provider states: not Running, but not gone either.
            "UPGRADING" | "STARTING" | "STOPPING" | "STOPPED" | "MOVING" | "CREATING_IMAGE" => {
                Ok(Self::Upgrading)
            }
            "TERMINATING" => Ok(Self::Terminating),
            "TERMINATED" => Ok(Self::Terminated),
            "FAILED" => Ok(Self::Failed),
            _ => Err(UnknownLifecycleState(s.to_string())),
        }
    }
}

/// A remote instance as last reported by the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceInstance {
    /// Provider-assigned identifier.
    pub id: String,

    /// Display name (the lookup key).
    pub display_name: String,

    /// Current lifecycle state.
    pub state: LifecycleState,

    /// Observed capacity; absent when the provider omits shape configuration.
    pub profile: Option<CapacityProfile>,
}

impl ResourceInstance {
    /// Returns true if this instance counts as present.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Returns true if the observed capacity matches `target`.
    pub fn has_profile(&self, target: &CapacityProfile) -> bool {
        self.profile.as_ref() == Some(target)
    }
}

/// Pick the instance that counts as present, skipping terminated ones.
pub fn select_active<I>(instances: I) -> Option<ResourceInstance>
where
    I: IntoIterator<Item = ResourceInstance>,
{
    instances.into_iter().find(ResourceInstance::is_active)
}

/// Desired end state for the managed instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceSpec {
    /// Display name used to find the instance.
    pub display_name: String,

    /// Capacity requested at launch. Kept small to improve the odds of the
    /// provider accepting the request.
    pub initial_profile: CapacityProfile,

    /// Capacity the instance is resized to once it is running.
    pub final_profile: CapacityProfile,

    /// Boot image reference.
    pub image_id: String,

    /// Subnet the primary VNIC attaches to.
    pub subnet_id: String,

    /// Compartment that owns the instance.
    pub compartment_id: String,

    /// Availability domain to launch in.
    pub availability_domain: String,

    /// Public key installed for SSH access.
    pub ssh_public_key: Option<String>,

    /// Whether the primary VNIC gets a public IP.
    pub assign_public_ip: bool,
}
