//! Shared fakes for the capacity agent integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use capseek_agent::gateway::{GatewayError, ResourceGateway};
use capseek_agent::notifier::Notifier;
use capseek_reconcile::{CapacityProfile, LifecycleState, ResourceInstance, ResourceSpec};

/// A gateway call, in the order it was made.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    List(String),
    Create(String),
    Update(String, CapacityProfile),
    Wait(String),
}

#[derive(Default)]
struct Script {
    list: VecDeque<Result<Option<ResourceInstance>, GatewayError>>,
    create: VecDeque<Result<ResourceInstance, GatewayError>>,
    update: VecDeque<Result<(), GatewayError>>,
    wait: VecDeque<Result<(), GatewayError>>,
}

/// Gateway that replays scripted responses and records every call.
///
/// Unscripted calls succeed: list finds nothing, create returns a
/// provisioning instance with id `i-new`, update and wait return `Ok`.
#[derive(Clone, Default)]
pub struct FakeGateway {
    calls: Arc<Mutex<Vec<Call>>>,
    script: Arc<Mutex<Script>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_list(&self, result: Result<Option<ResourceInstance>, GatewayError>) -> &Self {
        self.script.lock().unwrap().list.push_back(result);
        self
    }

    pub fn on_create(&self, result: Result<ResourceInstance, GatewayError>) -> &Self {
        self.script.lock().unwrap().create.push_back(result);
        self
    }

    pub fn on_update(&self, result: Result<(), GatewayError>) -> &Self {
        self.script.lock().unwrap().update.push_back(result);
        self
    }

    pub fn on_wait(&self, result: Result<(), GatewayError>) -> &Self {
        self.script.lock().unwrap().wait.push_back(result);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn creates(&self) -> usize {
        self.count(|c| matches!(c, Call::Create(_)))
    }

    pub fn updates(&self) -> usize {
        self.count(|c| matches!(c, Call::Update(..)))
    }

    fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| f(c)).count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl ResourceGateway for FakeGateway {
    async fn list_active(
        &self,
        display_name: &str,
    ) -> Result<Option<ResourceInstance>, GatewayError> {
        self.record(Call::List(display_name.to_string()));
        self.script
            .lock()
            .unwrap()
            .list
            .pop_front()
            .unwrap_or(Ok(None))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceInstance, GatewayError> {
        self.record(Call::Create(spec.display_name.clone()));
        self.script
            .lock()
            .unwrap()
            .create
            .pop_front()
            .unwrap_or_else(|| {
                Ok(instance(
                    "i-new",
                    LifecycleState::Provisioning,
                    Some(spec.initial_profile.clone()),
                ))
            })
    }

    async fn update(
        &self,
        instance_id: &str,
        target: &CapacityProfile,
    ) -> Result<(), GatewayError> {
        self.record(Call::Update(instance_id.to_string(), target.clone()));
        self.script
            .lock()
            .unwrap()
            .update
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn wait_until_running(&self, instance_id: &str) -> Result<(), GatewayError> {
        self.record(Call::Wait(instance_id.to_string()));
        self.script
            .lock()
            .unwrap()
            .wait
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Notifier that keeps every message it is asked to send.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|(subject, _)| subject).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, subject: &str, body: &str) {
        self.sent
            .lock()
            .unwrap()
            .push((subject.to_string(), body.to_string()));
    }
}

pub fn small() -> CapacityProfile {
    CapacityProfile::new("VM.Standard.A1.Flex", 1.0, 6.0)
}

pub fn large() -> CapacityProfile {
    CapacityProfile::new("VM.Standard.A1.Flex", 4.0, 24.0)
}

pub fn spec() -> ResourceSpec {
    ResourceSpec {
        display_name: "capseek-vm".to_string(),
        initial_profile: small(),
        final_profile: large(),
        image_id: "ocid1.image.oc1..img".to_string(),
        subnet_id: "ocid1.subnet.oc1..net".to_string(),
        compartment_id: "ocid1.compartment.oc1..cmp".to_string(),
        availability_domain: "AD-1".to_string(),
        ssh_public_key: None,
        assign_public_ip: true,
    }
}

pub fn instance(
    id: &str,
    state: LifecycleState,
    profile: Option<CapacityProfile>,
) -> ResourceInstance {
    ResourceInstance {
        id: id.to_string(),
        display_name: "capseek-vm".to_string(),
        state,
        profile,
    }
}

pub fn capacity_error() -> GatewayError {
    GatewayError::Provider {
        status: 500,
        code: "InternalError".to_string(),
        message: "Out of host capacity.".to_string(),
    }
}

pub fn server_error() -> GatewayError {
    GatewayError::Provider {
        status: 500,
        code: "InternalError".to_string(),
        message: "Internal server error".to_string(),
    }
}

pub fn auth_error() -> GatewayError {
    GatewayError::Provider {
        status: 401,
        code: "NotAuthenticated".to_string(),
        message: "The required information to complete authentication was not provided"
            .to_string(),
    }
}
