//! Gateway adapter for the provider's compute REST API.
//!
//! Requests are signed with the operator's API key and issued exactly once.
//! Pacing and retries belong to the reconcile loop, not the client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use capseek_reconcile::{
    select_active, CapacityProfile, LifecycleState, ResourceInstance, ResourceSpec,
};
use ninelives::{Sleeper, TokioSleeper};
use reqwest::{RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::signer::{ApiKeyCredentials, RequestSigner};
use super::waiter::{wait_for_running, WaitConfig};
use super::{GatewayError, ResourceGateway};

const INSTANCES_PATH: &str = "/20160918/instances";

/// Compute API endpoint for a region, e.g. `us-ashburn-1`.
pub fn regional_endpoint(region: &str) -> String {
    format!("https://iaas.{region}.oraclecloud.com")
}

/// Settings for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayConfig {
    /// Base URL of the compute API, without a trailing slash.
    pub endpoint: String,

    /// API key used to sign every request.
    pub credentials: ApiKeyCredentials,

    /// Compartment searched when listing instances.
    pub compartment_id: String,

    /// Per-request timeout.
    pub request_timeout: Duration,

    /// Budget for waiting on RUNNING.
    pub wait: WaitConfig,
}

/// Provider gateway over HTTP.
pub struct HttpGateway {
    client: reqwest::Client,
    signer: RequestSigner,
    endpoint: String,
    compartment_id: String,
    wait: WaitConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl HttpGateway {
    /// Create a new gateway. Fails if the private key cannot be parsed.
    pub fn new(config: HttpGatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GatewayError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            signer: RequestSigner::new(&config.credentials)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            compartment_id: config.compartment_id,
            wait: config.wait,
            sleeper: Arc::new(TokioSleeper),
        })
    }

    /// Replace the sleeper used between RUNNING polls.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    fn instances_url(&self) -> String {
        format!("{}{}", self.endpoint, INSTANCES_PATH)
    }

    fn instance_url(&self, instance_id: &str) -> String {
        format!("{}{}/{}", self.endpoint, INSTANCES_PATH, instance_id)
    }

    /// Sign and send a request, turning non-2xx answers into provider errors.
    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, GatewayError> {
        let mut request = builder.build().map_err(transport_error)?;
        self.signer.sign(&mut request)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(transport_error)?;
        check_status(response).await
    }

    /// Fetch the current lifecycle state of one instance.
    pub async fn get_state(&self, instance_id: &str) -> Result<LifecycleState, GatewayError> {
        let response = self
            .execute(self.client.get(self.instance_url(instance_id)))
            .await?;

        let dto: InstanceDto = decode(response).await?;
        let instance = dto.into_instance()?;
        Ok(instance.state)
    }
}

#[async_trait]
impl ResourceGateway for HttpGateway {
    async fn list_active(
        &self,
        display_name: &str,
    ) -> Result<Option<ResourceInstance>, GatewayError> {
        let url = Url::parse_with_params(
            &self.instances_url(),
            &[
                ("compartmentId", self.compartment_id.as_str()),
                ("displayName", display_name),
            ],
        )
        .map_err(|e| GatewayError::InvalidResponse(format!("invalid endpoint URL: {e}")))?;
        debug!(url = %url, "Listing instances");

        let listed: Vec<InstanceDto> = decode(self.execute(self.client.get(url)).await?).await?;

        // One unreadable entry must not hide the others.
        let instances = listed
            .into_iter()
            .filter(|dto| dto.display_name == display_name)
            .filter_map(|dto| {
                let id = dto.id.clone();
                match dto.into_instance() {
                    Ok(instance) => Some(instance),
                    Err(e) => {
                        warn!(instance_id = %id, error = %e, "Skipping unreadable instance in listing");
                        None
                    }
                }
            });

        Ok(select_active(instances))
    }

    async fn create(&self, spec: &ResourceSpec) -> Result<ResourceInstance, GatewayError> {
        debug!(
            display_name = %spec.display_name,
            profile = %spec.initial_profile,
            "Launching instance"
        );

        let body = LaunchRequest::from_spec(spec);
        let response = self
            .execute(self.client.post(self.instances_url()).json(&body))
            .await?;

        let dto: InstanceDto = decode(response).await?;
        dto.into_instance()
    }

    async fn update(
        &self,
        instance_id: &str,
        target: &CapacityProfile,
    ) -> Result<(), GatewayError> {
        debug!(instance_id, profile = %target, "Updating instance shape");

        let body = UpdateRequest {
            shape: target.shape.clone(),
            shape_config: ShapeConfigDto::from(target),
        };
        self.execute(self.client.put(self.instance_url(instance_id)).json(&body))
            .await?;
        Ok(())
    }

    async fn wait_until_running(&self, instance_id: &str) -> Result<(), GatewayError> {
        wait_for_running(instance_id, &self.wait, self.sleeper.as_ref(), || {
            self.get_state(instance_id)
        })
        .await
    }
}

fn transport_error(e: reqwest::Error) -> GatewayError {
    GatewayError::Transport(e.to_string())
}

/// Turn a non-success response into a provider error. The caller decides how
/// loudly to report it; a capacity rejection is routine.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    debug!(status = %status, body = %body, "Provider rejected request");

    let (code, message) = match serde_json::from_str::<ProviderErrorBody>(&body) {
        Ok(parsed) => (parsed.code, parsed.message),
        Err(_) => (String::new(), body),
    };

    Err(GatewayError::Provider {
        status: status.as_u16(),
        code,
        message,
    })
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
    let bytes = response.bytes().await.map_err(transport_error)?;
    serde_json::from_slice(&bytes).map_err(|e| GatewayError::InvalidResponse(e.to_string()))
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeConfigDto {
    #[serde(default)]
    ocpus: Option<f64>,
    #[serde(rename = "memoryInGBs", default)]
    memory_in_gbs: Option<f64>,
}

impl From<&CapacityProfile> for ShapeConfigDto {
    fn from(profile: &CapacityProfile) -> Self {
        Self {
            ocpus: Some(profile.ocpus),
            memory_in_gbs: Some(profile.memory_gb),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstanceDto {
    id: String,
    #[serde(default)]
    display_name: String,
    lifecycle_state: String,
    #[serde(default)]
    shape: Option<String>,
    #[serde(default)]
    shape_config: Option<ShapeConfigDto>,
}

impl InstanceDto {
    fn into_instance(self) -> Result<ResourceInstance, GatewayError> {
        let state = self
            .lifecycle_state
            .parse::<LifecycleState>()
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        let profile = match (self.shape, self.shape_config) {
            (
                Some(shape),
                Some(ShapeConfigDto {
                    ocpus: Some(ocpus),
                    memory_in_gbs: Some(memory_gb),
                }),
            ) => Some(CapacityProfile::new(shape, ocpus, memory_gb)),
            _ => None,
        };

        Ok(ResourceInstance {
            id: self.id,
            display_name: self.display_name,
            state,
            profile,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LaunchRequest {
    compartment_id: String,
    availability_domain: String,
    display_name: String,
    shape: String,
    shape_config: ShapeConfigDto,
    source_details: SourceDetails,
    create_vnic_details: VnicDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<LaunchMetadata>,
}

impl LaunchRequest {
    fn from_spec(spec: &ResourceSpec) -> Self {
        Self {
            compartment_id: spec.compartment_id.clone(),
            availability_domain: spec.availability_domain.clone(),
            display_name: spec.display_name.clone(),
            shape: spec.initial_profile.shape.clone(),
            shape_config: ShapeConfigDto::from(&spec.initial_profile),
            source_details: SourceDetails {
                source_type: "image",
                image_id: spec.image_id.clone(),
            },
            create_vnic_details: VnicDetails {
                subnet_id: spec.subnet_id.clone(),
                assign_public_ip: spec.assign_public_ip,
            },
            metadata: spec.ssh_public_key.as_ref().map(|key| LaunchMetadata {
                ssh_authorized_keys: key.clone(),
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SourceDetails {
    source_type: &'static str,
    image_id: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VnicDetails {
    subnet_id: String,
    assign_public_ip: bool,
}

// The provider expects this metadata key in snake_case.
#[derive(Debug, Serialize)]
struct LaunchMetadata {
    ssh_authorized_keys: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest {
    shape: String,
    shape_config: ShapeConfigDto,
}
