//! HTTP provisioning backend
//!
//! Talks to a provisioning service that owns the cloud SDK calls:
//! - `POST /resources` creates a resource from a descriptor
//! - `PUT /resources/{kind}/{name}` applies a changed descriptor config
//! - `DELETE /resources/{kind}/{name}` deletes one
//! - `POST /actions/{action}` runs a post-provision action, with the
//!   idempotency key in the `Idempotency-Key` header
//!
//! Status codes map onto the provisioning error taxonomy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use logpipe_core::domain::descriptor::{PostProvisionAction, ResourceDescriptor, ResourceHandle};

use crate::provisioning::{ActionOutcome, ProvisionError, ProvisioningApi};

pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

#[derive(Debug, Clone)]
pub struct HttpProvisioningApi {
    base_url: String,
    client: Client,
}

impl HttpProvisioningApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
        role_arn: Option<&str>,
    ) -> Result<T, ProvisionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, body, role_arn));
        }

        response
            .json()
            .await
            .map_err(|e| ProvisionError::Configuration(format!("invalid provisioner response: {e}")))
    }
}

/// Maps a failed response onto the error taxonomy
fn map_status(status: StatusCode, body: String, role_arn: Option<&str>) -> ProvisionError {
    match status {
        StatusCode::CONFLICT => ProvisionError::AlreadyExists(body),
        StatusCode::NOT_FOUND => ProvisionError::NotFound(body),
        StatusCode::TOO_MANY_REQUESTS => ProvisionError::Transient(body),
        StatusCode::FORBIDDEN if body.contains("AssumeRole") => ProvisionError::AssumeRoleFailed {
            role_arn: role_arn.unwrap_or_default().to_string(),
            reason: body,
        },
        s if s.is_server_error() => ProvisionError::Transient(format!("{s}: {body}")),
        s => ProvisionError::Configuration(format!("{s}: {body}")),
    }
}

/// Connection problems are worth retrying; anything else is not
fn map_transport(err: reqwest::Error) -> ProvisionError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProvisionError::Transient(err.to_string())
    } else {
        ProvisionError::Configuration(err.to_string())
    }
}

#[async_trait]
impl ProvisioningApi for HttpProvisioningApi {
    async fn create_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError> {
        let url = format!("{}/resources", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(descriptor)
            .send()
            .await
            .map_err(map_transport)?;

        let role_arn = descriptor.principal.as_ref().and_then(|p| p.assumed_role());
        self.handle_response(response, role_arn).await
    }

    async fn update_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError> {
        let url = format!("{}/resources/{}/{}", self.base_url, descriptor.kind, descriptor.name);
        let response = self
            .client
            .put(&url)
            .json(descriptor)
            .send()
            .await
            .map_err(map_transport)?;

        let role_arn = descriptor.principal.as_ref().and_then(|p| p.assumed_role());
        self.handle_response(response, role_arn).await
    }

    async fn delete_resource(&self, handle: &ResourceHandle) -> Result<(), ProvisionError> {
        let url = format!("{}/resources/{}/{}", self.base_url, handle.kind, handle.name);
        let response = self.client.delete(&url).send().await.map_err(map_transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status(status, body, None))
    }

    async fn invoke_idempotent(
        &self,
        action: &PostProvisionAction,
        key: &str,
    ) -> Result<ActionOutcome, ProvisionError> {
        let url = format!("{}/actions/{}", self.base_url, action.action);
        let response = self
            .client
            .post(&url)
            .header(IDEMPOTENCY_KEY_HEADER, key)
            .json(&action.payload)
            .send()
            .await
            .map_err(map_transport)?;

        self.handle_response(response, None).await
    }
}
