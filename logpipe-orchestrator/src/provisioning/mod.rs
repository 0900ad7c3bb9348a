//! Provisioning engine
//!
//! Executes a composed descriptor graph against a provisioning backend:
//! - `executor`: per-run coordinator scheduling ready descriptors on a shared pool
//! - `retry`: bounded backoff for transient errors
//! - `dedup`: cache making post-provision actions effectively once
//! - `teardown`: reverse-order deletion
//! - `memory` / `http`: backend implementations

pub mod dedup;
pub mod error;
pub mod executor;
pub mod http;
pub mod memory;
pub mod retry;
pub mod teardown;

use async_trait::async_trait;
use logpipe_core::domain::descriptor::{PostProvisionAction, ResourceDescriptor, ResourceHandle};
use logpipe_core::domain::link::CrossAccountLink;
use serde::{Deserialize, Serialize};

pub use dedup::IdempotencyCache;
pub use error::ProvisionError;
pub use executor::Provisioner;
pub use http::HttpProvisioningApi;
pub use memory::InMemoryProvisioningApi;
pub use retry::RetryPolicy;
pub use teardown::{TeardownError, teardown};

/// Result of a post-provision action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub message: String,
}

/// Backend that creates, updates and deletes cloud resources
///
/// Implementations never create a duplicate: creating a resource that exists
/// returns [`ProvisionError::AlreadyExists`]. Updating a resource that does not
/// exist returns [`ProvisionError::NotFound`].
#[async_trait]
pub trait ProvisioningApi: Send + Sync {
    async fn create_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError>;

    /// Applies the descriptor's current config to the existing resource
    async fn update_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError>;

    async fn delete_resource(&self, handle: &ResourceHandle) -> Result<(), ProvisionError>;

    /// Runs a post-provision action; the key lets the backend drop repeats
    async fn invoke_idempotent(
        &self,
        action: &PostProvisionAction,
        key: &str,
    ) -> Result<ActionOutcome, ProvisionError>;
}

/// Read access to registered cross-account links
#[async_trait]
pub trait LinkDirectory: Send + Sync {
    async fn lookup(&self, sub_account_id: &str) -> Option<CrossAccountLink>;
}
