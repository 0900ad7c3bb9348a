//! Resource descriptor types
//!
//! A descriptor is a declarative unit of "a resource to provision", independent
//! of the deployment engine. Descriptors are produced by the resolver, annotated
//! by the composer and consumed by the provisioning orchestrator.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::permission::PermissionStatement;

/// Identifier of a descriptor, unique within one graph
pub type DescriptorId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    DeadLetterQueue,
    Queue,
    Stream,
    Processor,
    AgentFleet,
    SyslogEndpoint,
    SubscriptionFilter,
    DestinationWiring,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ResourceKind::DeadLetterQueue => "dead_letter_queue",
            ResourceKind::Queue => "queue",
            ResourceKind::Stream => "stream",
            ResourceKind::Processor => "processor",
            ResourceKind::AgentFleet => "agent_fleet",
            ResourceKind::SyslogEndpoint => "syslog_endpoint",
            ResourceKind::SubscriptionFilter => "subscription_filter",
            ResourceKind::DestinationWiring => "destination_wiring",
        }
    }

    /// Resources reachable over the network that get the insecure-transport deny
    pub fn is_network_reachable(self) -> bool {
        matches!(self, ResourceKind::Queue | ResourceKind::DeadLetterQueue)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who acts on the source side of a descriptor
///
/// Exactly one variant is chosen at resolve time. There is no deploy-time
/// condition to re-evaluate later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Principal {
    SameAccount { account_id: String },
    CrossAccount { account_id: String, role_arn: String },
}

impl Principal {
    pub fn account_id(&self) -> &str {
        match self {
            Principal::SameAccount { account_id } | Principal::CrossAccount { account_id, .. } => {
                account_id
            }
        }
    }

    /// Linked role to assume, only for the cross-account branch
    pub fn assumed_role(&self) -> Option<&str> {
        match self {
            Principal::SameAccount { .. } => None,
            Principal::CrossAccount { role_arn, .. } => Some(role_arn),
        }
    }
}

/// Action run once a resource exists (custom-resource style trigger)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostProvisionAction {
    pub action: String,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: DescriptorId,
    pub kind: ResourceKind,
    pub name: String,
    pub config: serde_json::Value,
    pub depends_on: BTreeSet<DescriptorId>,
    pub idempotency_key: String,
    /// Set only for descriptors that reach into the source account
    pub principal: Option<Principal>,
    /// Name of the home-account role that runs or administers the resource
    pub execution_role: Option<String>,
    #[serde(default)]
    pub statements: Vec<PermissionStatement>,
    pub post_provision: Option<PostProvisionAction>,
}

impl ResourceDescriptor {
    pub fn is_cross_account(&self) -> bool {
        matches!(self.principal, Some(Principal::CrossAccount { .. }))
    }
}

/// Reference to a created resource, returned by the provisioning backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceHandle {
    pub descriptor_id: DescriptorId,
    pub kind: ResourceKind,
    pub name: String,
    pub physical_id: String,
}

impl ResourceHandle {
    /// Handle for a descriptor whose physical id is not known
    ///
    /// Used for teardown, where the backend locates resources by name.
    pub fn for_descriptor(descriptor: &ResourceDescriptor) -> Self {
        Self {
            descriptor_id: descriptor.id.clone(),
            kind: descriptor.kind,
            name: descriptor.name.clone(),
            physical_id: descriptor.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisionOutcome {
    Created,
    Failed,
}

/// Terminal state of one descriptor in a provisioning run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisionEvent {
    pub descriptor_id: DescriptorId,
    pub kind: ResourceKind,
    pub outcome: ProvisionOutcome,
    pub detail: Option<String>,
    pub attempts: u32,
    pub handle: Option<ResourceHandle>,
}

impl ProvisionEvent {
    pub fn created(descriptor: &ResourceDescriptor, handle: ResourceHandle, attempts: u32) -> Self {
        Self {
            descriptor_id: descriptor.id.clone(),
            kind: descriptor.kind,
            outcome: ProvisionOutcome::Created,
            detail: None,
            attempts,
            handle: Some(handle),
        }
    }

    pub fn failed(descriptor: &ResourceDescriptor, detail: impl Into<String>, attempts: u32) -> Self {
        Self {
            descriptor_id: descriptor.id.clone(),
            kind: descriptor.kind,
            outcome: ProvisionOutcome::Failed,
            detail: Some(detail.into()),
            attempts,
            handle: None,
        }
    }

    /// Failure caused by an upstream descriptor; nothing was attempted
    pub fn blocked(descriptor: &ResourceDescriptor, blocked_by: &str) -> Self {
        Self::failed(descriptor, format!("blocked_by:{}", blocked_by), 0)
    }

    pub fn is_created(&self) -> bool {
        self.outcome == ProvisionOutcome::Created
    }
}
