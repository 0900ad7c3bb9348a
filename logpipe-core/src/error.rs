//! Error types for pipeline composition

use thiserror::Error;

use crate::domain::descriptor::DescriptorId;
use crate::domain::pipeline::{BufferType, DestinationEngine, SourceType};

/// Bad input, rejected before any provisioning happens
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("unsupported combination: {0}")]
    UnsupportedCombination(String),

    #[error("buffer {buffer_type} is not valid for source {source_type}")]
    InvalidBufferForSource {
        source_type: SourceType,
        buffer_type: BufferType,
    },

    #[error("destination config does not match engine {0}")]
    DestinationMismatch(DestinationEngine),

    #[error("stack region '{found}' does not match home region '{expected}'")]
    StackRegionMismatch { expected: String, found: String },

    #[error("{field} belongs to account '{found}', expected '{expected}'")]
    EmbeddedAccountMismatch {
        field: &'static str,
        expected: String,
        found: String,
    },

    #[error("invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("account '{0}' is not linked")]
    UnknownLinkedAccount(String),
}

/// Structural problem in a descriptor graph
///
/// These are programming errors in the resolver, never user-facing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error("descriptor graph contains a cycle through: {}", .0.join(", "))]
    Cycle(Vec<DescriptorId>),

    #[error("descriptor '{descriptor}' depends on unknown descriptor '{dependency}'")]
    UnknownDependency {
        descriptor: DescriptorId,
        dependency: DescriptorId,
    },

    #[error("duplicate descriptor id '{0}'")]
    DuplicateId(DescriptorId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("descriptor graph invariant violated: {0}")]
    Graph(#[from] GraphError),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompositionError {
    #[error("refusing to aggregate statements of role '{right}' into policy of role '{left}'")]
    CrossRoleAggregation { left: String, right: String },

    #[error("role '{role_arn}' is not a role of linked account '{account_id}'")]
    RoleOutsideLinkedAccount { role_arn: String, account_id: String },

    #[error("descriptor '{descriptor}' requires a {expected} dependency")]
    MissingDependency {
        descriptor: DescriptorId,
        expected: &'static str,
    },
}
