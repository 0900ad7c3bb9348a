//! Permission statement types

use serde::{Deserialize, Serialize};

use crate::error::CompositionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// Whether a statement belongs to a role's identity policy or to the resource policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementScope {
    Identity,
    Resource,
}

/// Who a statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum StatementPrincipal {
    Any,
    Role(String),
    Service(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub operator: String,
    pub key: String,
    pub values: Vec<String>,
}

impl Condition {
    pub fn insecure_transport() -> Self {
        Self {
            operator: "Bool".to_string(),
            key: "aws:SecureTransport".to_string(),
            values: vec!["false".to_string()],
        }
    }

    pub fn source_arn(arn: &str) -> Self {
        Self {
            operator: "ArnLike".to_string(),
            key: "aws:SourceArn".to_string(),
            values: vec![arn.to_string()],
        }
    }

    pub fn source_arns(arns: Vec<String>) -> Self {
        Self {
            operator: "ArnLike".to_string(),
            key: "aws:SourceArn".to_string(),
            values: arns,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionStatement {
    pub sid: String,
    pub effect: Effect,
    pub scope: StatementScope,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    pub principal: StatementPrincipal,
    pub condition: Option<Condition>,
}

impl PermissionStatement {
    pub fn allow(
        sid: impl Into<String>,
        scope: StatementScope,
        principal: StatementPrincipal,
        actions: &[&str],
        resources: Vec<String>,
    ) -> Self {
        Self {
            sid: sid.into(),
            effect: Effect::Allow,
            scope,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            resources,
            principal,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Baseline deny for plain-text access to a network-reachable resource
    pub fn deny_insecure_transport(service: &str, resource_arn: &str) -> Self {
        Self {
            sid: "DenyInsecureTransport".to_string(),
            effect: Effect::Deny,
            scope: StatementScope::Resource,
            actions: vec![format!("{}:*", service)],
            resources: vec![resource_arn.to_string()],
            principal: StatementPrincipal::Any,
            condition: Some(Condition::insecure_transport()),
        }
    }

    pub fn principal_role(&self) -> Option<&str> {
        match &self.principal {
            StatementPrincipal::Role(arn) => Some(arn),
            _ => None,
        }
    }
}

/// Identity policy of a single execution role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub role_arn: String,
    pub statements: Vec<PermissionStatement>,
}

impl PolicyDocument {
    pub fn new(role_arn: impl Into<String>) -> Self {
        Self {
            role_arn: role_arn.into(),
            statements: Vec::new(),
        }
    }

    /// Appends another document's statements
    ///
    /// Documents of different roles are never merged: doing so would leak one
    /// role's grants into another.
    pub fn merge(&mut self, other: PolicyDocument) -> Result<(), CompositionError> {
        if other.role_arn != self.role_arn {
            return Err(CompositionError::CrossRoleAggregation {
                left: self.role_arn.clone(),
                right: other.role_arn,
            });
        }

        for statement in other.statements {
            if !self.statements.contains(&statement) {
                self.statements.push(statement);
            }
        }
        Ok(())
    }
}
