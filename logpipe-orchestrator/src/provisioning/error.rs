//! Provisioning error taxonomy

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProvisionError {
    /// Throttling or propagation delay; retried within bounds
    #[error("transient provisioning error: {0}")]
    Transient(String),

    /// Rejected request; surfaces immediately
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("resource not found: {0}")]
    NotFound(String),

    #[error("failed to assume role {role_arn}: {reason}")]
    AssumeRoleFailed { role_arn: String, reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl ProvisionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProvisionError::Transient(_))
    }

    /// Short detail recorded on a failed descriptor
    pub fn detail(&self) -> String {
        match self {
            ProvisionError::Cancelled => "cancelled".to_string(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(ProvisionError::Transient("throttled".into()).is_retryable());
        assert!(!ProvisionError::Configuration("bad".into()).is_retryable());
        assert!(
            !ProvisionError::AssumeRoleFailed {
                role_arn: "arn:aws:iam::111122223333:role/x".into(),
                reason: "denied".into(),
            }
            .is_retryable()
        );
        assert!(!ProvisionError::Cancelled.is_retryable());
    }

    #[test]
    fn test_cancelled_detail() {
        assert_eq!(ProvisionError::Cancelled.detail(), "cancelled");
    }
}
