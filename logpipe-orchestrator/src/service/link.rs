//! Cross-account link registry
//!
//! Validates link requests, checks the linked role and stores the result.
//! Reads are served from a cache in front of the repository; the provisioning
//! engine looks links up through [`LinkDirectory`].

use async_trait::async_trait;
use logpipe_core::domain::link::{CrossAccountLink, LinkStatus};
use logpipe_core::dto::link::{LinkAccount, LinkCreated};
use logpipe_core::error::ValidationError;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::provisioning::LinkDirectory;
use crate::repository::{LinkRepository, RepositoryError};
use crate::service::role_check::RoleVerifier;

#[derive(Debug, Error)]
pub enum LinkServiceError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, LinkServiceError>;

pub struct LinkRegistry {
    repo: Arc<dyn LinkRepository>,
    verifier: Arc<dyn RoleVerifier>,
    home_region: String,
    cache: RwLock<HashMap<String, CrossAccountLink>>,
}

impl LinkRegistry {
    pub fn new(
        repo: Arc<dyn LinkRepository>,
        verifier: Arc<dyn RoleVerifier>,
        home_region: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            verifier,
            home_region: home_region.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a sub-account, replacing any previous link for it
    pub async fn link(&self, candidate: LinkAccount) -> Result<LinkCreated> {
        logpipe_core::link::validate(&candidate, &self.home_region)?;

        let status = if self.verifier.is_reachable(&candidate.role_arn).await {
            LinkStatus::Verified
        } else {
            LinkStatus::Unverified
        };

        let link = CrossAccountLink {
            id: Uuid::new_v4(),
            sub_account_id: candidate.sub_account_id,
            region: candidate.region,
            role_arn: candidate.role_arn,
            bucket_name: candidate.bucket_name,
            stack_id: candidate.stack_id,
            kms_key_arn: candidate.kms_key_arn,
            status,
            created_at: chrono::Utc::now(),
        };

        // Hold the write lock across the store so readers never see a stale link
        let mut cache = self.cache.write().await;
        self.repo.upsert(&link).await?;
        cache.insert(link.sub_account_id.clone(), link.clone());

        tracing::info!(
            sub_account_id = %link.sub_account_id,
            link_id = %link.id,
            status = link.status.as_str(),
            "account linked"
        );

        Ok(LinkCreated {
            link_id: link.id,
            status,
        })
    }

    pub async fn get(&self, sub_account_id: &str) -> Result<Option<CrossAccountLink>> {
        if let Some(link) = self.cache.read().await.get(sub_account_id) {
            return Ok(Some(link.clone()));
        }

        let mut cache = self.cache.write().await;
        if let Some(link) = cache.get(sub_account_id) {
            return Ok(Some(link.clone()));
        }

        let link = self.repo.find_by_account(sub_account_id).await?;
        if let Some(link) = &link {
            cache.insert(sub_account_id.to_string(), link.clone());
        }
        Ok(link)
    }
}

#[async_trait]
impl LinkDirectory for LinkRegistry {
    async fn lookup(&self, sub_account_id: &str) -> Option<CrossAccountLink> {
        match self.get(sub_account_id).await {
            Ok(link) => link,
            Err(err) => {
                tracing::error!(sub_account_id, error = %err, "link lookup failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryLinkRepository;
    use crate::service::role_check::StaticRoleVerifier;
    use crate::service::test_support::{LINKED, link_request};

    fn registry(reachable: bool) -> (LinkRegistry, Arc<InMemoryLinkRepository>) {
        let repo = Arc::new(InMemoryLinkRepository::new());
        let registry = LinkRegistry::new(
            repo.clone(),
            Arc::new(StaticRoleVerifier::new(reachable)),
            "us-east-1",
        );
        (registry, repo)
    }

    #[tokio::test]
    async fn test_link_verified() {
        let (registry, _) = registry(true);
        let created = registry.link(link_request()).await.unwrap();
        assert_eq!(created.status, LinkStatus::Verified);

        let stored = registry.get(LINKED).await.unwrap().unwrap();
        assert_eq!(stored.id, created.link_id);
        assert_eq!(stored.role_arn, link_request().role_arn);
    }

    #[tokio::test]
    async fn test_unreachable_role_is_unverified() {
        let (registry, _) = registry(false);
        let created = registry.link(link_request()).await.unwrap();
        assert_eq!(created.status, LinkStatus::Unverified);
    }

    #[tokio::test]
    async fn test_invalid_link_is_not_stored() {
        let (registry, repo) = registry(true);
        let mut request = link_request();
        request.role_arn = "arn:aws:iam::999999999999:role/LogpipeLinkRole".to_string();

        let err = registry.link(request).await.unwrap_err();
        assert!(matches!(
            err,
            LinkServiceError::Invalid(ValidationError::EmbeddedAccountMismatch { field: "role_arn", .. })
        ));
        assert!(repo.find_by_account(LINKED).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_relink_replaces_record() {
        let (registry, repo) = registry(true);
        let first = registry.link(link_request()).await.unwrap();

        let mut request = link_request();
        request.role_arn = format!("arn:aws:iam::{LINKED}:role/LogpipeLinkRoleV2");
        let second = registry.link(request).await.unwrap();

        assert_ne!(first.link_id, second.link_id);
        let stored = repo.find_by_account(LINKED).await.unwrap().unwrap();
        assert_eq!(stored.id, second.link_id);
        assert_eq!(registry.lookup(LINKED).await.unwrap().id, second.link_id);
    }

    #[tokio::test]
    async fn test_get_reads_through_to_repository() {
        let (registry, repo) = registry(true);
        let link = CrossAccountLink {
            id: Uuid::new_v4(),
            sub_account_id: LINKED.to_string(),
            region: "us-east-1".to_string(),
            role_arn: link_request().role_arn,
            bucket_name: "linked-logs".to_string(),
            stack_id: link_request().stack_id,
            kms_key_arn: link_request().kms_key_arn,
            status: LinkStatus::Verified,
            created_at: chrono::Utc::now(),
        };
        repo.upsert(&link).await.unwrap();

        assert_eq!(registry.get(LINKED).await.unwrap(), Some(link));
        assert!(registry.lookup("444455556666").await.is_none());
    }
}
