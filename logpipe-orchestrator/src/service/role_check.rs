//! Linked role reachability check
//!
//! Asks whether the home account can assume a linked role. A negative answer
//! does not reject the link; it is stored as Unverified.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashSet;

#[async_trait]
pub trait RoleVerifier: Send + Sync {
    async fn is_reachable(&self, role_arn: &str) -> bool;
}

/// Verifier backed by an HTTP endpoint
///
/// `POST {url}` with `{"role_arn": ...}`; any 2xx means reachable.
pub struct HttpRoleVerifier {
    client: Client,
    url: String,
}

impl HttpRoleVerifier {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[derive(Serialize)]
struct RoleCheckRequest<'a> {
    role_arn: &'a str,
}

#[async_trait]
impl RoleVerifier for HttpRoleVerifier {
    async fn is_reachable(&self, role_arn: &str) -> bool {
        let response = self
            .client
            .post(&self.url)
            .json(&RoleCheckRequest { role_arn })
            .send()
            .await;

        match response {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::warn!(role_arn, status = %response.status(), "linked role is not reachable");
                false
            }
            Err(err) => {
                tracing::warn!(role_arn, error = %err, "role check failed");
                false
            }
        }
    }
}

/// Verifier with fixed answers
#[derive(Debug, Clone, Default)]
pub struct StaticRoleVerifier {
    default: bool,
    overrides: HashSet<String>,
}

impl StaticRoleVerifier {
    /// Every role gets `reachable`
    pub fn new(reachable: bool) -> Self {
        Self {
            default: reachable,
            overrides: HashSet::new(),
        }
    }

    /// Flips the answer for one role
    pub fn with_override(mut self, role_arn: impl Into<String>) -> Self {
        self.overrides.insert(role_arn.into());
        self
    }
}

#[async_trait]
impl RoleVerifier for StaticRoleVerifier {
    async fn is_reachable(&self, role_arn: &str) -> bool {
        self.default != self.overrides.contains(role_arn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROLE: &str = "arn:aws:iam::111122223333:role/LogpipeLinkRole";

    #[tokio::test]
    async fn test_http_verifier_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/check")
            .match_body(mockito::Matcher::Json(serde_json::json!({ "role_arn": ROLE })))
            .with_status(200)
            .create_async()
            .await;

        let verifier = HttpRoleVerifier::new(format!("{}/check", server.url()));
        assert!(verifier.is_reachable(ROLE).await);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_verifier_denied() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/check")
            .with_status(403)
            .create_async()
            .await;

        let verifier = HttpRoleVerifier::new(format!("{}/check", server.url()));
        assert!(!verifier.is_reachable(ROLE).await);
    }

    #[tokio::test]
    async fn test_http_verifier_unreachable_endpoint() {
        let verifier = HttpRoleVerifier::new("http://127.0.0.1:1/check");
        assert!(!verifier.is_reachable(ROLE).await);
    }

    #[tokio::test]
    async fn test_static_verifier_override() {
        let verifier = StaticRoleVerifier::new(true).with_override(ROLE);
        assert!(!verifier.is_reachable(ROLE).await);
        assert!(verifier.is_reachable("arn:aws:iam::111122223333:role/Other").await);
    }
}
