//! Cross-account link API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use logpipe_core::domain::link::CrossAccountLink;
use logpipe_core::dto::link::{LinkAccount, LinkCreated};

impl OrchestratorClient {
    /// Link a sub-account, replacing any existing link for it
    pub async fn link_account(&self, req: LinkAccount) -> Result<LinkCreated> {
        let url = format!("{}/link/create", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_link(&self, sub_account_id: &str) -> Result<CrossAccountLink> {
        let url = format!("{}/link/{}", self.base_url, sub_account_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use crate::OrchestratorClient;
    use logpipe_core::domain::link::LinkStatus;
    use logpipe_core::dto::link::LinkAccount;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_link_account() {
        let mut server = mockito::Server::new_async().await;
        let link_id = Uuid::new_v4();
        let mock = server
            .mock("POST", "/link/create")
            .match_body(mockito::Matcher::PartialJson(json!({ "sub_account_id": "111122223333" })))
            .with_status(201)
            .with_body(json!({ "link_id": link_id, "status": "Unverified" }).to_string())
            .create_async()
            .await;

        let created = OrchestratorClient::new(server.url())
            .link_account(LinkAccount {
                sub_account_id: "111122223333".to_string(),
                region: "us-east-1".to_string(),
                role_arn: "arn:aws:iam::111122223333:role/LogpipeLinkRole".to_string(),
                bucket_name: "linked-logs".to_string(),
                stack_id: "arn:aws:cloudformation:us-east-1:111122223333:stack/LogpipeLink/6a1b7c30"
                    .to_string(),
                kms_key_arn: "arn:aws:kms:us-east-1:111122223333:key/1234abcd".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(created.link_id, link_id);
        assert_eq!(created.status, LinkStatus::Unverified);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_unknown_link() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/link/444455556666")
            .with_status(404)
            .with_body(json!({ "error": "Account 444455556666 is not linked" }).to_string())
            .create_async()
            .await;

        let err = OrchestratorClient::new(server.url())
            .get_link("444455556666")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
