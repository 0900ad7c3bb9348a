//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod link;
pub mod pipeline;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::{LinkRegistry, PipelineService};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipelines: Arc<PipelineService>,
    pub links: Arc<LinkRegistry>,
}

/// Create the main API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/create", post(pipeline::create_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route(
            "/pipeline/{id}",
            get(pipeline::get_pipeline).delete(pipeline::delete_pipeline),
        )
        .route("/pipeline/{id}/update", post(pipeline::update_pipeline))
        .route("/pipeline/{id}/stack-event", post(pipeline::stack_event))
        // Cross-account link endpoints
        .route("/link/create", post(link::create_link))
        .route("/link/{sub_account_id}", get(link::get_link))
        // Add state and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::PipelineRepository;
    use crate::service::test_support::{Harness, LINKED, link_request, s3_request};
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use logpipe_core::domain::pipeline::{BufferType, PipelineRecord, PipelineStatus};
    use logpipe_core::dto::link::LinkCreated;
    use logpipe_core::dto::pipeline::{CreatedPipeline, PipelinePage};
    use serde::de::DeserializeOwned;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(harness: &Harness) -> Router {
        create_router(AppState {
            pipelines: harness.service.clone(),
            links: harness.links.clone(),
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn read<T: DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let harness = Harness::new();
        let response = app(&harness).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = read(response).await;
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_create_then_get_pipeline() {
        let harness = Harness::new();
        let body = serde_json::to_value(s3_request(BufferType::Sqs)).unwrap();

        let response = app(&harness)
            .oneshot(post_json("/pipeline/create", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreatedPipeline = read(response).await;

        harness.service.wait_for_run(created.id).await;
        let response = app(&harness)
            .oneshot(get(&format!("/pipeline/{}", created.id)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: PipelineRecord = read(response).await;
        assert_eq!(record.status, PipelineStatus::Active);

        let response = app(&harness)
            .oneshot(get("/pipeline/list?page=1&count=10"))
            .await
            .unwrap();
        let page: PipelinePage = read(response).await;
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_invalid_combination_is_bad_request() {
        let harness = Harness::new();
        let mut body = serde_json::to_value(s3_request(BufferType::None)).unwrap();
        body["source_type"] = json!("Ec2");
        body["source"] = json!({ "log_paths": ["/var/log/*.log"] });

        let response = app(&harness)
            .oneshot(post_json("/pipeline/create", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = read(response).await;
        assert!(body["error"].as_str().unwrap().contains("not valid for source"));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let harness = Harness::new();
        let response = app(&harness)
            .oneshot(get(&format!("/pipeline/{}", uuid::Uuid::new_v4())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_update_in_wrong_state_is_conflict() {
        let harness = Harness::new();
        harness.api.fail_create(
            logpipe_core::resolver::PROCESSOR,
            [crate::provisioning::ProvisionError::Configuration("bad".into())],
        );
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::None))
            .await
            .unwrap();
        harness.service.wait_for_run(created.id).await;

        let body = json!({
            "lifecycle": {
                "warm_age_days": null,
                "cold_age_days": null,
                "retain_age_days": 30,
                "log_retention_days": 7
            }
        });
        let response = app(&harness)
            .oneshot(post_json(&format!("/pipeline/{}/update", created.id), body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_structural_update_is_rejected() {
        let harness = Harness::new();
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::None))
            .await
            .unwrap();
        harness.service.wait_for_run(created.id).await;

        let body = json!({
            "lifecycle": {
                "warm_age_days": null,
                "cold_age_days": null,
                "retain_age_days": 30,
                "log_retention_days": 7
            },
            "buffer_type": "Sqs"
        });
        let response = app(&harness)
            .oneshot(post_json(&format!("/pipeline/{}/update", created.id), body))
            .await
            .unwrap();
        assert!(response.status().is_client_error());

        let record = harness.service.get_pipeline(created.id).await.unwrap();
        assert_eq!(record.status, PipelineStatus::Active);
    }

    #[tokio::test]
    async fn test_delete_and_stack_event() {
        let harness = Harness::new();
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::None))
            .await
            .unwrap();
        harness.service.wait_for_run(created.id).await;

        let response = app(&harness)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/pipeline/{}", created.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: PipelineRecord = read(response).await;
        assert_eq!(record.status, PipelineStatus::Deleted);

        // Ignored on a deleted pipeline
        let response = app(&harness)
            .oneshot(post_json(
                &format!("/pipeline/{}/stack-event", created.id),
                json!({ "stack_status": "DELETE_FAILED" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: PipelineRecord = read(response).await;
        assert_eq!(record.status, PipelineStatus::Deleted);
    }

    #[tokio::test]
    async fn test_stack_events_while_deleting() {
        let harness = Harness::new();
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::None))
            .await
            .unwrap();
        harness.service.wait_for_run(created.id).await;

        let mut record = harness.service.get_pipeline(created.id).await.unwrap();
        record.status = PipelineStatus::Deleting;
        assert!(harness.repo.update(&record).await.unwrap());

        let uri = format!("/pipeline/{}/stack-event", created.id);
        let response = app(&harness)
            .oneshot(post_json(
                &uri,
                json!({ "stack_status": "DELETE_FAILED", "reason": "bucket not empty" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: PipelineRecord = read(response).await;
        assert_eq!(record.status, PipelineStatus::Deleting);
        assert_eq!(
            record.error.as_deref(),
            Some("stack: DELETE_FAILED: bucket not empty")
        );

        let response = app(&harness)
            .oneshot(post_json(&uri, json!({ "stack_status": "DELETE_COMPLETE" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let record: PipelineRecord = read(response).await;
        assert_eq!(record.status, PipelineStatus::Deleted);
        assert!(record.error.is_none());
    }

    #[tokio::test]
    async fn test_invalid_transition_is_conflict() {
        let harness = Harness::new();
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::None))
            .await
            .unwrap();
        harness.service.wait_for_run(created.id).await;
        harness.service.delete_pipeline(created.id).await.unwrap();

        let response = app(&harness)
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/pipeline/{}", created.id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let body: Value = read(response).await;
        assert!(body["error"].as_str().unwrap().contains("DELETED"));
    }

    #[tokio::test]
    async fn test_link_endpoints() {
        let harness = Harness::new();
        let body = serde_json::to_value(link_request()).unwrap();

        let response = app(&harness)
            .oneshot(post_json("/link/create", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let created: LinkCreated = read(response).await;

        let response = app(&harness)
            .oneshot(get(&format!("/link/{LINKED}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let link: Value = read(response).await;
        assert_eq!(link["id"], json!(created.link_id));

        let response = app(&harness)
            .oneshot(get("/link/444455556666"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_link_with_foreign_role_is_bad_request() {
        let harness = Harness::new();
        let mut body = serde_json::to_value(link_request()).unwrap();
        body["role_arn"] = json!("arn:aws:iam::999999999999:role/LogpipeLinkRole");

        let response = app(&harness)
            .oneshot(post_json("/link/create", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
