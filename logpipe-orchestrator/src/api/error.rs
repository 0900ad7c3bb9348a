//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use logpipe_core::error::CompositionError;

use crate::service::link::LinkServiceError;
use crate::service::pipeline::PipelineServiceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<PipelineServiceError> for ApiError {
    fn from(err: PipelineServiceError) -> Self {
        match err {
            PipelineServiceError::NotFound(id) => {
                ApiError::NotFound(format!("Pipeline {} not found", id))
            }
            PipelineServiceError::Invalid(e) => ApiError::BadRequest(e.to_string()),
            e @ PipelineServiceError::InvalidState { .. } => ApiError::Conflict(e.to_string()),
            PipelineServiceError::Composition(e @ CompositionError::RoleOutsideLinkedAccount { .. }) => {
                ApiError::BadRequest(e.to_string())
            }
            PipelineServiceError::Composition(e) => ApiError::InternalError(e.to_string()),
            PipelineServiceError::Graph(e) => ApiError::InternalError(e.to_string()),
            PipelineServiceError::Repository(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

impl From<LinkServiceError> for ApiError {
    fn from(err: LinkServiceError) -> Self {
        match err {
            LinkServiceError::Invalid(e) => ApiError::BadRequest(e.to_string()),
            LinkServiceError::Repository(e) => ApiError::InternalError(e.to_string()),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
