//! Cross-Account Link API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use logpipe_core::domain::link::CrossAccountLink;
use logpipe_core::dto::link::{LinkAccount, LinkCreated};

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

/// POST /link/create
pub async fn create_link(
    State(state): State<AppState>,
    Json(req): Json<LinkAccount>,
) -> ApiResult<(StatusCode, Json<LinkCreated>)> {
    tracing::info!("Linking account: {}", req.sub_account_id);

    let created = state.links.link(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /link/{sub_account_id}
pub async fn get_link(
    State(state): State<AppState>,
    Path(sub_account_id): Path<String>,
) -> ApiResult<Json<CrossAccountLink>> {
    tracing::debug!("Getting link: {}", sub_account_id);

    state
        .links
        .get(&sub_account_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Account {} is not linked", sub_account_id)))
}
