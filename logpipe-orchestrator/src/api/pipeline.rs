//! Pipeline API Handlers
//!
//! HTTP endpoints for pipeline management.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use logpipe_core::domain::pipeline::PipelineRecord;
use logpipe_core::dto::pipeline::{
    CreatePipeline, CreatedPipeline, ListPipelines, PipelinePage, StackEvent, UpdatePipeline,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::ApiResult;

/// POST /pipeline/create
/// Create a new pipeline; provisioning continues in the background
pub async fn create_pipeline(
    State(state): State<AppState>,
    Json(req): Json<CreatePipeline>,
) -> ApiResult<(StatusCode, Json<CreatedPipeline>)> {
    tracing::info!(
        "Creating pipeline: {}/{}/{}",
        req.source_type,
        req.buffer_type,
        req.destination_engine
    );

    let created = state.pipelines.create_pipeline(req).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// GET /pipeline/list?page&count
pub async fn list_pipelines(
    State(state): State<AppState>,
    Query(query): Query<ListPipelines>,
) -> ApiResult<Json<PipelinePage>> {
    tracing::debug!("Listing pipelines: page={} count={}", query.page, query.count);

    let page = state.pipelines.list_pipelines(query).await?;
    Ok(Json(page))
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::debug!("Getting pipeline: {}", id);

    let record = state.pipelines.get_pipeline(id).await?;
    Ok(Json(record))
}

/// DELETE /pipeline/{id}
/// Tear down a pipeline; returns the record as DELETED, or DELETING with the
/// teardown error
pub async fn delete_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Deleting pipeline: {}", id);

    let record = state.pipelines.delete_pipeline(id).await?;
    Ok(Json(record))
}

/// POST /pipeline/{id}/update
pub async fn update_pipeline(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdatePipeline>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Updating pipeline: {}", id);

    let record = state.pipelines.update_pipeline(id, req).await?;
    Ok(Json(record))
}

/// POST /pipeline/{id}/stack-event
/// Out-of-band stack status notification
pub async fn stack_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(event): Json<StackEvent>,
) -> ApiResult<Json<PipelineRecord>> {
    tracing::info!("Stack event for pipeline {}: {}", id, event.stack_status);

    let record = state.pipelines.apply_stack_event(id, event).await?;
    Ok(Json(record))
}
