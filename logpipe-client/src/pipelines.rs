//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use logpipe_core::domain::pipeline::PipelineRecord;
use logpipe_core::dto::pipeline::{
    CreatePipeline, CreatedPipeline, ListPipelines, PipelinePage, StackEvent, UpdatePipeline,
};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Create a new pipeline
    ///
    /// Returns as soon as the pipeline is recorded; poll [`get_pipeline`] to
    /// follow provisioning.
    ///
    /// [`get_pipeline`]: OrchestratorClient::get_pipeline
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<CreatedPipeline> {
        let url = format!("{}/pipeline/create", self.base_url);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// List pipelines, newest first
    pub async fn list_pipelines(&self, query: ListPipelines) -> Result<PipelinePage> {
        let url = format!("{}/pipeline/list", self.base_url);
        let response = self.client.get(&url).query(&query).send().await?;

        self.handle_response(response).await
    }

    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineRecord> {
        let url = format!("{}/pipeline/{}", self.base_url, pipeline_id);
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Change the lifecycle settings of an ACTIVE pipeline
    pub async fn update_pipeline(
        &self,
        pipeline_id: Uuid,
        req: UpdatePipeline,
    ) -> Result<PipelineRecord> {
        let url = format!("{}/pipeline/{}/update", self.base_url, pipeline_id);
        let response = self.client.post(&url).json(&req).send().await?;

        self.handle_response(response).await
    }

    /// Delete a pipeline
    ///
    /// The returned record is DELETED, or still DELETING with an error when
    /// teardown failed.
    pub async fn delete_pipeline(&self, pipeline_id: Uuid) -> Result<PipelineRecord> {
        let url = format!("{}/pipeline/{}", self.base_url, pipeline_id);
        let response = self.client.delete(&url).send().await?;

        self.handle_response(response).await
    }

    /// Forward a stack status notification
    pub async fn send_stack_event(
        &self,
        pipeline_id: Uuid,
        event: StackEvent,
    ) -> Result<PipelineRecord> {
        let url = format!("{}/pipeline/{}/stack-event", self.base_url, pipeline_id);
        let response = self.client.post(&url).json(&event).send().await?;

        self.handle_response(response).await
    }
}
