//! Pipeline Service
//!
//! Business logic for pipeline management. A create or update resolves and
//! composes the descriptor graph up front, persists the record and then
//! provisions in the background; the record is updated as events arrive.

use logpipe_core::domain::descriptor::ProvisionEvent;
use logpipe_core::domain::link::CrossAccountLink;
use logpipe_core::domain::pipeline::{PipelineRecord, PipelineSpec, PipelineStatus};
use logpipe_core::dto::pipeline::{
    CreatePipeline, CreatedPipeline, ListPipelines, PipelinePage, StackEvent, UpdatePipeline,
};
use logpipe_core::error::{CompositionError, GraphError, ResolveError, ValidationError};
use logpipe_core::graph::DescriptorGraph;
use logpipe_core::{ComposeContext, compose, resolve};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::provisioning::{Provisioner, teardown};
use crate::repository::{PipelineRepository, RepositoryError};
use crate::service::lifecycle::{KeyedLocks, LifecycleError, LifecycleManager};
use crate::service::link::{LinkRegistry, LinkServiceError};

/// Service error type
#[derive(Debug, Error)]
pub enum PipelineServiceError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("cannot {operation} pipeline {id} while {status}")]
    InvalidState {
        id: Uuid,
        status: PipelineStatus,
        operation: &'static str,
    },

    #[error(transparent)]
    Composition(#[from] CompositionError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<ResolveError> for PipelineServiceError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::Invalid(e) => PipelineServiceError::Invalid(e),
            ResolveError::Graph(e) => PipelineServiceError::Graph(e),
        }
    }
}

impl From<LifecycleError> for PipelineServiceError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::NotFound(id) => PipelineServiceError::NotFound(id),
            LifecycleError::InvalidTransition { id, from, to } => PipelineServiceError::InvalidState {
                id,
                status: from,
                operation: operation_name(to),
            },
            LifecycleError::Repository(e) => PipelineServiceError::Repository(e),
        }
    }
}

impl From<LinkServiceError> for PipelineServiceError {
    fn from(err: LinkServiceError) -> Self {
        match err {
            LinkServiceError::Invalid(e) => PipelineServiceError::Invalid(e),
            LinkServiceError::Repository(e) => PipelineServiceError::Repository(e),
        }
    }
}

fn operation_name(target: PipelineStatus) -> &'static str {
    match target {
        PipelineStatus::Updating => "update",
        PipelineStatus::Deleting | PipelineStatus::Deleted => "delete",
        _ => "modify",
    }
}

pub type Result<T> = std::result::Result<T, PipelineServiceError>;

/// Account context every pipeline is resolved against
#[derive(Debug, Clone)]
pub struct HomeContext {
    pub partition: String,
    pub account_id: String,
    pub region: String,
}

/// A provisioning run in flight
struct RunHandle {
    cancel: CancellationToken,
    done: watch::Receiver<bool>,
}

type Runs = Arc<Mutex<HashMap<Uuid, RunHandle>>>;

pub struct PipelineService {
    repo: Arc<dyn PipelineRepository>,
    lifecycle: Arc<LifecycleManager>,
    links: Arc<LinkRegistry>,
    provisioner: Provisioner,
    home: HomeContext,
    runs: Runs,
    operations: KeyedLocks,
}

impl PipelineService {
    pub fn new(
        repo: Arc<dyn PipelineRepository>,
        lifecycle: Arc<LifecycleManager>,
        links: Arc<LinkRegistry>,
        provisioner: Provisioner,
        home: HomeContext,
    ) -> Self {
        Self {
            repo,
            lifecycle,
            links,
            provisioner,
            home,
            runs: Arc::new(Mutex::new(HashMap::new())),
            operations: KeyedLocks::new(),
        }
    }

    /// Create a new pipeline and start provisioning it
    pub async fn create_pipeline(&self, req: CreatePipeline) -> Result<CreatedPipeline> {
        let spec = req.into_spec(&self.home.account_id, &self.home.region);
        let id = Uuid::new_v4();

        let link = self.link_for(&spec).await?;
        let graph = self.plan(id, &spec, link.as_ref())?;

        let record = PipelineRecord::new(id, spec);
        self.repo.insert(&record).await?;

        tracing::info!(
            pipeline_id = %id,
            source = %record.spec.source_type,
            buffer = %record.spec.buffer_type,
            engine = %record.spec.destination_engine,
            descriptors = graph.len(),
            "pipeline created"
        );

        self.start_run(id, |cancel| self.provisioner.provision(graph, cancel));
        Ok(CreatedPipeline { id })
    }

    /// Get a pipeline by ID
    pub async fn get_pipeline(&self, id: Uuid) -> Result<PipelineRecord> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or(PipelineServiceError::NotFound(id))
    }

    /// List pipelines, newest first
    pub async fn list_pipelines(&self, query: ListPipelines) -> Result<PipelinePage> {
        let (offset, limit) = query.bounds();
        let (pipelines, total) = self.repo.list(offset, limit).await?;

        Ok(PipelinePage {
            pipelines,
            total,
            page: query.page.max(1),
            count: limit as u32,
        })
    }

    /// Change lifecycle settings of an ACTIVE pipeline
    ///
    /// Only descriptors whose idempotency key changed are provisioned again,
    /// as updates of the resources that already exist.
    pub async fn update_pipeline(&self, id: Uuid, req: UpdatePipeline) -> Result<PipelineRecord> {
        req.lifecycle.validate()?;
        let _guard = self.operations.lock(id).await;

        let record = self.get_pipeline(id).await?;
        if record.status != PipelineStatus::Active {
            return Err(PipelineServiceError::InvalidState {
                id,
                status: record.status,
                operation: "update",
            });
        }

        let spec = record.spec.with_lifecycle(req.lifecycle);
        let link = self.link_for(&spec).await?;
        let current = self.plan(id, &record.spec, link.as_ref())?;
        let next = self.plan(id, &spec, link.as_ref())?;

        let changed: BTreeSet<String> = next
            .descriptors()
            .iter()
            .filter(|d| current.get(&d.id).map(|c| &c.idempotency_key) != Some(&d.idempotency_key))
            .map(|d| d.id.clone())
            .collect();

        let run = next.subset(&changed)?;

        let updating = self.lifecycle.begin_update(id, spec).await?;
        tracing::info!(pipeline_id = %id, changed = ?changed, "pipeline update started");

        if run.is_empty() {
            return Ok(self.lifecycle.complete_run(id).await?);
        }

        self.start_run(id, |cancel| self.provisioner.reprovision(run, cancel));
        Ok(updating)
    }

    /// Tear down a pipeline's resources and mark it DELETED
    ///
    /// A run still in flight is cancelled and allowed to settle first. When
    /// teardown fails the pipeline stays DELETING with the error set, and the
    /// delete can be retried.
    pub async fn delete_pipeline(&self, id: Uuid) -> Result<PipelineRecord> {
        let _guard = self.operations.lock(id).await;

        let record = self.get_pipeline(id).await?;
        if record.status.is_provisioning() {
            tracing::info!(pipeline_id = %id, status = %record.status, "cancelling provisioning run");
            self.cancel_run(id).await;
        }

        self.lifecycle.begin_delete(id).await?;

        let outcome = match self.graph_for(id, &record.spec).await {
            Ok(graph) => {
                let result = teardown(
                    self.provisioner.api().as_ref(),
                    &graph,
                    self.provisioner.retry_policy(),
                )
                .await
                .map_err(|e| e.to_string());
                if result.is_ok() {
                    self.provisioner.forget(&graph);
                }
                result
            }
            Err(err) => Err(err.to_string()),
        };

        Ok(self.lifecycle.finish_delete(id, outcome).await?)
    }

    /// Folds an out-of-band stack notification into the record
    pub async fn apply_stack_event(&self, id: Uuid, event: StackEvent) -> Result<PipelineRecord> {
        Ok(self.lifecycle.apply_stack_event(id, &event).await?)
    }

    /// Marks pipelines left in flight by a previous process as ERROR
    ///
    /// Runs live only in memory, so nothing will ever complete them.
    pub async fn recover_interrupted(&self) -> Result<usize> {
        let stale = self.repo.list_in_flight().await?;
        for record in &stale {
            tracing::warn!(pipeline_id = %record.id, status = %record.status, "marking interrupted pipeline as failed");
            self.lifecycle
                .fail(record.id, "provisioning interrupted by orchestrator restart")
                .await?;
        }
        Ok(stale.len())
    }

    /// Waits until the pipeline has no run in flight
    pub async fn wait_for_run(&self, id: Uuid) {
        let done = {
            let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
            runs.get(&id).map(|run| run.done.clone())
        };
        if let Some(mut done) = done {
            // A dropped sender also means the run is over
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    async fn cancel_run(&self, id: Uuid) {
        {
            let runs = self.runs.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(run) = runs.get(&id) {
                run.cancel.cancel();
            }
        }
        self.wait_for_run(id).await;
    }

    /// Link for a pipeline sourcing from a sub-account
    async fn link_for(&self, spec: &PipelineSpec) -> Result<Option<CrossAccountLink>> {
        if spec.account_id == self.home.account_id {
            return Ok(None);
        }

        match self.links.get(&spec.account_id).await? {
            Some(link) => Ok(Some(link)),
            None => Err(ValidationError::UnknownLinkedAccount(spec.account_id.clone()).into()),
        }
    }

    async fn graph_for(&self, id: Uuid, spec: &PipelineSpec) -> Result<DescriptorGraph> {
        let link = self.link_for(spec).await?;
        self.plan(id, spec, link.as_ref())
    }

    /// Resolves and composes the descriptor graph
    fn plan(
        &self,
        id: Uuid,
        spec: &PipelineSpec,
        link: Option<&CrossAccountLink>,
    ) -> Result<DescriptorGraph> {
        let graph = resolve(id, spec, link)?;
        let ctx = ComposeContext {
            partition: &self.home.partition,
            home_account_id: &self.home.account_id,
            spec,
        };
        Ok(compose(graph, &ctx)?)
    }

    fn start_run(&self, id: Uuid, start: impl FnOnce(CancellationToken) -> mpsc::Receiver<ProvisionEvent>) {
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(false);
        self.runs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                id,
                RunHandle {
                    cancel: cancel.clone(),
                    done: done_rx,
                },
            );

        let events = start(cancel);
        let lifecycle = Arc::clone(&self.lifecycle);
        let runs = Arc::clone(&self.runs);

        tokio::spawn(async move {
            fold_events(&lifecycle, id, events).await;
            runs.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            let _ = done_tx.send(true);
        });
    }
}

/// Applies every event of a run, then completes it when nothing failed
async fn fold_events(
    lifecycle: &LifecycleManager,
    id: Uuid,
    mut events: mpsc::Receiver<ProvisionEvent>,
) {
    let mut all_created = true;

    while let Some(event) = events.recv().await {
        tracing::debug!(
            pipeline_id = %id,
            descriptor = %event.descriptor_id,
            outcome = ?event.outcome,
            attempts = event.attempts,
            "provision event"
        );
        all_created &= event.is_created();
        if let Err(err) = lifecycle.apply_event(id, &event).await {
            tracing::error!(pipeline_id = %id, error = %err, "failed to record provision event");
        }
    }

    if all_created {
        if let Err(err) = lifecycle.complete_run(id).await {
            tracing::error!(pipeline_id = %id, error = %err, "failed to complete run");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioning::{InMemoryProvisioningApi, ProvisionError};
    use crate::service::test_support::{
        LINKED, Harness, cloudwatch_request, ec2_request, link_request, s3_request,
    };
    use logpipe_core::domain::pipeline::{BufferType, LifecyclePolicy};
    use logpipe_core::resolver::{
        CREATE_INDEX_TEMPLATE, DESTINATION_WIRING, PROCESSOR, QUEUE, SUBSCRIPTION_FILTER,
        resource_prefix,
    };
    use std::time::Duration;

    async fn create_and_settle(harness: &Harness, req: CreatePipeline) -> PipelineRecord {
        let created = harness.service.create_pipeline(req).await.unwrap();
        harness.service.wait_for_run(created.id).await;
        harness.service.get_pipeline(created.id).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_reaches_active() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;

        assert_eq!(record.status, PipelineStatus::Active);
        assert!(record.error.is_none());
        assert!(record.derived.queue_name.is_some());
        assert!(record.derived.dead_letter_queue_name.is_some());
        assert!(record.derived.processor_function_name.is_some());
        assert!(record.derived.stack_id.is_some());
        assert_eq!(harness.api.invocations().len(), 1);
    }

    #[tokio::test]
    async fn test_transient_errors_still_reach_active() {
        let harness = Harness::new();
        harness.api.fail_create(
            QUEUE,
            [
                ProvisionError::Transient("Throttling".into()),
                ProvisionError::Transient("Throttling".into()),
            ],
        );

        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;
        assert_eq!(record.status, PipelineStatus::Active);
        assert_eq!(harness.api.create_calls(QUEUE), 3);
        assert_eq!(harness.api.create_calls(PROCESSOR), 1);
    }

    #[tokio::test]
    async fn test_failure_names_first_failing_descriptor() {
        let harness = Harness::new();
        harness
            .api
            .fail_create(PROCESSOR, [ProvisionError::Configuration("invalid runtime".into())]);

        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;

        assert_eq!(record.status, PipelineStatus::Error);
        assert_eq!(
            record.error.as_deref(),
            Some("processor: configuration error: invalid runtime")
        );
        assert_eq!(harness.api.create_calls(DESTINATION_WIRING), 0);
    }

    #[tokio::test]
    async fn test_invalid_combination_is_rejected_before_provisioning() {
        let harness = Harness::new();
        let err = harness
            .service
            .create_pipeline(ec2_request(BufferType::None))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineServiceError::Invalid(ValidationError::InvalidBufferForSource { .. })
        ));
        assert_eq!(harness.api.total_create_calls(), 0);
        let page = harness.service.list_pipelines(ListPipelines::default()).await.unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn test_unlinked_sub_account_is_rejected() {
        let harness = Harness::new();
        let mut req = cloudwatch_request(BufferType::None);
        req.account_id = Some(LINKED.to_string());

        let err = harness.service.create_pipeline(req).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineServiceError::Invalid(ValidationError::UnknownLinkedAccount(_))
        ));
    }

    #[tokio::test]
    async fn test_linked_account_pipeline() {
        let harness = Harness::new();
        harness.links.link(link_request()).await.unwrap();

        let mut req = cloudwatch_request(BufferType::Kds);
        req.account_id = Some(LINKED.to_string());
        let record = create_and_settle(&harness, req).await;

        assert_eq!(record.status, PipelineStatus::Active);
        assert_eq!(record.spec.account_id, LINKED);
        assert_eq!(harness.api.create_calls(SUBSCRIPTION_FILTER), 1);
    }

    #[tokio::test]
    async fn test_update_reprovisions_only_changed_descriptors() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;
        let calls_before = harness.api.total_create_calls();

        let lifecycle = LifecyclePolicy {
            warm_age_days: Some(7),
            cold_age_days: Some(30),
            retain_age_days: Some(365),
            log_retention_days: 14,
        };
        harness
            .service
            .update_pipeline(record.id, UpdatePipeline { lifecycle: lifecycle.clone() })
            .await
            .unwrap();
        harness.service.wait_for_run(record.id).await;

        let updated = harness.service.get_pipeline(record.id).await.unwrap();
        assert_eq!(updated.status, PipelineStatus::Active);
        assert_eq!(updated.spec.lifecycle, lifecycle);

        // Only the wiring carries lifecycle ages, and it is updated in place
        assert_eq!(harness.api.total_create_calls(), calls_before);
        assert_eq!(harness.api.update_calls(DESTINATION_WIRING), 1);
        assert_eq!(harness.api.update_calls(PROCESSOR), 0);
        let invocations = harness.api.invocations();
        assert_eq!(invocations.len(), 2);
        assert!(invocations.iter().all(|(action, _)| action == CREATE_INDEX_TEMPLATE));
        assert_ne!(invocations[0].1, invocations[1].1);
    }

    #[tokio::test]
    async fn test_update_pushes_new_retention_to_processor() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;
        let processor = format!("{}-processor", resource_prefix(record.id));
        assert_eq!(
            harness.api.config_of(&processor).unwrap()["log_retention_days"],
            serde_json::json!(14)
        );

        let lifecycle = LifecyclePolicy {
            log_retention_days: 90,
            ..record.spec.lifecycle.clone()
        };
        harness
            .service
            .update_pipeline(record.id, UpdatePipeline { lifecycle })
            .await
            .unwrap();
        harness.service.wait_for_run(record.id).await;

        let updated = harness.service.get_pipeline(record.id).await.unwrap();
        assert_eq!(updated.status, PipelineStatus::Active);
        assert_eq!(updated.spec.lifecycle.log_retention_days, 90);
        assert_eq!(harness.api.update_calls(PROCESSOR), 1);
        assert_eq!(harness.api.create_calls(PROCESSOR), 1);
        assert_eq!(
            harness.api.config_of(&processor).unwrap()["log_retention_days"],
            serde_json::json!(90)
        );
    }

    #[tokio::test]
    async fn test_update_without_changes_completes_immediately() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::None)).await;
        let calls_before = harness.api.total_create_calls();

        let updated = harness
            .service
            .update_pipeline(
                record.id,
                UpdatePipeline {
                    lifecycle: record.spec.lifecycle.clone(),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.status, PipelineStatus::Active);
        assert_eq!(harness.api.total_create_calls(), calls_before);
    }

    #[tokio::test]
    async fn test_update_requires_active() {
        let harness = Harness::new();
        harness
            .api
            .fail_create(PROCESSOR, [ProvisionError::Configuration("bad".into())]);
        let record = create_and_settle(&harness, s3_request(BufferType::None)).await;

        let err = harness
            .service
            .update_pipeline(
                record.id,
                UpdatePipeline {
                    lifecycle: LifecyclePolicy::default(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineServiceError::InvalidState {
                status: PipelineStatus::Error,
                operation: "update",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_delete_tears_down_everything() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;
        assert!(harness.api.resource_count() > 0);

        let deleted = harness.service.delete_pipeline(record.id).await.unwrap();

        assert_eq!(deleted.status, PipelineStatus::Deleted);
        assert_eq!(harness.api.resource_count(), 0);
        // Still queryable for audit
        let stored = harness.service.get_pipeline(record.id).await.unwrap();
        assert_eq!(stored.status, PipelineStatus::Deleted);
    }

    #[tokio::test]
    async fn test_delete_failure_keeps_deleting_and_can_be_retried() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::Sqs)).await;
        harness
            .api
            .fail_delete(PROCESSOR, [ProvisionError::Configuration("in use".into())]);

        let first = harness.service.delete_pipeline(record.id).await.unwrap();
        assert_eq!(first.status, PipelineStatus::Deleting);
        assert!(first.error.as_deref().is_some_and(|e| e.contains("processor")));

        let second = harness.service.delete_pipeline(record.id).await.unwrap();
        assert_eq!(second.status, PipelineStatus::Deleted);
        assert_eq!(harness.api.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_cancels_run_in_flight() {
        let harness = Harness::with_api(
            InMemoryProvisioningApi::new().with_latency(Duration::from_millis(200)),
        );
        let created = harness
            .service
            .create_pipeline(s3_request(BufferType::Sqs))
            .await
            .unwrap();

        let deleted = harness.service.delete_pipeline(created.id).await.unwrap();

        assert_eq!(deleted.status, PipelineStatus::Deleted);
        assert_eq!(harness.api.create_calls(DESTINATION_WIRING), 0);
        assert_eq!(harness.api.resource_count(), 0);
    }

    #[tokio::test]
    async fn test_deleted_pipeline_cannot_be_deleted_again() {
        let harness = Harness::new();
        let record = create_and_settle(&harness, s3_request(BufferType::None)).await;
        harness.service.delete_pipeline(record.id).await.unwrap();

        let err = harness.service.delete_pipeline(record.id).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineServiceError::InvalidState {
                status: PipelineStatus::Deleted,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_list_pages() {
        let harness = Harness::new();
        for _ in 0..3 {
            create_and_settle(&harness, s3_request(BufferType::None)).await;
        }

        let page = harness
            .service
            .list_pipelines(ListPipelines { page: 2, count: 2 })
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.pipelines.len(), 1);
        assert_eq!(page.page, 2);
    }

    #[tokio::test]
    async fn test_recover_interrupted_runs() {
        let harness = Harness::new();
        let record = PipelineRecord::new(Uuid::new_v4(), crate::service::test_support::s3_spec());
        harness.repo.insert(&record).await.unwrap();

        assert_eq!(harness.service.recover_interrupted().await.unwrap(), 1);
        let stored = harness.service.get_pipeline(record.id).await.unwrap();
        assert_eq!(stored.status, PipelineStatus::Error);
        assert!(stored.error.is_some());
    }

    #[tokio::test]
    async fn test_get_missing_pipeline() {
        let harness = Harness::new();
        let missing = Uuid::new_v4();
        assert!(matches!(
            harness.service.get_pipeline(missing).await,
            Err(PipelineServiceError::NotFound(id)) if id == missing
        ));
    }
}
