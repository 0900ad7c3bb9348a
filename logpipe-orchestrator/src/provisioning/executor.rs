//! Provisioning run executor
//!
//! One coordinator task per run owns every descriptor state. It starts a worker
//! for each descriptor whose dependencies are all Created; workers only report
//! outcomes back. Workers across all runs share one semaphore, which bounds the
//! number of concurrent backend calls.
//!
//! Each descriptor ends in exactly one event:
//! - `Created` once the resource exists and its post-provision action succeeded
//! - `Failed` with the error detail, after retries for transient errors
//! - `Failed` with `blocked_by:<id>` when an upstream descriptor failed; nothing
//!   is called for it
//!
//! An update run applies changed configs to resources that already exist. A
//! resource missing from the backend is created instead.
//!
//! Cancellation is raced against every backend call and backoff sleep. A
//! cancelled descriptor fails with detail `cancelled`, which cascades like any
//! other failure.

use std::collections::HashMap;
use std::sync::Arc;

use logpipe_core::domain::descriptor::{
    DescriptorId, Principal, ProvisionEvent, ResourceDescriptor, ResourceHandle,
};
use logpipe_core::domain::link::LinkStatus;
use logpipe_core::graph::DescriptorGraph;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::provisioning::{IdempotencyCache, LinkDirectory, ProvisionError, ProvisioningApi, RetryPolicy};

/// Whether a run creates resources or updates existing ones
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunMode {
    Create,
    Update,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunState {
    Pending,
    InProgress,
    Created,
    Failed,
}

/// Shared provisioning engine
///
/// Cheap to clone; clones share the worker pool and the de-duplication cache.
#[derive(Clone)]
pub struct Provisioner {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn ProvisioningApi>,
    links: Arc<dyn LinkDirectory>,
    dedup: IdempotencyCache,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl Provisioner {
    pub fn new(
        api: Arc<dyn ProvisioningApi>,
        links: Arc<dyn LinkDirectory>,
        concurrency: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                links,
                dedup: IdempotencyCache::new(),
                permits: Arc::new(Semaphore::new(concurrency.max(1))),
                retry,
            }),
        }
    }

    pub fn api(&self) -> Arc<dyn ProvisioningApi> {
        Arc::clone(&self.inner.api)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.inner.retry
    }

    /// Starts a run; events arrive in completion order
    pub fn provision(
        &self,
        graph: DescriptorGraph,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProvisionEvent> {
        self.start(graph, RunMode::Create, cancel)
    }

    /// Starts a run that pushes changed configs to existing resources
    pub fn reprovision(
        &self,
        graph: DescriptorGraph,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProvisionEvent> {
        self.start(graph, RunMode::Update, cancel)
    }

    /// Drops cached action outcomes for resources that were torn down
    pub fn forget(&self, graph: &DescriptorGraph) {
        self.inner
            .dedup
            .forget(graph.descriptors().iter().map(|d| d.name.as_str()));
    }

    fn start(
        &self,
        graph: DescriptorGraph,
        mode: RunMode,
        cancel: CancellationToken,
    ) -> mpsc::Receiver<ProvisionEvent> {
        let (tx, rx) = mpsc::channel(graph.len().max(1));
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Coordinator::new(inner, graph, mode, cancel).run(tx).await;
        });
        rx
    }
}

struct Coordinator {
    inner: Arc<Inner>,
    graph: DescriptorGraph,
    mode: RunMode,
    cancel: CancellationToken,
    states: HashMap<DescriptorId, RunState>,
}

impl Coordinator {
    fn new(inner: Arc<Inner>, graph: DescriptorGraph, mode: RunMode, cancel: CancellationToken) -> Self {
        let states = graph
            .topological_order()
            .iter()
            .map(|id| (id.clone(), RunState::Pending))
            .collect();
        Self {
            inner,
            graph,
            mode,
            cancel,
            states,
        }
    }

    async fn run(mut self, tx: mpsc::Sender<ProvisionEvent>) {
        let mut workers: JoinSet<ProvisionEvent> = JoinSet::new();
        info!(descriptors = self.graph.len(), mode = ?self.mode, "provisioning run started");

        loop {
            for descriptor in self.ready() {
                self.states.insert(descriptor.id.clone(), RunState::InProgress);
                let inner = Arc::clone(&self.inner);
                let cancel = self.cancel.clone();
                let mode = self.mode;
                workers.spawn(async move {
                    // A panicking backend call still has to end in an event
                    let fallback = descriptor.clone();
                    match tokio::spawn(provision_one(inner, descriptor, mode, cancel)).await {
                        Ok(event) => event,
                        Err(err) => ProvisionEvent::failed(&fallback, format!("worker aborted: {err}"), 0),
                    }
                });
            }

            let Some(joined) = workers.join_next().await else {
                break;
            };
            let event = match joined {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "provisioning worker lost");
                    continue;
                }
            };
            self.settle(event, &tx).await;
        }

        let created = self
            .states
            .values()
            .filter(|s| **s == RunState::Created)
            .count();
        info!(
            created,
            failed = self.states.len() - created,
            "provisioning run finished"
        );
    }

    /// Pending descriptors whose dependencies are all Created, in topological order
    fn ready(&self) -> Vec<ResourceDescriptor> {
        self.graph
            .topological_order()
            .iter()
            .filter(|id| self.states.get(*id) == Some(&RunState::Pending))
            .filter_map(|id| self.graph.get(id))
            .filter(|d| {
                d.depends_on
                    .iter()
                    .all(|dep| self.states.get(dep) == Some(&RunState::Created))
            })
            .cloned()
            .collect()
    }

    async fn settle(&mut self, event: ProvisionEvent, tx: &mpsc::Sender<ProvisionEvent>) {
        let failed_id = event.descriptor_id.clone();
        let created = event.is_created();
        self.states.insert(
            failed_id.clone(),
            if created { RunState::Created } else { RunState::Failed },
        );
        // Receiver may be gone; the run still completes
        let _ = tx.send(event).await;

        if created {
            return;
        }

        for dependent in self.graph.transitive_dependents(&failed_id) {
            if self.states.get(&dependent) != Some(&RunState::Pending) {
                continue;
            }
            self.states.insert(dependent.clone(), RunState::Failed);
            if let Some(descriptor) = self.graph.get(&dependent) {
                debug!(descriptor = %dependent, blocked_by = %failed_id, "descriptor blocked");
                let _ = tx.send(ProvisionEvent::blocked(descriptor, &failed_id)).await;
            }
        }
    }
}

async fn provision_one(
    inner: Arc<Inner>,
    descriptor: ResourceDescriptor,
    mode: RunMode,
    cancel: CancellationToken,
) -> ProvisionEvent {
    if cancel.is_cancelled() {
        return ProvisionEvent::failed(&descriptor, ProvisionError::Cancelled.detail(), 0);
    }

    let _permit = tokio::select! {
        permit = Arc::clone(&inner.permits).acquire_owned() => match permit {
            Ok(permit) => permit,
            Err(_) => return ProvisionEvent::failed(&descriptor, "provisioning pool closed", 0),
        },
        _ = cancel.cancelled() => {
            return ProvisionEvent::failed(&descriptor, ProvisionError::Cancelled.detail(), 0);
        }
    };

    if let Err(err) = check_link(&inner, &descriptor).await {
        warn!(descriptor = %descriptor.id, error = %err, "cross-account check failed");
        return ProvisionEvent::failed(&descriptor, err.detail(), 1);
    }

    let mut attempt = 0;
    loop {
        attempt += 1;
        let result = tokio::select! {
            result = attempt_once(&inner, &descriptor, mode) => result,
            _ = cancel.cancelled() => Err(ProvisionError::Cancelled),
        };

        match result {
            Ok(handle) => {
                debug!(descriptor = %descriptor.id, attempt, "descriptor created");
                return ProvisionEvent::created(&descriptor, handle, attempt);
            }
            Err(err) if err.is_retryable() && inner.retry.should_retry(attempt) => {
                let delay = inner.retry.compute_backoff(attempt);
                warn!(
                    descriptor = %descriptor.id,
                    attempt,
                    max_attempts = inner.retry.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provisioning error, retrying"
                );
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = cancel.cancelled() => {
                        return ProvisionEvent::failed(&descriptor, ProvisionError::Cancelled.detail(), attempt);
                    }
                }
            }
            Err(err) => {
                warn!(descriptor = %descriptor.id, attempt, error = %err, "descriptor failed");
                return ProvisionEvent::failed(&descriptor, err.detail(), attempt);
            }
        }
    }
}

/// Cross-account descriptors need a registered link for their role
async fn check_link(inner: &Inner, descriptor: &ResourceDescriptor) -> Result<(), ProvisionError> {
    let Some(Principal::CrossAccount {
        account_id,
        role_arn,
    }) = &descriptor.principal
    else {
        return Ok(());
    };

    match inner.links.lookup(account_id).await {
        None => Err(ProvisionError::AssumeRoleFailed {
            role_arn: role_arn.clone(),
            reason: format!("account {account_id} is not linked"),
        }),
        Some(link) if link.role_arn != *role_arn => Err(ProvisionError::AssumeRoleFailed {
            role_arn: role_arn.clone(),
            reason: format!("linked role for {account_id} is {}", link.role_arn),
        }),
        Some(link) => {
            if link.status == LinkStatus::Unverified {
                warn!(
                    descriptor = %descriptor.id,
                    account_id = %account_id,
                    "using unverified cross-account link"
                );
            }
            Ok(())
        }
    }
}

/// One create or update attempt followed by the post-provision action
async fn attempt_once(
    inner: &Inner,
    descriptor: &ResourceDescriptor,
    mode: RunMode,
) -> Result<ResourceHandle, ProvisionError> {
    let handle = match mode {
        RunMode::Create => create(inner, descriptor).await?,
        RunMode::Update => match inner.api.update_resource(descriptor).await {
            Ok(handle) => handle,
            Err(ProvisionError::NotFound(_)) => {
                debug!(descriptor = %descriptor.id, "resource missing, creating it");
                create(inner, descriptor).await?
            }
            Err(err) => return Err(err),
        },
    };

    if let Some(action) = &descriptor.post_provision {
        let key = &descriptor.idempotency_key;
        if inner.dedup.get(&descriptor.name, key).is_some() {
            debug!(descriptor = %descriptor.id, action = %action.action, "post-provision action already completed");
        } else {
            let outcome = inner.api.invoke_idempotent(action, key).await?;
            inner.dedup.record(&descriptor.name, key, outcome);
        }
    }

    Ok(handle)
}

async fn create(inner: &Inner, descriptor: &ResourceDescriptor) -> Result<ResourceHandle, ProvisionError> {
    match inner.api.create_resource(descriptor).await {
        Ok(handle) => Ok(handle),
        Err(ProvisionError::AlreadyExists(_)) => {
            debug!(descriptor = %descriptor.id, "resource already exists");
            Ok(ResourceHandle::for_descriptor(descriptor))
        }
        Err(err) => Err(err),
    }
}
