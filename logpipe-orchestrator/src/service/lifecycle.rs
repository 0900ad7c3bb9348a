//! Pipeline lifecycle state machine
//!
//! The only writer of `PipelineRecord.status`. Provisioning events, operator
//! requests and out-of-band stack notifications are folded into the record
//! one at a time per pipeline id; different pipelines proceed in parallel.

use logpipe_core::domain::descriptor::ProvisionEvent;
use logpipe_core::domain::pipeline::{PipelineRecord, PipelineSpec, PipelineStatus};
use logpipe_core::dto::pipeline::StackEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::repository::{PipelineRepository, RepositoryError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    #[error("pipeline {id} cannot go from {from} to {to}")]
    InvalidTransition {
        id: Uuid,
        from: PipelineStatus,
        to: PipelineStatus,
    },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

pub type Result<T> = std::result::Result<T, LifecycleError>;

/// Async mutex per key, created on first use
///
/// A mutex referenced only by the map has no holder and no waiter; such idle
/// entries are dropped whenever another key is locked.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, id: Uuid) -> tokio::sync::OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(id).or_default())
        };
        lock.lock_owned().await
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

pub struct LifecycleManager {
    repo: Arc<dyn PipelineRepository>,
    locks: KeyedLocks,
}

impl LifecycleManager {
    pub fn new(repo: Arc<dyn PipelineRepository>) -> Self {
        Self {
            repo,
            locks: KeyedLocks::new(),
        }
    }

    /// Loads, mutates and stores a record under the pipeline's lock
    ///
    /// The record is only written back when `apply` returns true.
    async fn modify<F>(&self, id: Uuid, apply: F) -> Result<PipelineRecord>
    where
        F: FnOnce(&mut PipelineRecord) -> Result<bool>,
    {
        let _guard = self.locks.lock(id).await;

        let mut record = self
            .repo
            .find_by_id(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;

        if apply(&mut record)? {
            record.updated_at = chrono::Utc::now();
            if !self.repo.update(&record).await? {
                return Err(LifecycleError::NotFound(id));
            }
        }
        Ok(record)
    }

    /// Folds one provisioning event into the record
    ///
    /// Created events fill in derived names. The first Failed event of a run
    /// moves the pipeline to ERROR; later failures keep that first error.
    pub async fn apply_event(&self, id: Uuid, event: &ProvisionEvent) -> Result<PipelineRecord> {
        self.modify(id, |record| {
            if let Some(handle) = &event.handle {
                record.derived.record(handle);
            }

            if !event.is_created() && record.status.is_provisioning() {
                let detail = event.detail.as_deref().unwrap_or("failed");
                let error = format!("{}: {}", event.descriptor_id, detail);
                warn!(pipeline_id = %id, error = %error, "pipeline failed");
                set_status(record, PipelineStatus::Error)?;
                record.error = Some(error);
            }
            Ok(true)
        })
        .await
    }

    /// Marks a run whose descriptors were all created
    ///
    /// Ignored when the pipeline already left CREATING/UPDATING.
    pub async fn complete_run(&self, id: Uuid) -> Result<PipelineRecord> {
        self.modify(id, |record| {
            if !record.status.is_provisioning() {
                debug!(pipeline_id = %id, status = %record.status, "run completed after status change");
                return Ok(false);
            }
            set_status(record, PipelineStatus::Active)?;
            record.error = None;
            info!(pipeline_id = %id, "pipeline active");
            Ok(true)
        })
        .await
    }

    /// ACTIVE -> UPDATING with the new spec
    pub async fn begin_update(&self, id: Uuid, spec: PipelineSpec) -> Result<PipelineRecord> {
        self.modify(id, |record| {
            set_status(record, PipelineStatus::Updating)?;
            record.spec = spec;
            Ok(true)
        })
        .await
    }

    /// ACTIVE | ERROR | DELETING -> DELETING, clearing any previous error
    pub async fn begin_delete(&self, id: Uuid) -> Result<PipelineRecord> {
        self.modify(id, |record| {
            set_status(record, PipelineStatus::Deleting)?;
            record.error = None;
            Ok(true)
        })
        .await
    }

    /// DELETING -> DELETED, or stay DELETING with the teardown error
    pub async fn finish_delete(
        &self,
        id: Uuid,
        outcome: std::result::Result<(), String>,
    ) -> Result<PipelineRecord> {
        self.modify(id, |record| {
            match outcome {
                Ok(()) => {
                    set_status(record, PipelineStatus::Deleted)?;
                    info!(pipeline_id = %id, "pipeline deleted");
                }
                Err(error) => {
                    if record.status != PipelineStatus::Deleting {
                        return Err(LifecycleError::InvalidTransition {
                            id,
                            from: record.status,
                            to: PipelineStatus::Deleting,
                        });
                    }
                    warn!(pipeline_id = %id, error = %error, "teardown failed");
                    record.error = Some(error);
                }
            }
            Ok(true)
        })
        .await
    }

    /// Marks a pipeline whose run cannot be resumed
    pub async fn fail(&self, id: Uuid, error: impl Into<String>) -> Result<PipelineRecord> {
        let error = error.into();
        self.modify(id, |record| {
            set_status(record, PipelineStatus::Error)?;
            record.error = Some(error);
            Ok(true)
        })
        .await
    }

    /// Folds an out-of-band stack notification
    ///
    /// - `*_FAILED` / `*ROLLBACK*`: ERROR while CREATING or UPDATING, error
    ///   recorded while DELETING
    /// - `UPDATE_COMPLETE` while UPDATING: ACTIVE
    /// - `DELETE_COMPLETE` while DELETING: DELETED
    ///
    /// Everything else leaves the record untouched.
    pub async fn apply_stack_event(&self, id: Uuid, event: &StackEvent) -> Result<PipelineRecord> {
        let stack_status = event.stack_status.trim().to_ascii_uppercase();
        let failed = stack_status.ends_with("_FAILED") || stack_status.contains("ROLLBACK");

        self.modify(id, |record| {
            let error = || match &event.reason {
                Some(reason) => format!("stack: {}: {}", stack_status, reason),
                None => format!("stack: {}", stack_status),
            };

            match (record.status, stack_status.as_str()) {
                (status, _) if failed && status.is_provisioning() => {
                    set_status(record, PipelineStatus::Error)?;
                    record.error = Some(error());
                }
                (PipelineStatus::Deleting, _) if failed => {
                    record.error = Some(error());
                }
                (PipelineStatus::Updating, "UPDATE_COMPLETE") => {
                    set_status(record, PipelineStatus::Active)?;
                    record.error = None;
                }
                (PipelineStatus::Deleting, "DELETE_COMPLETE") => {
                    set_status(record, PipelineStatus::Deleted)?;
                    record.error = None;
                }
                (status, _) => {
                    debug!(pipeline_id = %id, %status, stack_status = %stack_status, "stack event ignored");
                    return Ok(false);
                }
            }

            info!(pipeline_id = %id, stack_status = %stack_status, status = %record.status, "stack event applied");
            Ok(true)
        })
        .await
    }
}

fn set_status(record: &mut PipelineRecord, next: PipelineStatus) -> Result<()> {
    if !record.status.can_transition_to(next) {
        return Err(LifecycleError::InvalidTransition {
            id: record.id,
            from: record.status,
            to: next,
        });
    }
    record.status = next;
    Ok(())
}
