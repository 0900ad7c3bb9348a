//! Repository Module
//!
//! Data access layer for the orchestrator.
//! Each repository is a trait with a Postgres implementation and an in-memory
//! one, selected at startup.

pub mod link;
pub mod pipeline;

use async_trait::async_trait;
use logpipe_core::domain::link::CrossAccountLink;
use logpipe_core::domain::pipeline::PipelineRecord;
use thiserror::Error;
use uuid::Uuid;

pub use link::{InMemoryLinkRepository, PgLinkRepository};
pub use pipeline::{InMemoryPipelineRepository, PgPipelineRepository};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("corrupt row {id}: {reason}")]
    Corrupt { id: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn insert(&self, record: &PipelineRecord) -> Result<()>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRecord>>;

    /// Newest first, with the total number of records
    async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<PipelineRecord>, u64)>;

    /// Records left in CREATING or UPDATING
    async fn list_in_flight(&self) -> Result<Vec<PipelineRecord>>;

    /// Overwrites the mutable columns; returns false when the record is missing
    async fn update(&self, record: &PipelineRecord) -> Result<bool>;
}

#[async_trait]
pub trait LinkRepository: Send + Sync {
    /// Stores a link, replacing any existing link of the same sub-account
    async fn upsert(&self, link: &CrossAccountLink) -> Result<()>;

    async fn find_by_account(&self, sub_account_id: &str) -> Result<Option<CrossAccountLink>>;
}
