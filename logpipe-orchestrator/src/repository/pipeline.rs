//! Pipeline Repository
//!
//! Persists pipeline records. The pipeline spec and the derived resource names are
//! stored as JSONB; status is stored by name.

use async_trait::async_trait;
use logpipe_core::domain::pipeline::{
    DerivedResourceNames, PipelineRecord, PipelineSpec, PipelineStatus,
};
use sqlx::PgPool;
use sqlx::types::Json;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{PipelineRepository, RepositoryError, Result};

pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn insert(&self, record: &PipelineRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO pipelines (id, spec, status, error, derived, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(record.id)
        .bind(Json(&record.spec))
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(Json(&record.derived))
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRecord>> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, spec, status, error, derived, created_at, updated_at
            FROM pipelines
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PipelineRecord::try_from).transpose()
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<PipelineRecord>, u64)> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, spec, status, error, derived, created_at, updated_at
            FROM pipelines
            ORDER BY created_at DESC, id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;

        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pipelines")
            .fetch_one(&self.pool)
            .await?;

        let records = rows
            .into_iter()
            .map(PipelineRecord::try_from)
            .collect::<Result<Vec<_>>>()?;
        Ok((records, total.max(0) as u64))
    }

    async fn list_in_flight(&self) -> Result<Vec<PipelineRecord>> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, spec, status, error, derived, created_at, updated_at
            FROM pipelines
            WHERE status IN ('CREATING', 'UPDATING')
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PipelineRecord::try_from).collect()
    }

    async fn update(&self, record: &PipelineRecord) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET spec = $1, status = $2, error = $3, derived = $4, updated_at = $5
            WHERE id = $6
            "#,
        )
        .bind(Json(&record.spec))
        .bind(record.status.as_str())
        .bind(&record.error)
        .bind(Json(&record.derived))
        .bind(record.updated_at)
        .bind(record.id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    spec: Json<PipelineSpec>,
    status: String,
    error: Option<String>,
    derived: Json<DerivedResourceNames>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PipelineRow> for PipelineRecord {
    type Error = RepositoryError;

    fn try_from(row: PipelineRow) -> Result<Self> {
        let status = row
            .status
            .parse::<PipelineStatus>()
            .map_err(|reason| RepositoryError::Corrupt {
                id: row.id.to_string(),
                reason,
            })?;

        Ok(PipelineRecord {
            id: row.id,
            spec: row.spec.0,
            status,
            error: row.error,
            created_at: row.created_at,
            updated_at: row.updated_at,
            derived: row.derived.0,
        })
    }
}

// =============================================================================
// In-memory implementation
// =============================================================================

#[derive(Default)]
pub struct InMemoryPipelineRepository {
    records: RwLock<HashMap<Uuid, PipelineRecord>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn insert(&self, record: &PipelineRecord) -> Result<()> {
        self.records.write().await.insert(record.id, record.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<PipelineRecord>> {
        Ok(self.records.read().await.get(&id).cloned())
    }

    async fn list(&self, offset: u64, limit: u64) -> Result<(Vec<PipelineRecord>, u64)> {
        let records = self.records.read().await;
        let mut all: Vec<&PipelineRecord> = records.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let page = all
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok((page, records.len() as u64))
    }

    async fn list_in_flight(&self) -> Result<Vec<PipelineRecord>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .filter(|r| r.status.is_provisioning())
            .cloned()
            .collect())
    }

    async fn update(&self, record: &PipelineRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
