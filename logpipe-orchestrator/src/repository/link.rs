//! Cross-account link Repository

use async_trait::async_trait;
use logpipe_core::domain::link::{CrossAccountLink, LinkStatus};
use sqlx::PgPool;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::repository::{LinkRepository, Result};

pub struct PgLinkRepository {
    pool: PgPool,
}

impl PgLinkRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LinkRepository for PgLinkRepository {
    async fn upsert(&self, link: &CrossAccountLink) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cross_account_links (
                id, sub_account_id, region, role_arn, bucket_name,
                stack_id, kms_key_arn, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (sub_account_id) DO UPDATE
            SET id = EXCLUDED.id, region = EXCLUDED.region, role_arn = EXCLUDED.role_arn,
                bucket_name = EXCLUDED.bucket_name, stack_id = EXCLUDED.stack_id,
                kms_key_arn = EXCLUDED.kms_key_arn, status = EXCLUDED.status,
                created_at = EXCLUDED.created_at
            "#,
        )
        .bind(link.id)
        .bind(&link.sub_account_id)
        .bind(&link.region)
        .bind(&link.role_arn)
        .bind(&link.bucket_name)
        .bind(&link.stack_id)
        .bind(&link.kms_key_arn)
        .bind(link.status.as_str())
        .bind(link.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_account(&self, sub_account_id: &str) -> Result<Option<CrossAccountLink>> {
        let row = sqlx::query_as::<_, LinkRow>(
            r#"
            SELECT id, sub_account_id, region, role_arn, bucket_name,
                   stack_id, kms_key_arn, status, created_at
            FROM cross_account_links
            WHERE sub_account_id = $1
            "#,
        )
        .bind(sub_account_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}

#[derive(sqlx::FromRow)]
struct LinkRow {
    id: Uuid,
    sub_account_id: String,
    region: String,
    role_arn: String,
    bucket_name: String,
    stack_id: String,
    kms_key_arn: String,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<LinkRow> for CrossAccountLink {
    fn from(row: LinkRow) -> Self {
        CrossAccountLink {
            id: row.id,
            sub_account_id: row.sub_account_id,
            region: row.region,
            role_arn: row.role_arn,
            bucket_name: row.bucket_name,
            stack_id: row.stack_id,
            kms_key_arn: row.kms_key_arn,
            status: LinkStatus::from_str_lossy(&row.status),
            created_at: row.created_at,
        }
    }
}

#[derive(Default)]
pub struct InMemoryLinkRepository {
    links: RwLock<HashMap<String, CrossAccountLink>>,
}

impl InMemoryLinkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LinkRepository for InMemoryLinkRepository {
    async fn upsert(&self, link: &CrossAccountLink) -> Result<()> {
        self.links
            .write()
            .await
            .insert(link.sub_account_id.clone(), link.clone());
        Ok(())
    }

    async fn find_by_account(&self, sub_account_id: &str) -> Result<Option<CrossAccountLink>> {
        Ok(self.links.read().await.get(sub_account_id).cloned())
    }
}
