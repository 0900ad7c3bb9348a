//! Logpipe Orchestrator
//!
//! HTTP service that creates and manages log-ingestion pipelines.
//!
//! Architecture:
//! - API: axum handlers for pipelines and cross-account links
//! - Services: pipeline operations, link registry, lifecycle state machine
//! - Provisioning: descriptor graph execution against a provisioning backend
//! - Repositories: Postgres or in-memory persistence

use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod provisioning;
pub mod repository;
pub mod service;

use crate::config::{Config, StorageBackend};
use crate::provisioning::{HttpProvisioningApi, InMemoryProvisioningApi, Provisioner, ProvisioningApi};
use crate::repository::{
    InMemoryLinkRepository, InMemoryPipelineRepository, LinkRepository, PgLinkRepository,
    PgPipelineRepository, PipelineRepository,
};
use crate::service::{
    HomeContext, HttpRoleVerifier, LifecycleManager, LinkRegistry, PipelineService, RoleVerifier,
    StaticRoleVerifier,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "logpipe_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Logpipe Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    tracing::info!(
        home_account_id = %config.home_account_id,
        home_region = %config.home_region,
        storage = ?config.storage,
        concurrency = config.concurrency,
        "Configuration loaded"
    );

    let (pipeline_repo, link_repo) = create_repositories(&config).await?;

    let verifier: Arc<dyn RoleVerifier> = match &config.role_check_url {
        Some(url) => Arc::new(HttpRoleVerifier::new(url.clone())),
        None => {
            tracing::warn!("ROLE_CHECK_URL not set, links will be stored as Unverified");
            Arc::new(StaticRoleVerifier::new(false))
        }
    };

    let backend: Arc<dyn ProvisioningApi> = match &config.provisioner_url {
        Some(url) => Arc::new(HttpProvisioningApi::new(url.clone())),
        None => {
            tracing::warn!("PROVISIONER_URL not set, using the in-memory provisioning backend");
            Arc::new(InMemoryProvisioningApi::new())
        }
    };

    let links = Arc::new(LinkRegistry::new(link_repo, verifier, config.home_region.clone()));
    let provisioner = Provisioner::new(
        backend,
        links.clone(),
        config.concurrency,
        config.retry_policy(),
    );
    let lifecycle = Arc::new(LifecycleManager::new(pipeline_repo.clone()));
    let pipelines = Arc::new(PipelineService::new(
        pipeline_repo,
        lifecycle,
        links.clone(),
        provisioner,
        HomeContext {
            partition: config.partition.clone(),
            account_id: config.home_account_id.clone(),
            region: config.home_region.clone(),
        },
    ));

    let interrupted = pipelines
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted pipelines")?;
    if interrupted > 0 {
        tracing::warn!("{} pipeline(s) were left in flight and marked as ERROR", interrupted);
    }

    // Build router with all API endpoints
    let app = api::create_router(api::AppState { pipelines, links });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .await
        .context("Failed to start server")?;

    Ok(())
}

async fn create_repositories(
    config: &Config,
) -> anyhow::Result<(Arc<dyn PipelineRepository>, Arc<dyn LinkRepository>)> {
    match config.storage {
        StorageBackend::Postgres => {
            tracing::info!("Connecting to database...");
            let pool = db::create_pool(&config.database_url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok((
                Arc::new(PgPipelineRepository::new(pool.clone())),
                Arc::new(PgLinkRepository::new(pool)),
            ))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage, records are lost on restart");
            Ok((
                Arc::new(InMemoryPipelineRepository::new()),
                Arc::new(InMemoryLinkRepository::new()),
            ))
        }
    }
}
