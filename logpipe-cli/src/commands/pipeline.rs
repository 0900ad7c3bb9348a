//! Pipeline command handlers
//!
//! Handles all pipeline-related CLI commands including creation, listing,
//! viewing, lifecycle updates and deletion.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use logpipe_client::OrchestratorClient;
use logpipe_core::domain::pipeline::{
    DestinationConfig, LifecyclePolicy, PipelineRecord, PipelineStatus,
};
use logpipe_core::dto::pipeline::{CreatePipeline, ListPipelines, UpdatePipeline};
use std::time::Duration;
use uuid::Uuid;

use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Create a new pipeline from a JSON definition
    Create {
        /// Path to the pipeline definition (JSON)
        #[arg(short, long)]
        file: String,

        /// Source account, when different from the one in the file
        #[arg(long)]
        account_id: Option<String>,

        /// Source region, when different from the one in the file
        #[arg(long)]
        region: Option<String>,

        /// Wait until provisioning settles
        #[arg(short, long)]
        wait: bool,
    },
    /// List pipelines, newest first
    List {
        #[arg(long, default_value = "1")]
        page: u32,

        #[arg(long, default_value = "20")]
        count: u32,
    },
    /// Get pipeline details
    Get {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Change the retention settings of an active pipeline
    Update {
        /// Pipeline ID or unambiguous prefix
        id: String,

        #[arg(long)]
        warm_age_days: Option<u32>,

        #[arg(long)]
        cold_age_days: Option<u32>,

        #[arg(long)]
        retain_age_days: Option<u32>,

        #[arg(long)]
        log_retention_days: Option<u32>,

        /// Wait until the update settles
        #[arg(short, long)]
        wait: bool,
    },
    /// Delete a pipeline and tear down its resources
    Delete {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
}

/// Interval between status polls with `--wait`
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Handle pipeline commands
///
/// Routes pipeline subcommands to their respective handlers.
pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Create {
            file,
            account_id,
            region,
            wait,
        } => create_pipeline(&client, &file, account_id, region, wait).await,
        PipelineCommands::List { page, count } => {
            list_pipelines(&client, ListPipelines { page, count }).await
        }
        PipelineCommands::Get { id } => get_pipeline(&client, &id).await,
        PipelineCommands::Update {
            id,
            warm_age_days,
            cold_age_days,
            retain_age_days,
            log_retention_days,
            wait,
        } => {
            let overrides = LifecycleOverrides {
                warm_age_days,
                cold_age_days,
                retain_age_days,
                log_retention_days,
            };
            update_pipeline(&client, &id, overrides, wait).await
        }
        PipelineCommands::Delete { id } => delete_pipeline(&client, &id).await,
    }
}

/// Create a new pipeline from a definition file
async fn create_pipeline(
    client: &OrchestratorClient,
    path: &str,
    account_id: Option<String>,
    region: Option<String>,
    wait: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline definition: {}", path))?;
    let mut req: CreatePipeline = serde_json::from_str(&content)
        .with_context(|| format!("Invalid pipeline definition in {}", path))?;

    if account_id.is_some() {
        req.account_id = account_id;
    }
    if region.is_some() {
        req.region = region;
    }

    let created = client.create_pipeline(req).await?;

    println!("{}", "✓ Pipeline created, provisioning started".green().bold());
    println!("  ID: {}", created.id.to_string().cyan());

    if wait {
        let record = wait_until_settled(client, created.id).await?;
        println!();
        print_pipeline_details(&record);
    }

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient, query: ListPipelines) -> Result<()> {
    let page = client.list_pipelines(query).await?;

    if page.pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
    } else {
        println!(
            "{}",
            format!(
                "Showing {} of {} pipeline(s), page {}:",
                page.pipelines.len(),
                page.total,
                page.page
            )
            .bold()
        );
        println!();
        for pipeline in &page.pipelines {
            print_pipeline_summary(pipeline);
        }
    }

    Ok(())
}

/// Get and display a single pipeline
async fn get_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.get_pipeline(uuid).await?;

    print_pipeline_details(&pipeline);

    Ok(())
}

/// Lifecycle fields given on the command line
#[derive(Debug, Default, Clone, Copy)]
struct LifecycleOverrides {
    warm_age_days: Option<u32>,
    cold_age_days: Option<u32>,
    retain_age_days: Option<u32>,
    log_retention_days: Option<u32>,
}

impl LifecycleOverrides {
    fn is_empty(&self) -> bool {
        self.warm_age_days.is_none()
            && self.cold_age_days.is_none()
            && self.retain_age_days.is_none()
            && self.log_retention_days.is_none()
    }

    /// Applies the given fields on top of the current policy
    fn apply(self, current: &LifecyclePolicy) -> LifecyclePolicy {
        LifecyclePolicy {
            warm_age_days: self.warm_age_days.or(current.warm_age_days),
            cold_age_days: self.cold_age_days.or(current.cold_age_days),
            retain_age_days: self.retain_age_days.or(current.retain_age_days),
            log_retention_days: self
                .log_retention_days
                .unwrap_or(current.log_retention_days),
        }
    }
}

async fn update_pipeline(
    client: &OrchestratorClient,
    id: &str,
    overrides: LifecycleOverrides,
    wait: bool,
) -> Result<()> {
    if overrides.is_empty() {
        anyhow::bail!("Nothing to update: pass at least one lifecycle option");
    }

    let uuid = resolve_pipeline_id(client, id).await?;
    let current = client.get_pipeline(uuid).await?;
    let lifecycle = overrides.apply(&current.spec.lifecycle);

    let mut record = client
        .update_pipeline(uuid, UpdatePipeline { lifecycle })
        .await?;
    println!(
        "{}",
        format!("✓ Update accepted for pipeline {}", uuid).green().bold()
    );

    if wait {
        record = wait_until_settled(client, uuid).await?;
    }
    println!("  Status: {}", colorize_status(record.status));

    Ok(())
}

/// Delete a pipeline
///
/// The orchestrator answers once teardown has finished or stopped on an error.
async fn delete_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let record = client.delete_pipeline(uuid).await?;

    match record.status {
        PipelineStatus::Deleted => println!(
            "{}",
            format!("✓ Pipeline {} deleted successfully!", uuid)
                .green()
                .bold()
        ),
        status => {
            println!(
                "{}",
                format!("✗ Pipeline {} is still {}", uuid, status).red().bold()
            );
            if let Some(error) = &record.error {
                println!("  Error: {}", error.red());
            }
            println!("  Run the delete again to retry teardown.");
        }
    }

    Ok(())
}

/// Polls until the pipeline leaves CREATING/UPDATING
async fn wait_until_settled(client: &OrchestratorClient, id: Uuid) -> Result<PipelineRecord> {
    loop {
        let record = client.get_pipeline(id).await?;
        if !record.status.is_provisioning() {
            return Ok(record);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

fn print_pipeline_summary(pipeline: &PipelineRecord) {
    println!(
        "  {} {} {}",
        "▸".cyan(),
        pipeline.id.to_string().bold(),
        colorize_status(pipeline.status)
    );
    println!(
        "    Source:  {} via {} into {}",
        pipeline.spec.source_type, pipeline.spec.buffer_type, pipeline.spec.destination_engine
    );
    println!(
        "    Account: {}",
        format!("{} ({})", pipeline.spec.account_id, pipeline.spec.region).dimmed()
    );
    println!(
        "    Created: {}",
        pipeline
            .created_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_pipeline_details(pipeline: &PipelineRecord) {
    let spec = &pipeline.spec;

    println!("{}", "Pipeline Details:".bold());
    println!("  ID:          {}", pipeline.id.to_string().cyan());
    println!("  Status:      {}", colorize_status(pipeline.status));
    if let Some(error) = &pipeline.error {
        println!("  Error:       {}", error.red());
    }
    println!("  Source:      {} ({})", spec.source_type, spec.log_type);
    println!("  Buffer:      {}", spec.buffer_type);
    match &spec.destination {
        DestinationConfig::Index {
            domain_arn,
            index_prefix,
            ..
        } => println!(
            "  Destination: {} index {} on {}",
            spec.destination_engine, index_prefix, domain_arn
        ),
        DestinationConfig::Table {
            database,
            table_name,
            ..
        } => println!(
            "  Destination: {} table {}.{}",
            spec.destination_engine, database, table_name
        ),
    }
    println!("  Account:     {} ({})", spec.account_id, spec.region);
    println!(
        "  Created:     {}",
        pipeline.created_at.format("%Y-%m-%d %H:%M:%S")
    );
    println!(
        "  Updated:     {}",
        pipeline.updated_at.format("%Y-%m-%d %H:%M:%S")
    );

    let lifecycle = &spec.lifecycle;
    println!("\n{}", "Lifecycle:".bold());
    println!("  Warm after:    {}", days(lifecycle.warm_age_days));
    println!("  Cold after:    {}", days(lifecycle.cold_age_days));
    println!("  Retain for:    {}", days(lifecycle.retain_age_days));
    println!("  Log retention: {} days", lifecycle.log_retention_days);

    let derived = &pipeline.derived;
    let names = [
        ("Queue", &derived.queue_name),
        ("Dead letter", &derived.dead_letter_queue_name),
        ("Stream", &derived.stream_name),
        ("Processor", &derived.processor_function_name),
        ("Processor logs", &derived.processor_log_group_name),
        ("Agent role", &derived.agent_role_name),
        ("Subscription", &derived.subscription_filter_name),
        ("Syslog", &derived.syslog_endpoint),
        ("Stack", &derived.stack_id),
    ];
    if names.iter().any(|(_, value)| value.is_some()) {
        println!("\n{}", "Resources:".bold());
        for (label, value) in names {
            if let Some(value) = value {
                println!("  {:<15} {}", format!("{}:", label), value.dimmed());
            }
        }
    }
}

fn days(value: Option<u32>) -> String {
    value
        .map(|d| format!("{} days", d))
        .unwrap_or_else(|| "-".to_string())
}

fn colorize_status(status: PipelineStatus) -> ColoredString {
    let label = status.to_string();
    match status {
        PipelineStatus::Active => label.green(),
        PipelineStatus::Creating | PipelineStatus::Updating => label.cyan(),
        PipelineStatus::Deleting => label.yellow(),
        PipelineStatus::Error => label.red(),
        PipelineStatus::Deleted => label.dimmed(),
    }
}
