//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod link;
mod pipeline;

pub use link::LinkCommands;
pub use pipeline::PipelineCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline management
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Cross-account links
    Link {
        #[command(subcommand)]
        command: LinkCommands,
    },
    /// Check that the orchestrator is reachable
    Health,
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Link { command } => link::handle_link_command(command, config).await,
        Commands::Health => {
            config.client().health().await?;
            println!(
                "{}",
                format!("✓ Orchestrator at {} is healthy", config.orchestrator_url).green()
            );
            Ok(())
        }
    }
}
