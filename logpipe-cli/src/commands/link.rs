//! Cross-account link command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use logpipe_core::domain::link::{CrossAccountLink, LinkStatus};
use logpipe_core::dto::link::LinkAccount;

use crate::config::Config;

/// Link subcommands
#[derive(Subcommand)]
pub enum LinkCommands {
    /// Link a sub-account, replacing any existing link for it
    Create {
        /// 12 digit sub-account id
        #[arg(long)]
        sub_account_id: String,

        #[arg(long)]
        region: String,

        /// Role the orchestrator assumes in the sub-account
        #[arg(long)]
        role_arn: String,

        /// Staging bucket in the sub-account
        #[arg(long)]
        bucket_name: String,

        #[arg(long)]
        stack_id: String,

        #[arg(long)]
        kms_key_arn: String,
    },
    /// Show the link for a sub-account
    Get {
        sub_account_id: String,
    },
}

pub async fn handle_link_command(command: LinkCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        LinkCommands::Create {
            sub_account_id,
            region,
            role_arn,
            bucket_name,
            stack_id,
            kms_key_arn,
        } => {
            let created = client
                .link_account(LinkAccount {
                    sub_account_id: sub_account_id.clone(),
                    region,
                    role_arn,
                    bucket_name,
                    stack_id,
                    kms_key_arn,
                })
                .await?;

            println!(
                "{}",
                format!("✓ Account {} linked", sub_account_id).green().bold()
            );
            println!("  Link ID: {}", created.link_id.to_string().cyan());
            println!("  Status:  {}", colorize_status(created.status));
            if created.status == LinkStatus::Unverified {
                println!(
                    "  {}",
                    "The role could not be reached; provisioning will fail until it is.".yellow()
                );
            }
            Ok(())
        }
        LinkCommands::Get { sub_account_id } => {
            let link = client.get_link(&sub_account_id).await?;
            print_link(&link);
            Ok(())
        }
    }
}

fn print_link(link: &CrossAccountLink) {
    println!("{}", "Link Details:".bold());
    println!("  ID:          {}", link.id.to_string().cyan());
    println!("  Account:     {}", link.sub_account_id.bold());
    println!("  Region:      {}", link.region);
    println!("  Status:      {}", colorize_status(link.status));
    println!("  Role:        {}", link.role_arn);
    println!("  Bucket:      {}", link.bucket_name);
    println!("  Stack:       {}", link.stack_id.dimmed());
    println!("  KMS key:     {}", link.kms_key_arn.dimmed());
    println!(
        "  Linked:      {}",
        link.created_at.format("%Y-%m-%d %H:%M:%S")
    );
}

fn colorize_status(status: LinkStatus) -> ColoredString {
    match status {
        LinkStatus::Verified => status.as_str().green(),
        LinkStatus::Unverified => status.as_str().yellow(),
    }
}
