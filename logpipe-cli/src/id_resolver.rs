//! ID resolver module
//!
//! Handles resolution of UUID prefixes to full UUIDs by querying the API.
//! This allows users to specify short, unambiguous prefixes instead of full UUIDs.

use anyhow::{Context, Result, anyhow};
use logpipe_client::OrchestratorClient;
use logpipe_core::dto::pipeline::ListPipelines;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
///
/// If the input is already a full UUID, returns it immediately.
/// Otherwise, walks every page of the pipeline list and finds the one
/// matching the prefix.
///
/// # Errors
/// Returns an error if:
/// - No pipeline matches the prefix
/// - Multiple pipelines match the prefix (ambiguous)
/// - API call fails
pub async fn resolve_pipeline_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let IdOrPrefix::Full(uuid) = id_or_prefix {
        return Ok(uuid);
    }

    let mut ids = Vec::new();
    let mut query = ListPipelines {
        page: 1,
        count: ListPipelines::MAX_COUNT,
    };
    loop {
        let page = client
            .list_pipelines(query)
            .await
            .context("Failed to fetch pipelines for ID resolution")?;
        let fetched = page.pipelines.len();
        ids.extend(page.pipelines.into_iter().map(|p| p.id));

        if fetched == 0 || ids.len() as u64 >= page.total {
            break;
        }
        query.page += 1;
    }

    select_unique(&id_or_prefix, &ids)
}

fn select_unique(id_or_prefix: &IdOrPrefix, ids: &[Uuid]) -> Result<Uuid> {
    let matches: Vec<_> = ids.iter().filter(|id| id_or_prefix.matches(id)).collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No pipeline found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(**id),
        _ => {
            let ids: Vec<String> = matches.iter().map(|id| id.to_string()).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple pipelines: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}
