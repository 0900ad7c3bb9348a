//! Reverse-order teardown
//!
//! Consumers are deleted before their producers. A resource that is already
//! gone counts as deleted, so a teardown can be re-run after a partial failure.

use logpipe_core::domain::descriptor::{DescriptorId, ResourceHandle};
use logpipe_core::graph::DescriptorGraph;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::provisioning::{ProvisionError, ProvisioningApi, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to delete {descriptor_id}: {error}")]
pub struct TeardownError {
    pub descriptor_id: DescriptorId,
    pub error: ProvisionError,
}

/// Deletes every descriptor of `graph`, stopping at the first hard failure
pub async fn teardown(
    api: &dyn ProvisioningApi,
    graph: &DescriptorGraph,
    retry: RetryPolicy,
) -> Result<(), TeardownError> {
    for descriptor in graph.reverse_order() {
        let handle = ResourceHandle::for_descriptor(descriptor);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match api.delete_resource(&handle).await {
                Ok(()) => {
                    debug!(descriptor = %descriptor.id, "resource deleted");
                    break;
                }
                Err(ProvisionError::NotFound(_)) => {
                    debug!(descriptor = %descriptor.id, "resource already gone");
                    break;
                }
                Err(err) if err.is_retryable() && retry.should_retry(attempt) => {
                    let delay = retry.compute_backoff(attempt);
                    warn!(descriptor = %descriptor.id, attempt, error = %err, "transient delete error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(descriptor = %descriptor.id, error = %err, "delete failed");
                    return Err(TeardownError {
                        descriptor_id: descriptor.id.clone(),
                        error: err,
                    });
                }
            }
        }
    }

    info!(descriptors = graph.len(), "teardown complete");
    Ok(())
}
