//! Simulated provisioning backend
//!
//! Keeps resources and their last applied config in memory, supports fault
//! injection per descriptor or action, and counts calls. Used for local runs (no `PROVISIONER_URL`) and in tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

use logpipe_core::domain::descriptor::{
    DescriptorId, PostProvisionAction, ResourceDescriptor, ResourceHandle,
};

use crate::provisioning::{ActionOutcome, ProvisionError, ProvisioningApi};

#[derive(Debug, Default)]
struct State {
    resources: HashMap<String, ResourceHandle>,
    configs: HashMap<String, serde_json::Value>,
    create_faults: HashMap<DescriptorId, VecDeque<ProvisionError>>,
    delete_faults: HashMap<DescriptorId, VecDeque<ProvisionError>>,
    invoke_faults: HashMap<String, VecDeque<ProvisionError>>,
    create_calls: HashMap<DescriptorId, u32>,
    update_calls: HashMap<DescriptorId, u32>,
    delete_calls: HashMap<DescriptorId, u32>,
    invocations: Vec<(String, String)>,
    next_id: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryProvisioningApi {
    state: Mutex<State>,
    latency: Option<Duration>,
}

impl InMemoryProvisioningApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every create call take `latency`, to simulate slow resources
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Queues errors returned by the next create calls for a descriptor
    pub fn fail_create(&self, descriptor_id: &str, errors: impl IntoIterator<Item = ProvisionError>) {
        self.state()
            .create_faults
            .entry(descriptor_id.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn fail_delete(&self, descriptor_id: &str, errors: impl IntoIterator<Item = ProvisionError>) {
        self.state()
            .delete_faults
            .entry(descriptor_id.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn fail_invoke(&self, action: &str, errors: impl IntoIterator<Item = ProvisionError>) {
        self.state()
            .invoke_faults
            .entry(action.to_string())
            .or_default()
            .extend(errors);
    }

    pub fn create_calls(&self, descriptor_id: &str) -> u32 {
        self.state().create_calls.get(descriptor_id).copied().unwrap_or(0)
    }

    pub fn update_calls(&self, descriptor_id: &str) -> u32 {
        self.state().update_calls.get(descriptor_id).copied().unwrap_or(0)
    }

    pub fn delete_calls(&self, descriptor_id: &str) -> u32 {
        self.state().delete_calls.get(descriptor_id).copied().unwrap_or(0)
    }

    pub fn total_create_calls(&self) -> u32 {
        self.state().create_calls.values().sum()
    }

    /// (action, idempotency key) pairs in invocation order
    pub fn invocations(&self) -> Vec<(String, String)> {
        self.state().invocations.clone()
    }

    /// Config the named resource was last created or updated with
    pub fn config_of(&self, name: &str) -> Option<serde_json::Value> {
        self.state().configs.get(name).cloned()
    }

    pub fn exists(&self, name: &str) -> bool {
        self.state().resources.contains_key(name)
    }

    pub fn resource_count(&self) -> usize {
        self.state().resources.len()
    }
}

#[async_trait]
impl ProvisioningApi for InMemoryProvisioningApi {
    async fn create_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError> {
        {
            let mut state = self.state();
            *state.create_calls.entry(descriptor.id.clone()).or_default() += 1;
            if let Some(err) = state
                .create_faults
                .get_mut(&descriptor.id)
                .and_then(VecDeque::pop_front)
            {
                return Err(err);
            }
        }

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        if state.resources.contains_key(&descriptor.name) {
            return Err(ProvisionError::AlreadyExists(descriptor.name.clone()));
        }

        state.next_id += 1;
        let handle = ResourceHandle {
            descriptor_id: descriptor.id.clone(),
            kind: descriptor.kind,
            name: descriptor.name.clone(),
            physical_id: format!("{}/{}/{:06}", descriptor.kind, descriptor.name, state.next_id),
        };
        state.resources.insert(descriptor.name.clone(), handle.clone());
        state.configs.insert(descriptor.name.clone(), descriptor.config.clone());
        tracing::debug!(descriptor = %descriptor.id, name = %descriptor.name, "simulated resource created");
        Ok(handle)
    }

    async fn update_resource(
        &self,
        descriptor: &ResourceDescriptor,
    ) -> Result<ResourceHandle, ProvisionError> {
        let mut state = self.state();
        *state.update_calls.entry(descriptor.id.clone()).or_default() += 1;

        let Some(handle) = state.resources.get(&descriptor.name).cloned() else {
            return Err(ProvisionError::NotFound(descriptor.name.clone()));
        };
        state.configs.insert(descriptor.name.clone(), descriptor.config.clone());
        tracing::debug!(descriptor = %descriptor.id, name = %descriptor.name, "simulated resource updated");
        Ok(handle)
    }

    async fn delete_resource(&self, handle: &ResourceHandle) -> Result<(), ProvisionError> {
        let mut state = self.state();
        *state.delete_calls.entry(handle.descriptor_id.clone()).or_default() += 1;
        if let Some(err) = state
            .delete_faults
            .get_mut(&handle.descriptor_id)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        state.configs.remove(&handle.name);
        match state.resources.remove(&handle.name) {
            Some(_) => Ok(()),
            None => Err(ProvisionError::NotFound(handle.name.clone())),
        }
    }

    async fn invoke_idempotent(
        &self,
        action: &PostProvisionAction,
        key: &str,
    ) -> Result<ActionOutcome, ProvisionError> {
        let mut state = self.state();
        if let Some(err) = state
            .invoke_faults
            .get_mut(&action.action)
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        state.invocations.push((action.action.clone(), key.to_string()));
        Ok(ActionOutcome {
            message: format!("{} applied", action.action),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logpipe_core::domain::descriptor::ResourceKind;
    use std::collections::BTreeSet;

    fn descriptor(id: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            kind: ResourceKind::Queue,
            name: format!("logpipe-test-{id}"),
            config: serde_json::json!({}),
            depends_on: BTreeSet::new(),
            idempotency_key: "key".to_string(),
            principal: None,
            execution_role: None,
            statements: Vec::new(),
            post_provision: None,
        }
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let api = InMemoryProvisioningApi::new();
        let queue = descriptor("queue");

        api.create_resource(&queue).await.unwrap();
        let err = api.create_resource(&queue).await.unwrap_err();

        assert!(matches!(err, ProvisionError::AlreadyExists(_)));
        assert_eq!(api.create_calls("queue"), 2);
        assert_eq!(api.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_faults_are_consumed_in_order() {
        let api = InMemoryProvisioningApi::new();
        api.fail_create(
            "queue",
            [
                ProvisionError::Transient("throttled".into()),
                ProvisionError::Configuration("bad".into()),
            ],
        );
        let queue = descriptor("queue");

        assert!(matches!(api.create_resource(&queue).await, Err(ProvisionError::Transient(_))));
        assert!(matches!(api.create_resource(&queue).await, Err(ProvisionError::Configuration(_))));
        assert!(api.create_resource(&queue).await.is_ok());
    }

    #[tokio::test]
    async fn test_update_replaces_config_of_existing_resource() {
        let api = InMemoryProvisioningApi::new();
        let mut queue = descriptor("queue");

        assert!(matches!(
            api.update_resource(&queue).await,
            Err(ProvisionError::NotFound(_))
        ));

        api.create_resource(&queue).await.unwrap();
        queue.config = serde_json::json!({ "visibility_timeout_seconds": 60 });
        let handle = api.update_resource(&queue).await.unwrap();

        assert_eq!(handle.name, "logpipe-test-queue");
        assert_eq!(api.config_of("logpipe-test-queue"), Some(queue.config.clone()));
        assert_eq!(api.update_calls("queue"), 2);
        assert_eq!(api.resource_count(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_resource_is_not_found() {
        let api = InMemoryProvisioningApi::new();
        let handle = ResourceHandle::for_descriptor(&descriptor("queue"));

        assert!(matches!(
            api.delete_resource(&handle).await,
            Err(ProvisionError::NotFound(_))
        ));
    }
}
