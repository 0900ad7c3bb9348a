//! De-duplication cache for post-provision actions
//!
//! The backend may deliver an action more than once. A successful outcome is
//! recorded under the resource name together with the idempotency key it was
//! produced for, and replayed instead of invoking the action again. Failures
//! are never cached, so a failed or unknown prior attempt is retried.
//!
//! Each resource keeps only its latest outcome: recording a new key replaces
//! the old one, and entries are dropped once the resource is torn down.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::provisioning::ActionOutcome;

#[derive(Debug, Default)]
pub struct IdempotencyCache {
    completed: Mutex<HashMap<String, (String, ActionOutcome)>>,
}

impl IdempotencyCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: &str, key: &str) -> Option<ActionOutcome> {
        let completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed
            .get(resource)
            .filter(|(recorded, _)| recorded == key)
            .map(|(_, outcome)| outcome.clone())
    }

    pub fn record(&self, resource: &str, key: &str, outcome: ActionOutcome) {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        completed.insert(resource.to_string(), (key.to_string(), outcome));
    }

    /// Drops outcomes for resources that no longer exist
    pub fn forget<'a>(&self, resources: impl IntoIterator<Item = &'a str>) {
        let mut completed = self.completed.lock().unwrap_or_else(|e| e.into_inner());
        for resource in resources {
            completed.remove(resource);
        }
    }

    pub fn len(&self) -> usize {
        self.completed.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
