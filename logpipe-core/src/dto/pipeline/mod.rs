//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{
    BufferType, DestinationConfig, DestinationEngine, LifecyclePolicy, PipelineRecord,
    PipelineSpec, SourceConfig, SourceType,
};

/// Request to create a new pipeline
///
/// `account_id` and `region` default to the home account and region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub source_type: SourceType,
    pub buffer_type: BufferType,
    pub destination_engine: DestinationEngine,
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub encryption_key_ref: Option<String>,
    #[serde(default)]
    pub source: SourceConfig,
    pub log_type: String,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub lifecycle: Option<LifecyclePolicy>,
}

impl CreatePipeline {
    pub fn into_spec(self, home_account_id: &str, home_region: &str) -> PipelineSpec {
        PipelineSpec {
            source_type: self.source_type,
            buffer_type: self.buffer_type,
            destination_engine: self.destination_engine,
            account_id: self
                .account_id
                .unwrap_or_else(|| home_account_id.to_string()),
            region: self.region.unwrap_or_else(|| home_region.to_string()),
            encryption_key_ref: self.encryption_key_ref,
            source: self.source,
            log_type: self.log_type,
            destination: self.destination,
            lifecycle: self.lifecycle.unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPipeline {
    pub id: Uuid,
}

/// Request to change the mutable settings of a pipeline
///
/// Only lifecycle settings can be expressed; structural changes require a new
/// pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdatePipeline {
    pub lifecycle: LifecyclePolicy,
}

/// Query parameters for listing pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPipelines {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_count")]
    pub count: u32,
}

fn default_page() -> u32 {
    1
}

fn default_count() -> u32 {
    20
}

impl Default for ListPipelines {
    fn default() -> Self {
        Self {
            page: default_page(),
            count: default_count(),
        }
    }
}

impl ListPipelines {
    pub const MAX_COUNT: u32 = 100;

    /// Row offset and limit, with `page` starting at 1
    pub fn bounds(&self) -> (u64, u64) {
        let count = self.count.clamp(1, Self::MAX_COUNT) as u64;
        let page = self.page.max(1) as u64;
        ((page - 1) * count, count)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelinePage {
    pub pipelines: Vec<PipelineRecord>,
    pub total: u64,
    pub page: u32,
    pub count: u32,
}

/// Out-of-band stack status notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    pub stack_status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_create_pipeline_defaults_to_home() {
        let request: CreatePipeline = serde_json::from_value(json!({
            "source_type": "S3",
            "buffer_type": "None",
            "destination_engine": "OpenSearch",
            "source": { "bucket_name": "source-logs" },
            "log_type": "CloudTrail",
            "destination": {
                "kind": "index",
                "domain_arn": "arn:aws:es:us-east-1:123456789012:domain/logs",
                "index_prefix": "trail",
                "shards": 1,
                "replicas": 0
            }
        }))
        .unwrap();

        let spec = request.into_spec("123456789012", "us-east-1");
        assert_eq!(spec.account_id, "123456789012");
        assert_eq!(spec.region, "us-east-1");
        assert_eq!(spec.lifecycle, LifecyclePolicy::default());
    }

    #[test]
    fn test_update_rejects_structural_fields() {
        let result = serde_json::from_value::<UpdatePipeline>(json!({
            "lifecycle": { "warm_age_days": null, "cold_age_days": null, "retain_age_days": 30, "log_retention_days": 7 },
            "buffer_type": "Sqs"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_list_bounds() {
        assert_eq!(ListPipelines::default().bounds(), (0, 20));
        assert_eq!(ListPipelines { page: 3, count: 10 }.bounds(), (20, 10));
        assert_eq!(ListPipelines { page: 0, count: 1000 }.bounds(), (0, 100));
    }
}
