//! Pipeline domain types

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::descriptor::{ResourceHandle, ResourceKind};
use crate::error::ValidationError;

/// Where the logs come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceType {
    S3,
    Ec2,
    Eks,
    Syslog,
    CloudWatch,
}

impl SourceType {
    pub const ALL: [SourceType; 5] = [
        SourceType::S3,
        SourceType::Ec2,
        SourceType::Eks,
        SourceType::Syslog,
        SourceType::CloudWatch,
    ];

    /// Sources shipped by an agent running on customer compute
    pub fn requires_agent(self) -> bool {
        matches!(self, SourceType::Ec2 | SourceType::Eks)
    }

    /// Sources that can feed a processor without an intermediate buffer
    pub fn allows_direct_ingest(self) -> bool {
        matches!(self, SourceType::S3 | SourceType::CloudWatch)
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceType::S3 => "S3",
            SourceType::Ec2 => "EC2",
            SourceType::Eks => "EKS",
            SourceType::Syslog => "Syslog",
            SourceType::CloudWatch => "CloudWatch",
        };
        f.write_str(name)
    }
}

/// Intermediate buffer between source and processor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BufferType {
    None,
    Sqs,
    Kds,
}

impl BufferType {
    pub const ALL: [BufferType; 3] = [BufferType::None, BufferType::Sqs, BufferType::Kds];
}

impl fmt::Display for BufferType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BufferType::None => "None",
            BufferType::Sqs => "SQS",
            BufferType::Kds => "KDS",
        };
        f.write_str(name)
    }
}

/// Analytics engine the pipeline delivers into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DestinationEngine {
    OpenSearch,
    LightEngine,
}

impl DestinationEngine {
    pub const ALL: [DestinationEngine; 2] =
        [DestinationEngine::OpenSearch, DestinationEngine::LightEngine];
}

impl fmt::Display for DestinationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DestinationEngine::OpenSearch => "OpenSearch",
            DestinationEngine::LightEngine => "LightEngine",
        };
        f.write_str(name)
    }
}

/// Source location details
///
/// Which fields are required depends on the source type; see [`PipelineSpec::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub bucket_name: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub log_group_names: Vec<String>,
    #[serde(default)]
    pub log_paths: Vec<String>,
    #[serde(default)]
    pub syslog_port: Option<u16>,
}

/// Index or table the processor writes into
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DestinationConfig {
    Index {
        domain_arn: String,
        index_prefix: String,
        shards: u32,
        replicas: u32,
    },
    Table {
        database: String,
        table_name: String,
        bucket_name: String,
    },
}

impl DestinationConfig {
    pub fn matches_engine(&self, engine: DestinationEngine) -> bool {
        matches!(
            (self, engine),
            (DestinationConfig::Index { .. }, DestinationEngine::OpenSearch)
                | (DestinationConfig::Table { .. }, DestinationEngine::LightEngine)
        )
    }
}

/// Mutable retention settings
///
/// These are the only pipeline attributes an update may change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecyclePolicy {
    pub warm_age_days: Option<u32>,
    pub cold_age_days: Option<u32>,
    pub retain_age_days: Option<u32>,
    pub log_retention_days: u32,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self {
            warm_age_days: None,
            cold_age_days: None,
            retain_age_days: Some(180),
            log_retention_days: 14,
        }
    }
}

impl LifecyclePolicy {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.log_retention_days == 0 {
            return Err(ValidationError::InvalidField {
                field: "lifecycle.log_retention_days",
                reason: "must be greater than 0".to_string(),
            });
        }

        // Each configured age must be strictly later than the previous tier
        let ages = [
            ("lifecycle.warm_age_days", self.warm_age_days),
            ("lifecycle.cold_age_days", self.cold_age_days),
            ("lifecycle.retain_age_days", self.retain_age_days),
        ];
        let mut previous = 0;
        for (field, age) in ages {
            if let Some(age) = age {
                if age <= previous {
                    return Err(ValidationError::InvalidField {
                        field,
                        reason: format!("must be greater than {previous}"),
                    });
                }
                previous = age;
            }
        }

        Ok(())
    }
}

/// Immutable description of a pipeline
///
/// Created once by the API caller. Updates produce a new value through
/// [`PipelineSpec::with_lifecycle`], which keeps every structural field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub source_type: SourceType,
    pub buffer_type: BufferType,
    pub destination_engine: DestinationEngine,
    /// Account that owns the source; the home account or a linked sub-account
    pub account_id: String,
    pub region: String,
    pub encryption_key_ref: Option<String>,
    pub source: SourceConfig,
    pub log_type: String,
    pub destination: DestinationConfig,
    pub lifecycle: LifecyclePolicy,
}

impl PipelineSpec {
    /// Field-level validation, independent of the supported combination matrix
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !crate::link::is_account_id(&self.account_id) {
            return Err(ValidationError::InvalidField {
                field: "account_id",
                reason: format!("'{}' is not a 12 digit account id", self.account_id),
            });
        }

        if self.region.trim().is_empty() {
            return Err(ValidationError::MissingField("region"));
        }

        if self.log_type.trim().is_empty() {
            return Err(ValidationError::MissingField("log_type"));
        }

        if let Some(key) = &self.encryption_key_ref {
            crate::arn::parse_kms_key_arn(key).ok_or_else(|| ValidationError::InvalidField {
                field: "encryption_key_ref",
                reason: format!("'{}' is not a KMS key ARN", key),
            })?;
        }

        match self.source_type {
            SourceType::S3 => {
                if self.source.bucket_name.as_deref().is_none_or(str::is_empty) {
                    return Err(ValidationError::MissingField("source.bucket_name"));
                }
            }
            SourceType::CloudWatch => {
                if self.source.log_group_names.is_empty() {
                    return Err(ValidationError::MissingField("source.log_group_names"));
                }
            }
            SourceType::Syslog => {
                if self.source.syslog_port.is_none() {
                    return Err(ValidationError::MissingField("source.syslog_port"));
                }
            }
            SourceType::Ec2 | SourceType::Eks => {
                if self.source.log_paths.is_empty() {
                    return Err(ValidationError::MissingField("source.log_paths"));
                }
            }
        }

        self.lifecycle.validate()
    }

    /// Returns a copy with new lifecycle settings and the same structure
    pub fn with_lifecycle(&self, lifecycle: LifecyclePolicy) -> PipelineSpec {
        PipelineSpec {
            lifecycle,
            ..self.clone()
        }
    }
}

/// Pipeline lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Creating,
    Active,
    Error,
    Updating,
    Deleting,
    Deleted,
}

impl PipelineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStatus::Creating => "CREATING",
            PipelineStatus::Active => "ACTIVE",
            PipelineStatus::Error => "ERROR",
            PipelineStatus::Updating => "UPDATING",
            PipelineStatus::Deleting => "DELETING",
            PipelineStatus::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATING" => Ok(PipelineStatus::Creating),
            "ACTIVE" => Ok(PipelineStatus::Active),
            "ERROR" => Ok(PipelineStatus::Error),
            "UPDATING" => Ok(PipelineStatus::Updating),
            "DELETING" => Ok(PipelineStatus::Deleting),
            "DELETED" => Ok(PipelineStatus::Deleted),
            other => Err(format!("unknown pipeline status '{}'", other)),
        }
    }
}

/// Names of resources created for a pipeline
///
/// Filled in progressively as provisioning events arrive, so a record in
/// CREATING already shows the names that are known.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedResourceNames {
    pub queue_name: Option<String>,
    pub dead_letter_queue_name: Option<String>,
    pub stream_name: Option<String>,
    pub processor_function_name: Option<String>,
    pub processor_log_group_name: Option<String>,
    pub agent_role_name: Option<String>,
    pub subscription_filter_name: Option<String>,
    pub syslog_endpoint: Option<String>,
    pub stack_id: Option<String>,
}

impl DerivedResourceNames {
    /// Folds a created resource into the derived names
    pub fn record(&mut self, handle: &ResourceHandle) {
        let name = Some(handle.name.clone());
        match handle.kind {
            ResourceKind::Queue => self.queue_name = name,
            ResourceKind::DeadLetterQueue => self.dead_letter_queue_name = name,
            ResourceKind::Stream => self.stream_name = name,
            ResourceKind::Processor => {
                self.processor_log_group_name = Some(format!("/aws/lambda/{}", handle.name));
                self.processor_function_name = name;
            }
            ResourceKind::AgentFleet => self.agent_role_name = Some(format!("{}-role", handle.name)),
            ResourceKind::SubscriptionFilter => self.subscription_filter_name = name,
            ResourceKind::SyslogEndpoint => self.syslog_endpoint = Some(handle.physical_id.clone()),
            ResourceKind::DestinationWiring => self.stack_id = Some(handle.physical_id.clone()),
        }
    }
}

/// Persisted pipeline record
///
/// Only the lifecycle state machine changes `status`. Records are never removed;
/// a deleted pipeline stays as DELETED for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRecord {
    pub id: Uuid,
    pub spec: PipelineSpec,
    pub status: PipelineStatus,
    pub error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub derived: DerivedResourceNames,
}

impl PipelineRecord {
    pub fn new(id: Uuid, spec: PipelineSpec) -> Self {
        let now = chrono::Utc::now();
        Self {
            id,
            spec,
            status: PipelineStatus::Creating,
            error: None,
            created_at: now,
            updated_at: now,
            derived: DerivedResourceNames::default(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub const HOME: &str = "123456789012";
    pub const LINKED: &str = "111122223333";

    pub fn spec(source: SourceType, buffer: BufferType, engine: DestinationEngine) -> PipelineSpec {
        let destination = match engine {
            DestinationEngine::OpenSearch => DestinationConfig::Index {
                domain_arn: format!("arn:aws:es:us-east-1:{HOME}:domain/logs"),
                index_prefix: "app-logs".to_string(),
                shards: 1,
                replicas: 1,
            },
            DestinationEngine::LightEngine => DestinationConfig::Table {
                database: "logpipe".to_string(),
                table_name: "app_logs".to_string(),
                bucket_name: "logpipe-centralized".to_string(),
            },
        };
        let log_type = match (source, engine) {
            (SourceType::S3, _) => "CloudTrail",
            (_, DestinationEngine::LightEngine) => "Nginx",
            _ => "JSON",
        };

        PipelineSpec {
            source_type: source,
            buffer_type: buffer,
            destination_engine: engine,
            account_id: HOME.to_string(),
            region: "us-east-1".to_string(),
            encryption_key_ref: None,
            source: SourceConfig {
                bucket_name: Some("source-logs".to_string()),
                prefix: Some("AWSLogs/".to_string()),
                log_group_names: vec!["/app/web".to_string()],
                log_paths: vec!["/var/log/app/*.log".to_string()],
                syslog_port: Some(514),
            },
            log_type: log_type.to_string(),
            destination,
            lifecycle: LifecyclePolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::spec;
    use super::*;

    #[test]
    fn test_validate_fixture_spec() {
        let spec = spec(SourceType::S3, BufferType::Sqs, DestinationEngine::OpenSearch);
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_bucket_for_s3() {
        let mut spec = spec(SourceType::S3, BufferType::None, DestinationEngine::OpenSearch);
        spec.source.bucket_name = None;
        assert_eq!(
            spec.validate(),
            Err(ValidationError::MissingField("source.bucket_name"))
        );
    }

    #[test]
    fn test_validate_rejects_bad_account() {
        let mut spec = spec(SourceType::Ec2, BufferType::Sqs, DestinationEngine::OpenSearch);
        spec.account_id = "12345".to_string();
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::InvalidField { field: "account_id", .. })
        ));
    }

    #[test]
    fn test_lifecycle_ages_must_increase() {
        let lifecycle = LifecyclePolicy {
            warm_age_days: Some(30),
            cold_age_days: Some(10),
            retain_age_days: Some(90),
            log_retention_days: 7,
        };
        assert!(matches!(
            lifecycle.validate(),
            Err(ValidationError::InvalidField {
                field: "lifecycle.cold_age_days",
                ..
            })
        ));
    }

    #[test]
    fn test_with_lifecycle_keeps_structure() {
        let original = spec(SourceType::Eks, BufferType::Kds, DestinationEngine::OpenSearch);
        let updated = original.with_lifecycle(LifecyclePolicy {
            warm_age_days: Some(7),
            cold_age_days: None,
            retain_age_days: Some(30),
            log_retention_days: 3,
        });

        assert_eq!(updated.source_type, original.source_type);
        assert_eq!(updated.buffer_type, original.buffer_type);
        assert_eq!(updated.destination_engine, original.destination_engine);
        assert_eq!(updated.lifecycle.retain_age_days, Some(30));
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            PipelineStatus::Creating,
            PipelineStatus::Active,
            PipelineStatus::Error,
            PipelineStatus::Updating,
            PipelineStatus::Deleting,
            PipelineStatus::Deleted,
        ] {
            assert_eq!(status.as_str().parse::<PipelineStatus>(), Ok(status));
        }
    }

    #[test]
    fn test_derived_names_from_processor_handle() {
        let mut derived = DerivedResourceNames::default();
        derived.record(&ResourceHandle {
            descriptor_id: "processor".to_string(),
            kind: ResourceKind::Processor,
            name: "logpipe-abcd1234-processor".to_string(),
            physical_id: "fn-1".to_string(),
        });

        assert_eq!(
            derived.processor_log_group_name.as_deref(),
            Some("/aws/lambda/logpipe-abcd1234-processor")
        );
        assert!(derived.queue_name.is_none());
    }
}
