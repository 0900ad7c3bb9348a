//! Resource descriptor resolver
//!
//! Maps a pipeline spec (and an optional cross-account link) to the descriptor
//! graph that provisions it. Resolution is pure: the same inputs always produce
//! the same graph, with the same names and idempotency keys.
//!
//! Shape of the graph:
//!
//! ```text
//! [dead-letter-queue] -> queue ─┐
//!                 or   stream ──┼─> processor ──────────────┐
//!                               ├─> agent-fleet ────────────┤
//!                               ├─> syslog-endpoint ────────┼─> destination-wiring
//!                               └─> subscription-filter ────┘
//! ```
//!
//! Without a buffer the processor has no dependency and a subscription filter
//! feeds the processor directly.

use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use uuid::Uuid;

use crate::domain::descriptor::{
    DescriptorId, PostProvisionAction, Principal, ResourceDescriptor, ResourceKind,
};
use crate::domain::link::CrossAccountLink;
use crate::domain::pipeline::{
    BufferType, DestinationConfig, DestinationEngine, PipelineSpec, SourceType,
};
use crate::error::{ResolveError, ValidationError};
use crate::graph::{DescriptorGraph, GraphBuilder};

pub const DEAD_LETTER_QUEUE: &str = "dead-letter-queue";
pub const QUEUE: &str = "queue";
pub const STREAM: &str = "stream";
pub const PROCESSOR: &str = "processor";
pub const AGENT_FLEET: &str = "agent-fleet";
pub const SYSLOG_ENDPOINT: &str = "syslog-endpoint";
pub const SUBSCRIPTION_FILTER: &str = "subscription-filter";
pub const DESTINATION_WIRING: &str = "destination-wiring";

pub const CREATE_INDEX_TEMPLATE: &str = "create-index-template";
pub const CREATE_TABLE: &str = "create-table";
pub const APPLY_AGENT_CONFIG: &str = "apply-agent-config";

/// (source, buffer) pairs the light engine can ingest
const LIGHT_ENGINE_PAIRS: [(SourceType, BufferType); 3] = [
    (SourceType::S3, BufferType::Sqs),
    (SourceType::Ec2, BufferType::Sqs),
    (SourceType::Eks, BufferType::Sqs),
];

const LIGHT_ENGINE_LOG_TYPES: [&str; 10] = [
    "CloudTrail",
    "ELB",
    "WAF",
    "CloudFront",
    "VPCFlow",
    "S3",
    "JSON",
    "Nginx",
    "Apache",
    "SingleLineText",
];

/// Resolves the descriptor graph for a pipeline
///
/// A link only takes effect when its role ARN is non-empty; it must belong to the
/// spec's account.
pub fn resolve(
    pipeline_id: Uuid,
    spec: &PipelineSpec,
    link: Option<&CrossAccountLink>,
) -> Result<DescriptorGraph, ResolveError> {
    check_combination(spec)?;

    let link = link.filter(|l| !l.role_arn.is_empty());
    if let Some(link) = link {
        if link.sub_account_id != spec.account_id {
            return Err(ValidationError::InvalidField {
                field: "account_id",
                reason: format!(
                    "link belongs to account '{}', pipeline source is in '{}'",
                    link.sub_account_id, spec.account_id
                ),
            }
            .into());
        }
    }

    let resolver = Resolver::new(pipeline_id, spec, link);
    let buffer = resolver.buffer();
    let buffer_id = buffer.last().map(|d| d.id.clone());
    let processor = resolver.processor(buffer_id.as_deref());
    let ingress = resolver.ingress(buffer_id.as_deref());
    let wiring = resolver.wiring(&ingress);

    let graph = buffer
        .into_iter()
        .chain(std::iter::once(processor))
        .chain(ingress)
        .fold(GraphBuilder::new(), GraphBuilder::with)
        .with(wiring)
        .build()?;

    Ok(graph)
}

/// Checks a pipeline spec against the supported combination matrix
pub fn check_combination(spec: &PipelineSpec) -> Result<(), ValidationError> {
    spec.validate()?;

    if !spec.destination.matches_engine(spec.destination_engine) {
        return Err(ValidationError::DestinationMismatch(spec.destination_engine));
    }

    if spec.buffer_type == BufferType::None && !spec.source_type.allows_direct_ingest() {
        return Err(ValidationError::InvalidBufferForSource {
            source_type: spec.source_type,
            buffer_type: spec.buffer_type,
        });
    }

    if spec.destination_engine == DestinationEngine::LightEngine {
        if !LIGHT_ENGINE_PAIRS.contains(&(spec.source_type, spec.buffer_type)) {
            return Err(ValidationError::UnsupportedCombination(format!(
                "{} source with {} buffer is not supported by {}",
                spec.source_type, spec.buffer_type, spec.destination_engine
            )));
        }
        if !LIGHT_ENGINE_LOG_TYPES.contains(&spec.log_type.as_str()) {
            return Err(ValidationError::UnsupportedCombination(format!(
                "log type '{}' is not supported by {}",
                spec.log_type, spec.destination_engine
            )));
        }
    }

    Ok(())
}

/// Name prefix shared by every resource of a pipeline
pub fn resource_prefix(pipeline_id: Uuid) -> String {
    let simple = pipeline_id.simple().to_string();
    format!("logpipe-{}", &simple[..8])
}

/// SHA-256 fingerprint of (pipeline id, descriptor id, config)
pub fn idempotency_key(pipeline_id: Uuid, descriptor_id: &str, config: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pipeline_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(descriptor_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(config.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

struct Resolver<'a> {
    pipeline_id: Uuid,
    spec: &'a PipelineSpec,
    link: Option<&'a CrossAccountLink>,
    prefix: String,
}

impl<'a> Resolver<'a> {
    fn new(pipeline_id: Uuid, spec: &'a PipelineSpec, link: Option<&'a CrossAccountLink>) -> Self {
        Self {
            pipeline_id,
            spec,
            link,
            prefix: resource_prefix(pipeline_id),
        }
    }

    fn name(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }

    fn descriptor(
        &self,
        id: &str,
        kind: ResourceKind,
        name: String,
        config: Value,
        depends_on: BTreeSet<DescriptorId>,
    ) -> ResourceDescriptor {
        ResourceDescriptor {
            id: id.to_string(),
            kind,
            idempotency_key: idempotency_key(self.pipeline_id, id, &config),
            name,
            config,
            depends_on,
            principal: None,
            execution_role: None,
            statements: Vec::new(),
            post_provision: None,
        }
    }

    /// Principal for a descriptor that reaches into the source account
    fn principal(&self) -> Principal {
        match self.link {
            Some(link) => Principal::CrossAccount {
                account_id: link.sub_account_id.clone(),
                role_arn: link.role_arn.clone(),
            },
            None => Principal::SameAccount {
                account_id: self.spec.account_id.clone(),
            },
        }
    }

    /// Buffer descriptors in dependency order; the last one is the ingest point
    fn buffer(&self) -> Vec<ResourceDescriptor> {
        let key = &self.spec.encryption_key_ref;
        let admin_role = Some(self.name("admin-role"));

        match self.spec.buffer_type {
            BufferType::None => Vec::new(),
            BufferType::Sqs => {
                let dlq_name = self.name("dlq");
                let mut dlq = self.descriptor(
                    DEAD_LETTER_QUEUE,
                    ResourceKind::DeadLetterQueue,
                    dlq_name.clone(),
                    json!({
                        "queue_name": dlq_name,
                        "message_retention_seconds": 1_209_600,
                        "encryption_key": key,
                    }),
                    BTreeSet::new(),
                );
                dlq.execution_role = admin_role.clone();

                let queue_name = self.name("queue");
                let mut queue = self.descriptor(
                    QUEUE,
                    ResourceKind::Queue,
                    queue_name.clone(),
                    json!({
                        "queue_name": queue_name,
                        "visibility_timeout_seconds": 910,
                        "max_receive_count": 5,
                        "dead_letter_queue": dlq_name,
                        "encryption_key": key,
                    }),
                    BTreeSet::from([DEAD_LETTER_QUEUE.to_string()]),
                );
                queue.execution_role = admin_role;

                vec![dlq, queue]
            }
            BufferType::Kds => {
                let stream_name = self.name("stream");
                let mut stream = self.descriptor(
                    STREAM,
                    ResourceKind::Stream,
                    stream_name.clone(),
                    json!({
                        "stream_name": stream_name,
                        "shard_count": 1,
                        "retention_hours": 24,
                        "encryption_key": key,
                    }),
                    BTreeSet::new(),
                );
                stream.execution_role = admin_role;
                vec![stream]
            }
        }
    }

    fn processor(&self, buffer: Option<&str>) -> ResourceDescriptor {
        let spec = self.spec;
        let function_name = self.name("processor");
        let source = match spec.source_type {
            SourceType::S3 => json!({
                "bucket_name": spec.source.bucket_name,
                "prefix": spec.source.prefix,
            }),
            _ => Value::Null,
        };

        let mut processor = self.descriptor(
            PROCESSOR,
            ResourceKind::Processor,
            function_name.clone(),
            json!({
                "function_name": function_name,
                "source_type": spec.source_type.to_string(),
                "buffer_type": spec.buffer_type.to_string(),
                "log_type": spec.log_type,
                "source": source,
                "destination": spec.destination,
                "log_retention_days": spec.lifecycle.log_retention_days,
                "encryption_key": spec.encryption_key_ref,
            }),
            buffer.map(str::to_string).into_iter().collect(),
        );
        processor.execution_role = Some(self.name("processor-role"));
        if spec.source_type == SourceType::S3 {
            processor.principal = Some(self.principal());
        }
        processor
    }

    /// Descriptors that push logs into the pipeline
    fn ingress(&self, buffer: Option<&str>) -> Vec<ResourceDescriptor> {
        let spec = self.spec;
        let target = buffer.unwrap_or(PROCESSOR);
        let depends_on = BTreeSet::from([target.to_string()]);

        if spec.source_type.requires_agent() {
            return vec![self.agent_fleet(target, depends_on)];
        }

        match spec.source_type {
            SourceType::Syslog => {
                let name = self.name("syslog");
                let config = json!({
                    "endpoint_name": name,
                    "port": spec.source.syslog_port,
                    "protocol": "udp",
                    "buffer_type": spec.buffer_type.to_string(),
                });
                let mut endpoint =
                    self.descriptor(SYSLOG_ENDPOINT, ResourceKind::SyslogEndpoint, name, config, depends_on);
                endpoint.execution_role = Some(self.name("syslog-role"));
                endpoint.principal = Some(self.principal());
                vec![endpoint]
            }
            SourceType::CloudWatch => {
                let name = self.name("subscription");
                let config = json!({
                    "filter_name": name,
                    "log_group_names": spec.source.log_group_names,
                    "filter_pattern": "",
                    "target": target,
                });
                let mut filter = self.descriptor(
                    SUBSCRIPTION_FILTER,
                    ResourceKind::SubscriptionFilter,
                    name,
                    config,
                    depends_on,
                );
                filter.execution_role = Some(self.name("subscription-role"));
                filter.principal = Some(self.principal());
                vec![filter]
            }
            // S3 notifications reach the processor through the buffer
            _ => Vec::new(),
        }
    }

    fn agent_fleet(&self, target: &str, depends_on: BTreeSet<DescriptorId>) -> ResourceDescriptor {
        let spec = self.spec;
        let name = self.name("agent");
        let fleet_type = if spec.source_type == SourceType::Ec2 {
            "ec2"
        } else {
            "eks"
        };
        let config = json!({
            "fleet_name": name,
            "fleet_type": fleet_type,
            "log_paths": spec.source.log_paths,
            "log_type": spec.log_type,
            "buffer_type": spec.buffer_type.to_string(),
            "encryption_key": spec.encryption_key_ref,
        });
        let mut fleet = self.descriptor(AGENT_FLEET, ResourceKind::AgentFleet, name, config, depends_on);
        fleet.execution_role = Some(self.name("agent-role"));
        fleet.principal = Some(self.principal());
        fleet.post_provision = Some(PostProvisionAction {
            action: APPLY_AGENT_CONFIG.to_string(),
            payload: json!({
                "log_paths": spec.source.log_paths,
                "log_type": spec.log_type,
                "target": target,
            }),
        });
        fleet
    }

    /// Unique sink: depends on the processor and on every ingress descriptor
    fn wiring(&self, ingress: &[ResourceDescriptor]) -> ResourceDescriptor {
        let spec = self.spec;
        let depends_on = std::iter::once(PROCESSOR.to_string())
            .chain(ingress.iter().map(|d| d.id.clone()))
            .collect();

        let lifecycle = json!({
            "warm_age_days": spec.lifecycle.warm_age_days,
            "cold_age_days": spec.lifecycle.cold_age_days,
            "retain_age_days": spec.lifecycle.retain_age_days,
        });
        let (action, payload) = match &spec.destination {
            DestinationConfig::Index {
                index_prefix,
                shards,
                replicas,
                ..
            } => (
                CREATE_INDEX_TEMPLATE,
                json!({
                    "index_prefix": index_prefix,
                    "shards": shards,
                    "replicas": replicas,
                    "lifecycle": lifecycle,
                }),
            ),
            DestinationConfig::Table {
                database,
                table_name,
                bucket_name,
            } => (
                CREATE_TABLE,
                json!({
                    "database": database,
                    "table_name": table_name,
                    "bucket_name": bucket_name,
                    "log_type": spec.log_type,
                    "lifecycle": lifecycle,
                }),
            ),
        };

        let mut wiring = self.descriptor(
            DESTINATION_WIRING,
            ResourceKind::DestinationWiring,
            self.name("wiring"),
            json!({
                "engine": spec.destination_engine.to_string(),
                "destination": spec.destination,
                "lifecycle": lifecycle,
            }),
            depends_on,
        );
        wiring.execution_role = Some(self.name("processor-role"));
        wiring.post_provision = Some(PostProvisionAction {
            action: action.to_string(),
            payload,
        });
        wiring
    }
}
