//! Trust and permission composer
//!
//! Annotates a resolved graph with the minimal statements each descriptor needs.
//! Identity statements carry the role they belong to as principal; resource
//! statements describe the resource policy of the descriptor they are attached to.
//!
//! The cross-account branch was chosen by the resolver. The composer only reads
//! the descriptor principal: when it is `CrossAccount`, statements that touch the
//! source use the linked role and the execution role gets an `sts:AssumeRole`
//! grant on exactly that role. Same-account descriptors never mention a linked
//! role.

use std::collections::BTreeMap;

use crate::arn;
use crate::domain::descriptor::{DescriptorId, Principal, ResourceDescriptor, ResourceKind};
use crate::domain::permission::{
    Condition, PermissionStatement, PolicyDocument, StatementPrincipal, StatementScope,
};
use crate::domain::pipeline::{BufferType, DestinationConfig, PipelineSpec, SourceType};
use crate::error::CompositionError;
use crate::graph::DescriptorGraph;

const SQS_CONSUMER: [&str; 4] = [
    "sqs:ReceiveMessage",
    "sqs:DeleteMessage",
    "sqs:GetQueueAttributes",
    "sqs:ChangeMessageVisibility",
];
const SQS_PRODUCER: [&str; 1] = ["sqs:SendMessage"];
const KINESIS_CONSUMER: [&str; 5] = [
    "kinesis:GetRecords",
    "kinesis:GetShardIterator",
    "kinesis:DescribeStream",
    "kinesis:DescribeStreamSummary",
    "kinesis:ListShards",
];
const KINESIS_PRODUCER: [&str; 2] = ["kinesis:PutRecord", "kinesis:PutRecords"];
const KMS_USAGE: [&str; 2] = ["kms:Decrypt", "kms:GenerateDataKey"];
const LOG_WRITE: [&str; 2] = ["logs:CreateLogStream", "logs:PutLogEvents"];

/// Account and partition the pipeline is provisioned into
#[derive(Debug, Clone, Copy)]
pub struct ComposeContext<'a> {
    pub partition: &'a str,
    pub home_account_id: &'a str,
    pub spec: &'a PipelineSpec,
}

impl ComposeContext<'_> {
    fn role_arn(&self, name: &str) -> String {
        arn::role(self.partition, self.home_account_id, name)
    }

    fn region(&self) -> &str {
        &self.spec.region
    }

    /// ARN of a buffer or processor resource in the home account
    fn resource_arn(&self, descriptor: &ResourceDescriptor) -> String {
        let (p, r, a) = (self.partition, self.region(), self.home_account_id);
        match descriptor.kind {
            ResourceKind::Queue | ResourceKind::DeadLetterQueue => arn::queue(p, r, a, &descriptor.name),
            ResourceKind::Stream => arn::stream(p, r, a, &descriptor.name),
            ResourceKind::Processor => arn::function(p, r, a, &descriptor.name),
            _ => arn::log_group(p, r, a, &descriptor.name),
        }
    }

    fn own_log_group(&self, descriptor: &ResourceDescriptor) -> String {
        let group = match descriptor.kind {
            ResourceKind::Processor => format!("/aws/lambda/{}", descriptor.name),
            _ => format!("/logpipe/{}", descriptor.name),
        };
        format!(
            "{}:*",
            arn::log_group(self.partition, self.region(), self.home_account_id, &group)
        )
    }
}

/// Annotates every descriptor with its permission statements
pub fn compose(
    graph: DescriptorGraph,
    ctx: &ComposeContext<'_>,
) -> Result<DescriptorGraph, CompositionError> {
    let mut statements: BTreeMap<DescriptorId, Vec<PermissionStatement>> = BTreeMap::new();

    for descriptor in graph.descriptors() {
        if let Some(Principal::CrossAccount {
            account_id,
            role_arn,
        }) = &descriptor.principal
        {
            check_linked_role(ctx.partition, account_id, role_arn)?;
        }

        let composed = match descriptor.kind {
            ResourceKind::DeadLetterQueue | ResourceKind::Queue => queue_policy(&graph, descriptor, ctx)?,
            ResourceKind::Stream => Vec::new(),
            ResourceKind::Processor => processor_statements(&graph, descriptor, ctx)?,
            ResourceKind::AgentFleet
            | ResourceKind::SyslogEndpoint
            | ResourceKind::SubscriptionFilter => ingress_statements(&graph, descriptor, ctx)?,
            ResourceKind::DestinationWiring => wiring_statements(&graph, descriptor, ctx)?,
        };
        statements.insert(descriptor.id.clone(), composed);
    }

    Ok(graph.with_statements(statements))
}

/// Identity policies grouped by role, one document per role
pub fn role_documents(graph: &DescriptorGraph) -> Result<Vec<PolicyDocument>, CompositionError> {
    let mut documents: BTreeMap<String, PolicyDocument> = BTreeMap::new();

    for descriptor in graph.descriptors() {
        let mut per_role: BTreeMap<&str, PolicyDocument> = BTreeMap::new();
        for statement in &descriptor.statements {
            if statement.scope != StatementScope::Identity {
                continue;
            }
            let Some(role) = statement.principal_role() else {
                continue;
            };
            per_role
                .entry(role)
                .or_insert_with(|| PolicyDocument::new(role))
                .statements
                .push(statement.clone());
        }

        for (role, document) in per_role {
            match documents.get_mut(role) {
                Some(existing) => existing.merge(document)?,
                None => {
                    documents.insert(role.to_string(), document);
                }
            }
        }
    }

    Ok(documents.into_values().collect())
}

fn check_linked_role(partition: &str, account_id: &str, role_arn: &str) -> Result<(), CompositionError> {
    let prefix = format!("arn:{partition}:iam::{account_id}:role/");
    match role_arn.strip_prefix(&prefix) {
        Some(name) if !name.is_empty() => Ok(()),
        _ => Err(CompositionError::RoleOutsideLinkedAccount {
            role_arn: role_arn.to_string(),
            account_id: account_id.to_string(),
        }),
    }
}

fn execution_role(descriptor: &ResourceDescriptor, ctx: &ComposeContext<'_>) -> Result<String, CompositionError> {
    descriptor
        .execution_role
        .as_deref()
        .map(|name| ctx.role_arn(name))
        .ok_or_else(|| CompositionError::MissingDependency {
            descriptor: descriptor.id.clone(),
            expected: "execution role",
        })
}

/// Role that acts on the source: the linked role, or the execution role
fn acting_role(descriptor: &ResourceDescriptor, ctx: &ComposeContext<'_>) -> Result<String, CompositionError> {
    match descriptor.principal.as_ref().and_then(Principal::assumed_role) {
        Some(role) => Ok(role.to_string()),
        None => execution_role(descriptor, ctx),
    }
}

fn buffer_of<'g>(graph: &'g DescriptorGraph, descriptor: &ResourceDescriptor) -> Option<&'g ResourceDescriptor> {
    descriptor
        .depends_on
        .iter()
        .filter_map(|id| graph.get(id))
        .find(|d| matches!(d.kind, ResourceKind::Queue | ResourceKind::Stream))
}

fn dependency_of<'g>(
    graph: &'g DescriptorGraph,
    descriptor: &ResourceDescriptor,
    kind: ResourceKind,
) -> Result<&'g ResourceDescriptor, CompositionError> {
    descriptor
        .depends_on
        .iter()
        .filter_map(|id| graph.get(id))
        .find(|d| d.kind == kind)
        .ok_or_else(|| CompositionError::MissingDependency {
            descriptor: descriptor.id.clone(),
            expected: kind.as_str(),
        })
}

fn identity(sid: &str, role: &str, actions: &[&str], resources: Vec<String>) -> PermissionStatement {
    PermissionStatement::allow(
        sid,
        StatementScope::Identity,
        StatementPrincipal::Role(role.to_string()),
        actions,
        resources,
    )
}

fn assume_role(descriptor: &ResourceDescriptor, ctx: &ComposeContext<'_>) -> Result<Option<PermissionStatement>, CompositionError> {
    let Some(linked) = descriptor.principal.as_ref().and_then(Principal::assumed_role) else {
        return Ok(None);
    };
    let role = execution_role(descriptor, ctx)?;
    Ok(Some(identity("AssumeLinkedRole", &role, &["sts:AssumeRole"], vec![linked.to_string()])))
}

fn key_usage(role: &str, ctx: &ComposeContext<'_>) -> Option<PermissionStatement> {
    ctx.spec
        .encryption_key_ref
        .as_ref()
        .map(|key| identity("UseEncryptionKey", role, &KMS_USAGE, vec![key.clone()]))
}

/// Queue and dead-letter queue resource policy
fn queue_policy(
    graph: &DescriptorGraph,
    queue: &ResourceDescriptor,
    ctx: &ComposeContext<'_>,
) -> Result<Vec<PermissionStatement>, CompositionError> {
    let queue_arn = ctx.resource_arn(queue);
    let mut statements = Vec::new();

    if queue.kind == ResourceKind::Queue {
        if ctx.spec.source_type == SourceType::S3 {
            if let Some(bucket) = ctx.spec.source.bucket_name.as_deref() {
                statements.push(
                    PermissionStatement::allow(
                        "AllowBucketNotifications",
                        StatementScope::Resource,
                        StatementPrincipal::Service("s3.amazonaws.com".to_string()),
                        &SQS_PRODUCER,
                        vec![queue_arn.clone()],
                    )
                    .with_condition(Condition::source_arn(&arn::bucket(ctx.partition, bucket))),
                );
            }
        }

        for producer in graph.dependents(&queue.id).filter(|d| d.kind != ResourceKind::Processor) {
            statements.push(PermissionStatement::allow(
                "AllowProducer",
                StatementScope::Resource,
                StatementPrincipal::Role(acting_role(producer, ctx)?),
                &SQS_PRODUCER,
                vec![queue_arn.clone()],
            ));
        }

        for consumer in graph.dependents(&queue.id).filter(|d| d.kind == ResourceKind::Processor) {
            statements.push(PermissionStatement::allow(
                "AllowConsumer",
                StatementScope::Resource,
                StatementPrincipal::Role(execution_role(consumer, ctx)?),
                &SQS_CONSUMER,
                vec![queue_arn.clone()],
            ));
        }
    }

    statements.push(PermissionStatement::allow(
        "AllowAdministration",
        StatementScope::Resource,
        StatementPrincipal::Role(execution_role(queue, ctx)?),
        &["sqs:*"],
        vec![queue_arn.clone()],
    ));

    // Always last, after every allow
    statements.push(PermissionStatement::deny_insecure_transport("sqs", &queue_arn));
    Ok(statements)
}

fn processor_statements(
    graph: &DescriptorGraph,
    processor: &ResourceDescriptor,
    ctx: &ComposeContext<'_>,
) -> Result<Vec<PermissionStatement>, CompositionError> {
    let role = execution_role(processor, ctx)?;
    let mut statements = Vec::new();

    match buffer_of(graph, processor) {
        Some(buffer) if buffer.kind == ResourceKind::Queue => {
            statements.push(identity("ConsumeQueue", &role, &SQS_CONSUMER, vec![ctx.resource_arn(buffer)]));
        }
        Some(buffer) => {
            statements.push(identity("ConsumeStream", &role, &KINESIS_CONSUMER, vec![ctx.resource_arn(buffer)]));
        }
        None if ctx.spec.buffer_type != BufferType::None => {
            return Err(CompositionError::MissingDependency {
                descriptor: processor.id.clone(),
                expected: "buffer",
            });
        }
        None => {}
    }

    if ctx.spec.source_type == SourceType::S3 {
        if let Some(bucket) = ctx.spec.source.bucket_name.as_deref() {
            let reader = acting_role(processor, ctx)?;
            statements.push(identity(
                "ReadSourceObjects",
                &reader,
                &["s3:GetObject"],
                vec![arn::bucket_objects(ctx.partition, bucket, ctx.spec.source.prefix.as_deref())],
            ));
            statements.push(identity(
                "ListSourceBucket",
                &reader,
                &["s3:ListBucket"],
                vec![arn::bucket(ctx.partition, bucket)],
            ));
        }
    }

    statements.extend(destination_write(&role, ctx));
    statements.extend(assume_role(processor, ctx)?);
    statements.extend(key_usage(&role, ctx));
    statements.push(identity("WriteOwnLogs", &role, &LOG_WRITE, vec![ctx.own_log_group(processor)]));
    Ok(statements)
}

fn destination_write(role: &str, ctx: &ComposeContext<'_>) -> Vec<PermissionStatement> {
    match &ctx.spec.destination {
        DestinationConfig::Index { domain_arn, .. } => vec![identity(
            "WriteIndex",
            role,
            &["es:ESHttpPost", "es:ESHttpPut"],
            vec![format!("{domain_arn}/*")],
        )],
        DestinationConfig::Table {
            database,
            table_name,
            bucket_name,
        } => vec![
            identity(
                "WriteTableObjects",
                role,
                &["s3:PutObject"],
                vec![arn::bucket_objects(ctx.partition, bucket_name, Some(table_name))],
            ),
            identity(
                "ReadTableSchema",
                role,
                &["glue:GetTable"],
                vec![arn::glue_table(ctx.partition, ctx.region(), ctx.home_account_id, database, table_name)],
            ),
        ],
    }
}

/// Agent fleet, syslog endpoint and subscription filter
fn ingress_statements(
    graph: &DescriptorGraph,
    ingress: &ResourceDescriptor,
    ctx: &ComposeContext<'_>,
) -> Result<Vec<PermissionStatement>, CompositionError> {
    let role = execution_role(ingress, ctx)?;
    let acting = acting_role(ingress, ctx)?;
    let mut statements = Vec::new();
    let groups: Vec<String> = ctx
        .spec
        .source
        .log_group_names
        .iter()
        .map(|group| arn::log_group(ctx.partition, ctx.region(), &ctx.spec.account_id, group))
        .collect();

    match buffer_of(graph, ingress) {
        Some(buffer) if buffer.kind == ResourceKind::Queue => {
            statements.push(identity("WriteBuffer", &acting, &SQS_PRODUCER, vec![ctx.resource_arn(buffer)]));
        }
        Some(buffer) => {
            statements.push(identity("WriteBuffer", &acting, &KINESIS_PRODUCER, vec![ctx.resource_arn(buffer)]));
        }
        None => {
            let processor = dependency_of(graph, ingress, ResourceKind::Processor)?;
            statements.push(
                PermissionStatement::allow(
                    "AllowLogsInvoke",
                    StatementScope::Resource,
                    StatementPrincipal::Service("logs.amazonaws.com".to_string()),
                    &["lambda:InvokeFunction"],
                    vec![ctx.resource_arn(processor)],
                )
                .with_condition(Condition::source_arns(
                    groups.iter().map(|group| format!("{group}:*")).collect(),
                )),
            );
        }
    }

    if ingress.kind == ResourceKind::SubscriptionFilter {
        statements.push(identity(
            "SubscribeSourceLogGroups",
            &acting,
            &["logs:PutSubscriptionFilter", "logs:DeleteSubscriptionFilter"],
            groups,
        ));
    }

    statements.extend(assume_role(ingress, ctx)?);
    statements.extend(key_usage(&acting, ctx));
    if ingress.kind != ResourceKind::SubscriptionFilter {
        statements.push(identity("WriteOwnLogs", &role, &LOG_WRITE, vec![ctx.own_log_group(ingress)]));
    }
    Ok(statements)
}

fn wiring_statements(
    graph: &DescriptorGraph,
    wiring: &ResourceDescriptor,
    ctx: &ComposeContext<'_>,
) -> Result<Vec<PermissionStatement>, CompositionError> {
    dependency_of(graph, wiring, ResourceKind::Processor)?;
    let role = execution_role(wiring, ctx)?;

    let statement = match &ctx.spec.destination {
        DestinationConfig::Index { domain_arn, .. } => identity(
            "ManageIndexTemplates",
            &role,
            &["es:ESHttpGet", "es:ESHttpPut"],
            vec![format!("{domain_arn}/_index_template/*"), format!("{domain_arn}/_plugins/*")],
        ),
        DestinationConfig::Table {
            database,
            table_name,
            ..
        } => identity(
            "ManageTable",
            &role,
            &["glue:CreateTable", "glue:UpdateTable", "glue:GetTable"],
            vec![arn::glue_table(ctx.partition, ctx.region(), ctx.home_account_id, database, table_name)],
        ),
    };
    Ok(vec![statement])
}
