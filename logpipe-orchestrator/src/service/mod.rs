//! Service Module
//!
//! Business logic layer for the orchestrator.
//! Services orchestrate between repositories, the provisioning engine and the
//! lifecycle state machine.

pub mod lifecycle;
pub mod link;
pub mod pipeline;
pub mod role_check;

pub use lifecycle::LifecycleManager;
pub use link::LinkRegistry;
pub use pipeline::{HomeContext, PipelineService};
pub use role_check::{HttpRoleVerifier, RoleVerifier, StaticRoleVerifier};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use logpipe_core::domain::pipeline::{
        BufferType, DestinationConfig, DestinationEngine, PipelineSpec, SourceConfig, SourceType,
    };
    use logpipe_core::dto::link::LinkAccount;
    use logpipe_core::dto::pipeline::CreatePipeline;

    use crate::provisioning::executor::test_support::fast_retry;
    use crate::provisioning::{InMemoryProvisioningApi, Provisioner};
    use crate::repository::{InMemoryLinkRepository, InMemoryPipelineRepository};
    use crate::service::{
        HomeContext, LifecycleManager, LinkRegistry, PipelineService, StaticRoleVerifier,
    };

    pub const HOME: &str = "123456789012";
    pub const LINKED: &str = "111122223333";
    pub const REGION: &str = "us-east-1";

    /// Fully wired service over in-memory storage and backend
    pub struct Harness {
        pub service: Arc<PipelineService>,
        pub links: Arc<LinkRegistry>,
        pub api: Arc<InMemoryProvisioningApi>,
        pub repo: Arc<InMemoryPipelineRepository>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self::with_api(InMemoryProvisioningApi::new())
        }

        pub fn with_api(api: InMemoryProvisioningApi) -> Self {
            let api = Arc::new(api);
            let repo = Arc::new(InMemoryPipelineRepository::new());
            let links = Arc::new(LinkRegistry::new(
                Arc::new(InMemoryLinkRepository::new()),
                Arc::new(StaticRoleVerifier::new(true)),
                REGION,
            ));
            let provisioner = Provisioner::new(api.clone(), links.clone(), 4, fast_retry());
            let lifecycle = Arc::new(LifecycleManager::new(repo.clone()));
            let service = Arc::new(PipelineService::new(
                repo.clone(),
                lifecycle,
                links.clone(),
                provisioner,
                HomeContext {
                    partition: "aws".to_string(),
                    account_id: HOME.to_string(),
                    region: REGION.to_string(),
                },
            ));

            Self {
                service,
                links,
                api,
                repo,
            }
        }
    }

    fn index_destination() -> DestinationConfig {
        DestinationConfig::Index {
            domain_arn: format!("arn:aws:es:{REGION}:{HOME}:domain/logs"),
            index_prefix: "app-logs".to_string(),
            shards: 1,
            replicas: 1,
        }
    }

    fn request(source_type: SourceType, buffer_type: BufferType, source: SourceConfig, log_type: &str) -> CreatePipeline {
        CreatePipeline {
            source_type,
            buffer_type,
            destination_engine: DestinationEngine::OpenSearch,
            account_id: None,
            region: None,
            encryption_key_ref: None,
            source,
            log_type: log_type.to_string(),
            destination: index_destination(),
            lifecycle: None,
        }
    }

    pub fn s3_request(buffer_type: BufferType) -> CreatePipeline {
        let source = SourceConfig {
            bucket_name: Some("source-logs".to_string()),
            prefix: Some("AWSLogs/".to_string()),
            ..SourceConfig::default()
        };
        request(SourceType::S3, buffer_type, source, "CloudTrail")
    }

    pub fn ec2_request(buffer_type: BufferType) -> CreatePipeline {
        let source = SourceConfig {
            log_paths: vec!["/var/log/app/*.log".to_string()],
            ..SourceConfig::default()
        };
        request(SourceType::Ec2, buffer_type, source, "JSON")
    }

    pub fn cloudwatch_request(buffer_type: BufferType) -> CreatePipeline {
        let source = SourceConfig {
            log_group_names: vec!["/app/web".to_string()],
            ..SourceConfig::default()
        };
        request(SourceType::CloudWatch, buffer_type, source, "JSON")
    }

    pub fn s3_spec() -> PipelineSpec {
        s3_request(BufferType::Sqs).into_spec(HOME, REGION)
    }

    pub fn link_request() -> LinkAccount {
        LinkAccount {
            sub_account_id: LINKED.to_string(),
            region: REGION.to_string(),
            role_arn: format!("arn:aws:iam::{LINKED}:role/LogpipeLinkRole"),
            bucket_name: "linked-logs".to_string(),
            stack_id: format!(
                "arn:aws:cloudformation:{REGION}:{LINKED}:stack/LogpipeLink/6a1b7c30-3f2e-11ee-be56-0242ac120002"
            ),
            kms_key_arn: format!(
                "arn:aws:kms:{REGION}:{LINKED}:key/1234abcd-12ab-34cd-56ef-1234567890ab"
            ),
        }
    }
}
