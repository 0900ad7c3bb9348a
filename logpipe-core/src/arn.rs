//! ARN construction and parsing

use regex::Regex;
use std::sync::LazyLock;

static ROLE_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^arn:(?P<partition>aws[a-z-]*):iam::(?P<account>\d{12}):role/(?P<name>[\w+=,.@/-]+)$")
        .expect("valid role arn pattern")
});

static STACK_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^arn:(?P<partition>aws[a-z-]*):cloudformation:(?P<region>[a-z0-9-]+):(?P<account>\d{12}):stack/(?P<name>[A-Za-z][A-Za-z0-9-]*)/(?P<uuid>[0-9a-f-]+)$",
    )
    .expect("valid stack id pattern")
});

static KMS_KEY_ARN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^arn:(?P<partition>aws[a-z-]*):kms:(?P<region>[a-z0-9-]+):(?P<account>\d{12}):key/(?P<key>[A-Za-z0-9-]+)$",
    )
    .expect("valid kms key pattern")
});

/// Components of a parsed ARN that matter for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArnParts {
    pub partition: String,
    pub region: Option<String>,
    pub account: String,
}

fn parts(re: &Regex, arn: &str) -> Option<ArnParts> {
    let caps = re.captures(arn)?;
    Some(ArnParts {
        partition: caps["partition"].to_string(),
        region: caps.name("region").map(|m| m.as_str().to_string()),
        account: caps["account"].to_string(),
    })
}

pub fn parse_role_arn(arn: &str) -> Option<ArnParts> {
    parts(&ROLE_ARN, arn)
}

pub fn parse_stack_id(arn: &str) -> Option<ArnParts> {
    parts(&STACK_ID, arn)
}

pub fn parse_kms_key_arn(arn: &str) -> Option<ArnParts> {
    parts(&KMS_KEY_ARN, arn)
}

pub fn role(partition: &str, account: &str, name: &str) -> String {
    format!("arn:{partition}:iam::{account}:role/{name}")
}

pub fn queue(partition: &str, region: &str, account: &str, name: &str) -> String {
    format!("arn:{partition}:sqs:{region}:{account}:{name}")
}

pub fn stream(partition: &str, region: &str, account: &str, name: &str) -> String {
    format!("arn:{partition}:kinesis:{region}:{account}:stream/{name}")
}

pub fn function(partition: &str, region: &str, account: &str, name: &str) -> String {
    format!("arn:{partition}:lambda:{region}:{account}:function:{name}")
}

pub fn log_group(partition: &str, region: &str, account: &str, name: &str) -> String {
    format!("arn:{partition}:logs:{region}:{account}:log-group:{name}")
}

pub fn bucket(partition: &str, name: &str) -> String {
    format!("arn:{partition}:s3:::{name}")
}

/// Objects under an optional key prefix
pub fn bucket_objects(partition: &str, name: &str, prefix: Option<&str>) -> String {
    let prefix = prefix.unwrap_or("").trim_start_matches('/');
    format!("arn:{partition}:s3:::{name}/{prefix}*")
}

pub fn glue_table(partition: &str, region: &str, account: &str, database: &str, table: &str) -> String {
    format!("arn:{partition}:glue:{region}:{account}:table/{database}/{table}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_role_arn() {
        let parts = parse_role_arn("arn:aws:iam::111122223333:role/logpipe/LinkRole").unwrap();
        assert_eq!(parts.partition, "aws");
        assert_eq!(parts.account, "111122223333");
        assert_eq!(parts.region, None);
    }

    #[test]
    fn test_parse_role_arn_rejects_other_services() {
        assert!(parse_role_arn("arn:aws:iam::111122223333:user/bob").is_none());
        assert!(parse_role_arn("arn:aws:iam::1111:role/x").is_none());
    }

    #[test]
    fn test_parse_stack_id_extracts_region() {
        let parts = parse_stack_id(
            "arn:aws-cn:cloudformation:cn-north-1:111122223333:stack/LinkStack/0f0e4a10-1b2c-11ee-a1b2-0a1b2c3d4e5f",
        )
        .unwrap();
        assert_eq!(parts.partition, "aws-cn");
        assert_eq!(parts.region.as_deref(), Some("cn-north-1"));
    }

    #[test]
    fn test_parse_kms_key_arn() {
        let parts =
            parse_kms_key_arn("arn:aws:kms:us-east-1:111122223333:key/1234abcd-12ab-34cd-56ef-1234567890ab")
                .unwrap();
        assert_eq!(parts.account, "111122223333");
    }

    #[test]
    fn test_bucket_objects_with_prefix() {
        assert_eq!(
            bucket_objects("aws", "logs", Some("/AWSLogs/")),
            "arn:aws:s3:::logs/AWSLogs/*"
        );
        assert_eq!(bucket_objects("aws", "logs", None), "arn:aws:s3:::logs/*");
    }
}
