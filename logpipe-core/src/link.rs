//! Cross-account link validation
//!
//! A link is only accepted when every ARN it carries belongs to the linked
//! account, and its stack lives in the home region. The checks run at link time
//! so pipeline creation never sees a malformed link.

use crate::arn;
use crate::dto::link::LinkAccount;
use crate::error::ValidationError;

pub fn is_account_id(value: &str) -> bool {
    value.len() == 12 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Validates a link candidate against the home region
pub fn validate(candidate: &LinkAccount, home_region: &str) -> Result<(), ValidationError> {
    let account = candidate.sub_account_id.as_str();
    if !is_account_id(account) {
        return Err(ValidationError::InvalidField {
            field: "sub_account_id",
            reason: format!("'{}' is not a 12 digit account id", account),
        });
    }

    let role = arn::parse_role_arn(&candidate.role_arn).ok_or_else(|| invalid_arn("role_arn"))?;
    ensure_account("role_arn", account, &role.account)?;

    let stack = arn::parse_stack_id(&candidate.stack_id).ok_or_else(|| invalid_arn("stack_id"))?;
    ensure_account("stack_id", account, &stack.account)?;
    let stack_region = stack.region.unwrap_or_default();
    if stack_region != home_region {
        return Err(ValidationError::StackRegionMismatch {
            expected: home_region.to_string(),
            found: stack_region,
        });
    }

    let key = arn::parse_kms_key_arn(&candidate.kms_key_arn)
        .ok_or_else(|| invalid_arn("kms_key_arn"))?;
    ensure_account("kms_key_arn", account, &key.account)?;

    if !is_bucket_name(&candidate.bucket_name) {
        return Err(ValidationError::InvalidField {
            field: "bucket_name",
            reason: format!("'{}' is not a valid bucket name", candidate.bucket_name),
        });
    }

    Ok(())
}

fn ensure_account(field: &'static str, expected: &str, found: &str) -> Result<(), ValidationError> {
    if expected != found {
        return Err(ValidationError::EmbeddedAccountMismatch {
            field,
            expected: expected.to_string(),
            found: found.to_string(),
        });
    }
    Ok(())
}

fn invalid_arn(field: &'static str) -> ValidationError {
    ValidationError::InvalidField {
        field,
        reason: "malformed ARN".to_string(),
    }
}

fn is_bucket_name(name: &str) -> bool {
    (3..=63).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
        && !name.starts_with(['.', '-'])
        && !name.ends_with(['.', '-'])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate() -> LinkAccount {
        LinkAccount {
            sub_account_id: "111122223333".to_string(),
            region: "us-east-1".to_string(),
            role_arn: "arn:aws:iam::111122223333:role/LogpipeLinkRole".to_string(),
            bucket_name: "linked-logs".to_string(),
            stack_id: "arn:aws:cloudformation:us-east-1:111122223333:stack/LogpipeLink/6a1b7c30-3f2e-11ee-be56-0242ac120002"
                .to_string(),
            kms_key_arn: "arn:aws:kms:us-east-1:111122223333:key/1234abcd-12ab-34cd-56ef-1234567890ab"
                .to_string(),
        }
    }

    #[test]
    fn test_valid_link() {
        assert_eq!(validate(&candidate(), "us-east-1"), Ok(()));
    }

    #[test]
    fn test_role_from_other_account_is_rejected() {
        let mut link = candidate();
        link.role_arn = "arn:aws:iam::999999999999:role/x".to_string();

        assert_eq!(
            validate(&link, "us-east-1"),
            Err(ValidationError::EmbeddedAccountMismatch {
                field: "role_arn",
                expected: "111122223333".to_string(),
                found: "999999999999".to_string(),
            })
        );
    }

    #[test]
    fn test_kms_key_from_other_account_is_rejected() {
        let mut link = candidate();
        link.kms_key_arn =
            "arn:aws:kms:us-east-1:444455556666:key/1234abcd-12ab-34cd-56ef-1234567890ab".to_string();

        assert!(matches!(
            validate(&link, "us-east-1"),
            Err(ValidationError::EmbeddedAccountMismatch { field: "kms_key_arn", .. })
        ));
    }

    #[test]
    fn test_stack_in_other_region_is_rejected() {
        assert_eq!(
            validate(&candidate(), "eu-west-1"),
            Err(ValidationError::StackRegionMismatch {
                expected: "eu-west-1".to_string(),
                found: "us-east-1".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_stack_id_is_rejected() {
        let mut link = candidate();
        link.stack_id = "LogpipeLink".to_string();
        assert!(matches!(
            validate(&link, "us-east-1"),
            Err(ValidationError::InvalidField { field: "stack_id", .. })
        ));
    }

    #[test]
    fn test_bucket_name_rules() {
        assert!(is_bucket_name("linked-logs"));
        assert!(!is_bucket_name("Linked_Logs"));
        assert!(!is_bucket_name("-logs"));
        assert!(!is_bucket_name("ab"));
    }
}
