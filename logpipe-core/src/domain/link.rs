//! Cross-account link domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the linked role answered the reachability check at link time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    Verified,
    Unverified,
}

impl LinkStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LinkStatus::Verified => "Verified",
            LinkStatus::Unverified => "Unverified",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "Verified" => LinkStatus::Verified,
            _ => LinkStatus::Unverified,
        }
    }
}

/// Registered trust relationship with a sub-account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossAccountLink {
    pub id: Uuid,
    pub sub_account_id: String,
    pub region: String,
    pub role_arn: String,
    pub bucket_name: String,
    pub stack_id: String,
    pub kms_key_arn: String,
    pub status: LinkStatus,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
