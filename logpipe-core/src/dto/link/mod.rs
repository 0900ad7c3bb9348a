//! Cross-account link DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::link::LinkStatus;

/// Request to link a sub-account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkAccount {
    pub sub_account_id: String,
    pub region: String,
    pub role_arn: String,
    pub bucket_name: String,
    pub stack_id: String,
    pub kms_key_arn: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkCreated {
    pub link_id: Uuid,
    pub status: LinkStatus,
}
