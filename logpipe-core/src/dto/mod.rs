//! Data Transfer Objects for the orchestrator API
//!
//! These are the request and response bodies shared by the orchestrator, the
//! client and the CLI. Domain records that are returned unchanged (pipeline
//! records, links) are serialized directly and have no DTO.

pub mod link;
pub mod pipeline;
