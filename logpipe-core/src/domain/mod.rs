//! Core domain types
//!
//! This module contains the core domain structures used across Logpipe services.
//! Pipeline records and links are persisted by the orchestrator; descriptors and
//! provision events only live for the duration of a provisioning run.

pub mod descriptor;
pub mod link;
pub mod permission;
pub mod pipeline;
