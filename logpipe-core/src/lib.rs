//! Logpipe Core
//!
//! Core types and pipeline composition logic for the Logpipe provisioning system.
//!
//! This crate contains:
//! - Domain types: Pipeline specs and records, resource descriptors, permissions, links
//! - DTOs: Request/response shapes shared by the orchestrator API, client and CLI
//! - Composition: the descriptor resolver, the permission composer and the descriptor DAG
//! - Validation: cross-account link checks and the pipeline lifecycle transition table
//!
//! Everything here is pure and synchronous. Persistence and provisioning live in
//! the orchestrator.

pub mod arn;
pub mod composer;
pub mod domain;
pub mod dto;
pub mod error;
pub mod graph;
pub mod lifecycle;
pub mod link;
pub mod resolver;

pub use composer::{ComposeContext, compose, role_documents};
pub use error::{CompositionError, GraphError, ResolveError, ValidationError};
pub use graph::{DescriptorGraph, GraphBuilder};
pub use resolver::resolve;
