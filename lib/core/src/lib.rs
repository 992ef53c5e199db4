//! Core domain types shared by every weft crate.
//!
//! This crate provides the strongly-typed identifiers and the `Result`
//! alias used throughout the workflow runtime.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{NodeId, ParseIdError, WorkflowId, WorkflowRunId};
