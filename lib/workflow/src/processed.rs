//! Processed-data interface.
//!
//! Trigger-style nodes use a `ProcessedDataManager` to tell apart values they
//! have already admitted from new ones. The store implementation lives in
//! `weft-processed-data`; this crate only defines the contract.

use crate::error::ProcessedDataError;
use crate::node::Node;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::str::FromStr;
use weft_core::{NodeId, WorkflowId};

/// The scope processed values are remembered in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessedDataContext {
    /// Shared by every node of the workflow.
    #[default]
    Workflow,
    /// Private to one node.
    Node,
}

impl FromStr for ProcessedDataContext {
    type Err = Infallible;

    /// `"node"` selects node scope; anything else is workflow scope.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s == "node" { Self::Node } else { Self::Workflow })
    }
}

/// The node a node-scoped context belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub id: NodeId,
    pub name: String,
}

impl From<&Node> for NodeRef {
    fn from(node: &Node) -> Self {
        Self {
            id: node.id,
            name: node.name.clone(),
        }
    }
}

/// Identifies the caller of a processed-data operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextData {
    pub workflow_id: Option<WorkflowId>,
    pub node: Option<NodeRef>,
}

impl ContextData {
    #[must_use]
    pub fn for_workflow(workflow_id: WorkflowId) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            node: None,
        }
    }

    #[must_use]
    pub fn for_node(workflow_id: WorkflowId, node: &Node) -> Self {
        Self {
            workflow_id: Some(workflow_id),
            node: Some(node.into()),
        }
    }
}

/// Values partitioned into first sightings and repeats, each in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckProcessedOutput {
    pub new: Vec<String>,
    pub processed: Vec<String>,
}

/// Remembers which values a workflow (or one of its nodes) has seen.
///
/// Duplicate values within one call are classified per occurrence.
#[async_trait]
pub trait ProcessedDataManager: Send + Sync {
    /// Partitions `items` without recording anything.
    async fn check_processed(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<CheckProcessedOutput, ProcessedDataError>;

    /// Records `items` and reports which of them were recorded before.
    ///
    /// Recording is atomic per value: of two concurrent callers recording
    /// the same value, exactly one sees it as new.
    async fn check_processed_and_record(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<CheckProcessedOutput, ProcessedDataError>;

    /// Forgets `items`. Values never recorded are ignored.
    async fn remove_processed(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<(), ProcessedDataError>;
}
