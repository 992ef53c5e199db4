//! Error types for the workflow crate.
//!
//! - `GraphError`: structural problems with the workflow graph
//! - `NodeError`: failures raised by a node implementation
//! - `RouterError`: node output the router cannot place
//! - `ExecutionError`: run-level failures reported by the walker
//! - `ProcessedDataError`: deduplication store failures (wrapped in `rootcause::Report`)
//! - `HookError`: workflow lifecycle hook failures (wrapped in `rootcause::Report`)
//!
//! Backend failures are not flattened into these types; the backend error is
//! kept as a child of the report.

use crate::execution::{LineageStep, RunState};
use serde::{Deserialize, Serialize};
use std::fmt;
use weft_core::NodeId;

/// Errors from graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// Node with the given ID was not found in the graph.
    NodeNotFound { node_id: NodeId },
    /// A node with the same ID is already present.
    DuplicateNode { node_id: NodeId },
    /// The node's type is not registered.
    UnknownNodeType { node_id: NodeId, node_type: String },
    /// A connection leaves from an output pin the node does not declare.
    OutputPinNotFound { node_id: NodeId, index: usize },
    /// A connection arrives at an input pin the node does not declare.
    InputPinNotFound { node_id: NodeId, index: usize },
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::DuplicateNode { node_id } => write!(f, "duplicate node: {node_id}"),
            Self::UnknownNodeType { node_id, node_type } => {
                write!(f, "node {node_id} has unknown type '{node_type}'")
            }
            Self::OutputPinNotFound { node_id, index } => {
                write!(f, "output pin {index} not found on node {node_id}")
            }
            Self::InputPinNotFound { node_id, index } => {
                write!(f, "input pin {index} not found on node {node_id}")
            }
        }
    }
}

impl std::error::Error for GraphError {}

/// A failure raised by a node implementation.
///
/// `item_index` names the input item being processed when the failure
/// happened, if the failure is attributable to one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_index: Option<usize>,
}

impl NodeError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            description: None,
            item_index: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attributes the error to an input item.
    #[must_use]
    pub fn at_item(mut self, index: usize) -> Self {
        self.item_index = Some(index);
        self
    }

    /// Attributes the error to an input item unless it already names one.
    #[must_use]
    pub fn or_item(mut self, index: usize) -> Self {
        self.item_index.get_or_insert(index);
        self
    }
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(index) = self.item_index {
            write!(f, " [item {index}]")?;
        }
        Ok(())
    }
}

impl std::error::Error for NodeError {}

/// An expression inside a parameter could not be evaluated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpressionError {
    pub expression: String,
    pub reason: String,
}

impl fmt::Display for ExpressionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid expression '{}': {}", self.expression, self.reason)
    }
}

impl std::error::Error for ExpressionError {}

/// Node output the router cannot place on the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouterError {
    /// The node returned more output arrays than it declares pins.
    UndeclaredOutput { index: usize, declared: usize },
    /// An item has no lineage and none can be inferred.
    UnresolvableLineage { output_index: usize, item_index: usize },
    /// An item's lineage points at an input item that does not exist.
    DanglingLineage {
        output_index: usize,
        item_index: usize,
        input: usize,
        item: usize,
    },
}

impl fmt::Display for RouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UndeclaredOutput { index, declared } => {
                write!(
                    f,
                    "node returned output {index} but declares only {declared} output pin(s)"
                )
            }
            Self::UnresolvableLineage {
                output_index,
                item_index,
            } => write!(
                f,
                "item {item_index} on output {output_index} has no lineage and it cannot be inferred"
            ),
            Self::DanglingLineage {
                output_index,
                item_index,
                input,
                item,
            } => write!(
                f,
                "item {item_index} on output {output_index} points at missing input item {input}:{item}"
            ),
        }
    }
}

impl std::error::Error for RouterError {}

/// Run-level failures reported by the graph walker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The workflow cannot be executed as defined.
    InvalidGraph(GraphError),
    /// A node failed under the stop-on-error policy.
    NodeFailed {
        node_id: NodeId,
        node_name: String,
        item_index: Option<usize>,
        message: String,
        /// Lineage of the failing input item back to its root, nearest first.
        lineage: Vec<LineageStep>,
    },
    /// A node's output could not be routed.
    Routing {
        node_id: NodeId,
        node_name: String,
        source: RouterError,
    },
    /// A node ran more often than the configured ceiling allows.
    LoopLimitExceeded {
        node_id: NodeId,
        node_name: String,
        limit: u32,
    },
    /// The requested operation is not valid in the run's current state.
    InvalidStateTransition { from: RunState, to: RunState },
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidGraph(error) => write!(f, "invalid workflow graph: {error}"),
            Self::NodeFailed {
                node_name,
                item_index,
                message,
                ..
            } => {
                write!(f, "node '{node_name}' failed: {message}")?;
                if let Some(index) = item_index {
                    write!(f, " (item {index})")?;
                }
                Ok(())
            }
            Self::Routing {
                node_name, source, ..
            } => write!(f, "cannot route output of node '{node_name}': {source}"),
            Self::LoopLimitExceeded {
                node_name, limit, ..
            } => write!(
                f,
                "node '{node_name}' exceeded the limit of {limit} runs per execution"
            ),
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid state transition from {from} to {to}")
            }
        }
    }
}

impl std::error::Error for ExecutionError {}

impl From<GraphError> for ExecutionError {
    fn from(error: GraphError) -> Self {
        Self::InvalidGraph(error)
    }
}

/// Errors from the processed-data store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessedDataError {
    /// Node context was requested without node information.
    MissingNodeContext,
    /// The caller did not identify the workflow.
    MissingWorkflowId,
    /// Recording items failed for a reason other than a uniqueness violation.
    InsertFailed,
    /// Looking up items failed.
    QueryFailed,
    /// Removing items failed.
    DeleteFailed,
}

impl fmt::Display for ProcessedDataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingNodeContext => write!(
                f,
                "no node information has been provided, cannot use context 'node'"
            ),
            Self::MissingWorkflowId => write!(f, "workflow id is missing"),
            Self::InsertFailed => write!(f, "failed to record processed data"),
            Self::QueryFailed => write!(f, "failed to query processed data"),
            Self::DeleteFailed => write!(f, "failed to remove processed data"),
        }
    }
}

impl std::error::Error for ProcessedDataError {}

/// A workflow lifecycle hook failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookError {
    pub hook: String,
}

impl HookError {
    #[must_use]
    pub fn new(hook: impl Into<String>) -> Self {
        Self { hook: hook.into() }
    }
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "lifecycle hook '{}' failed", self.hook)
    }
}

impl std::error::Error for HookError {}
