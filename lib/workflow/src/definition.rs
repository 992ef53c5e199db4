//! Workflow definition types.
//!
//! A workflow is an identified, named graph of nodes. Its JSON form keeps
//! metadata, `nodes` and `connections` side by side at the top level.

use crate::edge::Connection;
use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::Node;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use weft_core::{NodeId, WorkflowId};

/// Metadata for a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowMetadata {
    /// Human-readable name for this workflow.
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether triggers should fire for this workflow.
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

impl WorkflowMetadata {
    /// Creates new metadata with default values.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            description: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(flatten)]
    pub metadata: WorkflowMetadata,
    #[serde(flatten)]
    pub graph: WorkflowGraph,
}

impl Workflow {
    /// Creates a new, empty workflow with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(WorkflowId::new(), name)
    }

    /// Creates a workflow with a specific ID.
    #[must_use]
    pub fn with_id(id: WorkflowId, name: impl Into<String>) -> Self {
        Self {
            id,
            metadata: WorkflowMetadata::new(name),
            graph: WorkflowGraph::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// Adds a node and returns its ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's ID is already taken.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        let node_id = self.graph.add_node(node)?;
        self.touch();
        Ok(node_id)
    }

    /// Connects output 0 of `source` to input 0 of `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node doesn't exist.
    pub fn connect(&mut self, source: NodeId, target: NodeId) -> Result<(), GraphError> {
        self.connect_pins(source, target, Connection::main())
    }

    /// Connects explicit pins of two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if either node doesn't exist.
    pub fn connect_pins(
        &mut self,
        source: NodeId,
        target: NodeId,
        connection: Connection,
    ) -> Result<(), GraphError> {
        self.graph.add_connection(source, target, connection)?;
        self.touch();
        Ok(())
    }

    /// Marks the workflow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}
