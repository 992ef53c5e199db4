//! Workflow nodes.
//!
//! A node is an instance of a node type placed in a workflow: it names the
//! type, carries the user's parameters, and selects a failure policy.

use crate::item::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use weft_core::NodeId;

/// How a node reacts to failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// Any failure aborts the node and fails the run.
    #[default]
    StopOnError,
    /// Failures become error items on output 0 and execution continues.
    ContinueOnFail,
}

/// Per-node behavior settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSettings {
    #[serde(default)]
    pub continue_on_fail: bool,
}

/// A node in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Stable identity, unchanged by renames.
    pub id: NodeId,
    /// Display name, unique within a workflow by convention.
    pub name: String,
    /// Registered node type, e.g. `weft.set`.
    #[serde(rename = "type")]
    pub node_type: String,
    #[serde(default)]
    pub parameters: JsonObject,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub settings: NodeSettings,
}

impl Node {
    /// Creates a node with a fresh ID.
    #[must_use]
    pub fn new(name: impl Into<String>, node_type: impl Into<String>) -> Self {
        Self {
            id: NodeId::new(),
            name: name.into(),
            node_type: node_type.into(),
            parameters: JsonObject::new(),
            disabled: false,
            settings: NodeSettings::default(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = id;
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: JsonValue) -> Self {
        self.parameters.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.disabled = true;
        self
    }

    #[must_use]
    pub fn continue_on_fail(mut self) -> Self {
        self.settings.continue_on_fail = true;
        self
    }

    /// Returns a raw, unresolved parameter.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&JsonValue> {
        self.parameters.get(name)
    }

    #[must_use]
    pub fn error_policy(&self) -> ErrorPolicy {
        if self.settings.continue_on_fail {
            ErrorPolicy::ContinueOnFail
        } else {
            ErrorPolicy::StopOnError
        }
    }
}
