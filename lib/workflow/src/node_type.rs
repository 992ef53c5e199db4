//! The node contract.
//!
//! Every node implementation describes itself (type name, pins, parameter
//! schema) and executes against an [`ExecutionContext`]. The engine never
//! looks inside a node; it only sees items going in and out.

use crate::context::ExecutionContext;
use crate::error::NodeError;
use crate::expression::is_expression;
use crate::item::{Item, JsonObject};
use crate::pin::{InputPin, OutputPin};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// One array of items per output pin.
pub type NodeOutput = Vec<Vec<Item>>;

/// The JSON shape a parameter accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    /// A JSON object.
    Collection,
    /// A JSON array.
    List,
    /// A string out of a fixed set.
    Options(Vec<String>),
    Any,
}

impl ParameterKind {
    fn accepts(&self, value: &JsonValue) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Collection => value.is_object(),
            Self::List => value.is_array(),
            Self::Options(options) => value
                .as_str()
                .is_some_and(|value| options.iter().any(|option| option == value)),
            Self::Any => true,
        }
    }
}

/// Declares one node parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParameterKind,
    pub required: bool,
    pub default: Option<JsonValue>,
}

impl ParameterSpec {
    #[must_use]
    pub fn required(name: impl Into<String>, kind: ParameterKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
            default: None,
        }
    }

    #[must_use]
    pub fn optional(name: impl Into<String>, kind: ParameterKind, default: JsonValue) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            default: Some(default),
        }
    }
}

/// What a node type looks like from the outside.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeDescription {
    pub type_name: String,
    pub display_name: String,
    pub inputs: Vec<InputPin>,
    pub outputs: Vec<OutputPin>,
    pub parameters: Vec<ParameterSpec>,
}

impl NodeDescription {
    /// Creates a description without pins or parameters.
    #[must_use]
    pub fn new(type_name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            display_name: display_name.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            parameters: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_input(mut self, pin: InputPin) -> Self {
        self.inputs.push(pin);
        self
    }

    #[must_use]
    pub fn with_output(mut self, pin: OutputPin) -> Self {
        self.outputs.push(pin);
        self
    }

    #[must_use]
    pub fn with_parameter(mut self, parameter: ParameterSpec) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// Trigger nodes have no input pins.
    #[must_use]
    pub fn is_trigger(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Applies declared defaults and validates declared parameters.
    ///
    /// Values holding expressions are only checked for presence; their type
    /// is known once they are resolved per item.
    ///
    /// # Errors
    ///
    /// Returns an error when a required parameter is missing or a literal
    /// value has the wrong shape.
    pub fn resolve_parameters(&self, raw: &JsonObject) -> Result<JsonObject, NodeError> {
        let mut parameters = raw.clone();
        for spec in &self.parameters {
            match parameters.get(&spec.name) {
                None | Some(JsonValue::Null) => {
                    if let Some(default) = &spec.default {
                        parameters.insert(spec.name.clone(), default.clone());
                    } else if spec.required {
                        return Err(NodeError::new(format!(
                            "missing required parameter '{}'",
                            spec.name
                        )));
                    }
                }
                Some(JsonValue::String(text)) if is_expression(text) => {}
                Some(value) if !spec.kind.accepts(value) => {
                    return Err(NodeError::new(format!(
                        "parameter '{}' has an invalid value",
                        spec.name
                    ))
                    .with_description(format!("expected {:?}, got {value}", spec.kind)));
                }
                Some(_) => {}
            }
        }
        Ok(parameters)
    }
}

/// A node implementation.
#[async_trait]
pub trait NodeType: Send + Sync {
    fn description(&self) -> NodeDescription;

    /// Runs the node once over everything buffered on its inputs.
    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError>;
}

/// A node type with its description computed once.
#[derive(Clone)]
pub struct RegisteredNodeType {
    pub node_type: Arc<dyn NodeType>,
    pub description: NodeDescription,
}

impl std::fmt::Debug for RegisteredNodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredNodeType")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Node types available to a walker, by type name.
#[derive(Debug, Clone, Default)]
pub struct NodeTypeRegistry {
    types: HashMap<String, RegisteredNodeType>,
}

impl NodeTypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a node type under its description's type name.
    ///
    /// A later registration for the same name replaces the earlier one.
    pub fn register<T: NodeType + 'static>(&mut self, node_type: T) {
        self.register_arc(Arc::new(node_type));
    }

    pub fn register_arc(&mut self, node_type: Arc<dyn NodeType>) {
        let description = node_type.description();
        self.types.insert(
            description.type_name.clone(),
            RegisteredNodeType {
                node_type,
                description,
            },
        );
    }

    #[must_use]
    pub fn get(&self, type_name: &str) -> Option<&RegisteredNodeType> {
        self.types.get(type_name)
    }

    #[must_use]
    pub fn contains(&self, type_name: &str) -> bool {
        self.types.contains_key(type_name)
    }

    /// Registered type names, sorted.
    #[must_use]
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.types.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
