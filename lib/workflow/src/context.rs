//! What a node sees while it executes.

use crate::definition::Workflow;
use crate::error::NodeError;
use crate::expression::{ExpressionScope, resolve};
use crate::item::JsonObject;
use crate::node::{ErrorPolicy, Node};
use crate::pin::PinData;
use crate::processed::{ContextData, ProcessedDataManager};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

/// Supplies decrypted credentials to nodes.
#[async_trait]
pub trait CredentialsProvider: Send + Sync {
    async fn credentials(&self, node: &Node, credential_type: &str)
    -> Result<JsonObject, NodeError>;
}

static EMPTY_PIN: PinData = PinData::new();

/// Execution context handed to [`NodeType::execute`](crate::NodeType::execute).
pub struct ExecutionContext<'a> {
    workflow: &'a Workflow,
    node: &'a Node,
    parameters: JsonObject,
    inputs: &'a [PinData],
    run_index: usize,
    processed_data: Option<&'a dyn ProcessedDataManager>,
    credentials: Option<&'a dyn CredentialsProvider>,
}

impl<'a> ExecutionContext<'a> {
    /// Creates a context using the node's raw parameters.
    #[must_use]
    pub fn new(workflow: &'a Workflow, node: &'a Node, inputs: &'a [PinData]) -> Self {
        Self {
            workflow,
            node,
            parameters: node.parameters.clone(),
            inputs,
            run_index: 0,
            processed_data: None,
            credentials: None,
        }
    }

    /// Replaces the parameters, e.g. with defaults applied.
    #[must_use]
    pub fn with_parameters(mut self, parameters: JsonObject) -> Self {
        self.parameters = parameters;
        self
    }

    #[must_use]
    pub fn with_run_index(mut self, run_index: usize) -> Self {
        self.run_index = run_index;
        self
    }

    #[must_use]
    pub fn with_processed_data(mut self, manager: &'a dyn ProcessedDataManager) -> Self {
        self.processed_data = Some(manager);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, provider: &'a dyn CredentialsProvider) -> Self {
        self.credentials = Some(provider);
        self
    }

    #[must_use]
    pub fn workflow(&self) -> &'a Workflow {
        self.workflow
    }

    #[must_use]
    pub fn node(&self) -> &'a Node {
        self.node
    }

    /// How many times this node ran before in the current run.
    #[must_use]
    pub fn run_index(&self) -> usize {
        self.run_index
    }

    #[must_use]
    pub fn inputs(&self) -> &'a [PinData] {
        self.inputs
    }

    /// Data buffered on an input pin; empty if the pin received nothing.
    #[must_use]
    pub fn input(&self, pin: usize) -> &'a PinData {
        self.inputs.get(pin).unwrap_or(&EMPTY_PIN)
    }

    #[must_use]
    pub fn continue_on_fail(&self) -> bool {
        self.node.error_policy() == ErrorPolicy::ContinueOnFail
    }

    #[must_use]
    pub fn parameters(&self) -> &JsonObject {
        &self.parameters
    }

    /// A parameter as configured, expressions unresolved.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&JsonValue> {
        self.parameters.get(name)
    }

    /// Deserializes a parameter as configured. Missing parameters read as `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value does not deserialize into `T`.
    pub fn parameter_as<T: DeserializeOwned>(&self, name: &str) -> Result<T, NodeError> {
        let value = self.parameter(name).cloned().unwrap_or(JsonValue::Null);
        serde_json::from_value(value)
            .map_err(|e| NodeError::new(format!("invalid parameter '{name}': {e}")))
    }

    /// A parameter with expressions resolved against input item `item_index`
    /// of the first pin.
    ///
    /// # Errors
    ///
    /// Returns an error, attributed to the item, if an expression is invalid.
    pub fn item_parameter(&self, name: &str, item_index: usize) -> Result<JsonValue, NodeError> {
        let Some(raw) = self.parameter(name) else {
            return Ok(JsonValue::Null);
        };
        let empty = JsonObject::new();
        let json = self
            .input(0)
            .get(item_index)
            .map_or(&empty, |item| item.json());
        let scope = ExpressionScope {
            json,
            item_index,
            run_index: self.run_index,
        };
        resolve(raw, &scope).map_err(|e| NodeError::new(e.to_string()).at_item(item_index))
    }

    /// Resolves a parameter for one item and deserializes it.
    ///
    /// # Errors
    ///
    /// Returns an error if resolution or deserialization fails.
    pub fn item_parameter_as<T: DeserializeOwned>(
        &self,
        name: &str,
        item_index: usize,
    ) -> Result<T, NodeError> {
        let value = self.item_parameter(name, item_index)?;
        serde_json::from_value(value).map_err(|e| {
            NodeError::new(format!("invalid parameter '{name}': {e}")).at_item(item_index)
        })
    }

    /// The processed-data manager the host configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the host runs without one.
    pub fn processed_data(&self) -> Result<&'a dyn ProcessedDataManager, NodeError> {
        self.processed_data
            .ok_or_else(|| NodeError::new("no processed-data store is configured"))
    }

    /// Identifies this node for processed-data operations.
    #[must_use]
    pub fn context_data(&self) -> ContextData {
        ContextData::for_node(self.workflow.id, self.node)
    }

    /// Fetches credentials of the given type for this node.
    ///
    /// # Errors
    ///
    /// Returns an error if no provider is configured or the provider fails.
    pub async fn credentials(&self, credential_type: &str) -> Result<JsonObject, NodeError> {
        let provider = self
            .credentials
            .ok_or_else(|| NodeError::new("no credentials provider is configured"))?;
        provider.credentials(self.node, credential_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use serde_json::json;

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    struct StaticCredentials;

    #[async_trait]
    impl CredentialsProvider for StaticCredentials {
        async fn credentials(
            &self,
            node: &Node,
            credential_type: &str,
        ) -> Result<JsonObject, NodeError> {
            Ok(object(json!({ "type": credential_type, "node": node.name })))
        }
    }

    #[test]
    fn item_parameter_resolves_against_input_item() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Set", "weft.set").with_parameter("value", json!("{{ $json.n }}"));
        let inputs = vec![PinData::from_items(vec![
            Item::new(object(json!({ "n": 10 }))),
            Item::new(object(json!({ "n": 20 }))),
        ])];
        let ctx = ExecutionContext::new(&workflow, &node, &inputs);

        assert_eq!(ctx.item_parameter("value", 1).unwrap(), json!(20));
        assert_eq!(ctx.item_parameter_as::<u32>("value", 0).unwrap(), 10);
        assert_eq!(ctx.item_parameter("missing", 0).unwrap(), JsonValue::Null);
    }

    #[test]
    fn invalid_expression_is_attributed_to_item() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Set", "weft.set").with_parameter("value", json!("{{ $nope }}"));
        let inputs = vec![PinData::from_items(vec![Item::default()])];
        let ctx = ExecutionContext::new(&workflow, &node, &inputs);

        let err = ctx.item_parameter("value", 0).unwrap_err();
        assert_eq!(err.item_index, Some(0));
    }

    #[test]
    fn missing_pin_reads_as_empty() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Merge", "weft.merge");
        let ctx = ExecutionContext::new(&workflow, &node, &[]);
        assert!(ctx.input(1).is_empty());
        assert!(ctx.processed_data().is_err());
    }

    #[tokio::test]
    async fn credentials_come_from_provider() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Db", "weft.database");
        let provider = StaticCredentials;
        let ctx = ExecutionContext::new(&workflow, &node, &[]).with_credentials(&provider);

        let credentials = ctx.credentials("postgres").await.unwrap();
        assert_eq!(credentials.get("type"), Some(&json!("postgres")));

        let bare = ExecutionContext::new(&workflow, &node, &[]);
        assert!(bare.credentials("postgres").await.is_err());
    }
}
