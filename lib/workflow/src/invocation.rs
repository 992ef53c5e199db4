//! Node invocation and failure policies.
//!
//! `invoke` is the walker's single entry point into a node. It applies
//! parameter defaults, passes disabled nodes through, and turns failures into
//! error items when the node continues on fail. Nodes that process items one
//! by one implement [`ItemOperation`] and let [`run_per_item`] apply the
//! per-item policy.

use crate::context::{CredentialsProvider, ExecutionContext};
use crate::definition::Workflow;
use crate::error::NodeError;
use crate::item::{Item, JsonObject, PairedItem};
use crate::node::{ErrorPolicy, Node};
use crate::node_type::{NodeOutput, RegisteredNodeType};
use crate::pin::PinData;
use crate::processed::ProcessedDataManager;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::{debug, instrument, warn};

/// Per-item node logic.
#[async_trait]
pub trait ItemOperation: Send + Sync {
    /// Processes input item `index` of the first pin.
    ///
    /// Returned items without lineage are paired with `index`.
    async fn execute_item(
        &self,
        ctx: &ExecutionContext<'_>,
        index: usize,
        item: &Item,
    ) -> Result<Vec<Item>, NodeError>;
}

/// Runs an [`ItemOperation`] over every item of the first input pin.
///
/// Under stop-on-error the first failure is returned with its item index.
/// Under continue-on-fail each failure becomes an error item in place of the
/// item's output and the remaining items still run.
///
/// # Errors
///
/// Returns the first item failure when the node stops on error.
pub async fn run_per_item<O>(operation: &O, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError>
where
    O: ItemOperation + ?Sized,
{
    let mut output = Vec::new();
    for (index, item) in ctx.input(0).items().enumerate() {
        match operation.execute_item(ctx, index, item).await {
            Ok(items) => output.extend(items.into_iter().map(|mut produced| {
                produced.inherit_lineage(PairedItem::new(index));
                produced
            })),
            Err(error) => {
                let error = error.or_item(index);
                if !ctx.continue_on_fail() {
                    return Err(error);
                }
                debug!(item_index = index, error = %error, "item failed, continuing");
                output.push(error_item(item, &error, index));
            }
        }
    }
    Ok(vec![output])
}

/// Builds the error item that replaces a failed input item.
///
/// The item carries `{ message, item, error }` and is paired with the input.
#[must_use]
pub fn error_item(input: &Item, error: &NodeError, index: usize) -> Item {
    let mut json = JsonObject::new();
    json.insert("message".to_string(), JsonValue::String(error.message.clone()));
    json.insert("item".to_string(), JsonValue::Object(input.json().clone()));
    json.insert(
        "error".to_string(),
        serde_json::to_value(error).unwrap_or(JsonValue::Null),
    );
    Item::derive(json, index)
}

/// Everything the walker hands to one node invocation.
pub struct Invocation<'a> {
    pub workflow: &'a Workflow,
    pub node: &'a Node,
    pub inputs: &'a [PinData],
    pub run_index: usize,
    pub processed_data: Option<&'a dyn ProcessedDataManager>,
    pub credentials: Option<&'a dyn CredentialsProvider>,
}

impl<'a> Invocation<'a> {
    #[must_use]
    pub fn new(workflow: &'a Workflow, node: &'a Node, inputs: &'a [PinData]) -> Self {
        Self {
            workflow,
            node,
            inputs,
            run_index: 0,
            processed_data: None,
            credentials: None,
        }
    }
}

/// Invokes a node once.
///
/// # Errors
///
/// Returns the node's error when it stops on error.
#[instrument(
    skip(registered, invocation),
    fields(node = %invocation.node.name, node_type = %invocation.node.node_type, run_index = invocation.run_index)
)]
pub async fn invoke(
    registered: &RegisteredNodeType,
    invocation: Invocation<'_>,
) -> Result<NodeOutput, NodeError> {
    let Invocation {
        workflow,
        node,
        inputs,
        run_index,
        processed_data,
        credentials,
    } = invocation;

    if node.disabled {
        debug!("node disabled, passing input through");
        return Ok(vec![passthrough(inputs)]);
    }

    let result = match registered.description.resolve_parameters(&node.parameters) {
        Ok(parameters) => {
            let mut ctx = ExecutionContext::new(workflow, node, inputs)
                .with_parameters(parameters)
                .with_run_index(run_index);
            if let Some(manager) = processed_data {
                ctx = ctx.with_processed_data(manager);
            }
            if let Some(provider) = credentials {
                ctx = ctx.with_credentials(provider);
            }
            registered.node_type.execute(&ctx).await
        }
        Err(error) => Err(error),
    };

    match (result, node.error_policy()) {
        (Ok(output), _) => Ok(output),
        (Err(error), ErrorPolicy::ContinueOnFail) => {
            warn!(error = %error, "node failed, continuing with an error item");
            Ok(vec![vec![node_failure_item(&error, inputs)]])
        }
        (Err(error), ErrorPolicy::StopOnError) => Err(error),
    }
}

/// The first input pin, unchanged, paired item by item.
fn passthrough(inputs: &[PinData]) -> Vec<Item> {
    inputs
        .first()
        .map(|pin| {
            pin.items()
                .enumerate()
                .map(|(index, item)| Item::passthrough(item, index))
                .collect()
        })
        .unwrap_or_default()
}

/// A whole-invocation failure as one item, paired with every first-pin input.
fn node_failure_item(error: &NodeError, inputs: &[PinData]) -> Item {
    let mut json = JsonObject::new();
    json.insert("error".to_string(), JsonValue::String(error.message.clone()));
    if let Some(description) = &error.description {
        json.insert(
            "description".to_string(),
            JsonValue::String(description.clone()),
        );
    }
    let parents = (0..inputs.first().map_or(0, PinData::len))
        .map(PairedItem::new)
        .collect();
    Item::derive_from(json, parents)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node_type::{NodeDescription, NodeType, NodeTypeRegistry, ParameterKind, ParameterSpec};
    use crate::pin::{InputPin, OutputPin};
    use serde_json::json;

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    /// Doubles `n`; fails on odd numbers.
    struct DoubleEven;

    #[async_trait]
    impl ItemOperation for DoubleEven {
        async fn execute_item(
            &self,
            _ctx: &ExecutionContext<'_>,
            _index: usize,
            item: &Item,
        ) -> Result<Vec<Item>, NodeError> {
            let n = item.get("n").and_then(JsonValue::as_i64).unwrap_or(0);
            if n % 2 != 0 {
                return Err(NodeError::new(format!("{n} is odd")));
            }
            Ok(vec![Item::new(object(json!({ "n": n * 2 })))])
        }
    }

    #[async_trait]
    impl NodeType for DoubleEven {
        fn description(&self) -> NodeDescription {
            NodeDescription::new("test.double", "Double")
                .with_input(InputPin::required("main"))
                .with_output(OutputPin::new("main"))
                .with_parameter(ParameterSpec::optional("factor", ParameterKind::Number, json!(2)))
        }

        async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
            run_per_item(self, ctx).await
        }
    }

    fn inputs() -> Vec<PinData> {
        vec![PinData::from_items(vec![
            Item::new(object(json!({ "n": 2 }))),
            Item::new(object(json!({ "n": 3 }))),
            Item::new(object(json!({ "n": 4 }))),
        ])]
    }

    fn registered() -> RegisteredNodeType {
        let mut registry = NodeTypeRegistry::new();
        registry.register(DoubleEven);
        registry.get("test.double").cloned().unwrap()
    }

    #[tokio::test]
    async fn stop_on_error_reports_item_index() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Double", "test.double");
        let inputs = inputs();

        let err = invoke(&registered(), Invocation::new(&workflow, &node, &inputs))
            .await
            .unwrap_err();
        assert_eq!(err.item_index, Some(1));
        assert_eq!(err.message, "3 is odd");
    }

    #[tokio::test]
    async fn continue_on_fail_emits_error_items_in_place() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Double", "test.double").continue_on_fail();
        let inputs = inputs();

        let output = invoke(&registered(), Invocation::new(&workflow, &node, &inputs))
            .await
            .unwrap();
        let items = &output[0];
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].get("n"), Some(&json!(4)));
        assert_eq!(items[1].get("message"), Some(&json!("3 is odd")));
        assert_eq!(items[1].get("item"), Some(&json!({ "n": 3 })));
        assert_eq!(items[1].paired_item(), &[PairedItem::new(1)]);
        assert_eq!(items[2].get("n"), Some(&json!(8)));
        assert!(items.iter().all(Item::has_lineage));
    }

    #[tokio::test]
    async fn disabled_node_passes_input_through() {
        let workflow = Workflow::new("wf");
        let node = Node::new("Double", "test.double").disabled();
        let inputs = inputs();

        let output = invoke(&registered(), Invocation::new(&workflow, &node, &inputs))
            .await
            .unwrap();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0][1].get("n"), Some(&json!(3)));
        assert_eq!(output[0][1].paired_item(), &[PairedItem::new(1)]);
    }

    #[tokio::test]
    async fn invalid_parameters_follow_the_failure_policy() {
        let workflow = Workflow::new("wf");
        let inputs = inputs();

        let node = Node::new("Double", "test.double").with_parameter("factor", json!("two"));
        let err = invoke(&registered(), Invocation::new(&workflow, &node, &inputs))
            .await
            .unwrap_err();
        assert!(err.message.contains("factor"));

        let lenient = node.continue_on_fail();
        let output = invoke(&registered(), Invocation::new(&workflow, &lenient, &inputs))
            .await
            .unwrap();
        assert_eq!(output[0].len(), 1);
        assert_eq!(output[0][0].paired_item().len(), 3);
    }
}
