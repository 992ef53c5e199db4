//! Set node.
//!
//! Writes a list of `{ name, value }` assignments into each item. Values may
//! hold expressions resolved against the item; names may be dot paths.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use weft_workflow::{
    ExecutionContext, InputPin, Item, ItemOperation, JsonObject, NodeDescription, NodeError,
    NodeOutput, NodeType, OutputPin, ParameterKind, ParameterSpec, run_per_item,
};

pub const TYPE_NAME: &str = "weft.set";

#[derive(Debug, Clone, Deserialize)]
struct Assignment {
    name: String,
    #[serde(default)]
    value: JsonValue,
}

/// Sets values on every input item.
#[derive(Debug, Clone, Copy, Default)]
pub struct SetNode;

#[async_trait]
impl NodeType for SetNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "Set")
            .with_input(InputPin::required("main"))
            .with_output(OutputPin::new("main"))
            .with_parameter(ParameterSpec::optional("values", ParameterKind::List, json!([])))
            .with_parameter(ParameterSpec::optional(
                "keepOnlySet",
                ParameterKind::Boolean,
                json!(false),
            ))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        run_per_item(self, ctx).await
    }
}

#[async_trait]
impl ItemOperation for SetNode {
    async fn execute_item(
        &self,
        ctx: &ExecutionContext<'_>,
        index: usize,
        item: &Item,
    ) -> Result<Vec<Item>, NodeError> {
        let assignments: Vec<Assignment> = ctx.item_parameter_as("values", index)?;
        let keep_only_set: bool = ctx.item_parameter_as("keepOnlySet", index)?;

        let mut json = if keep_only_set {
            JsonObject::new()
        } else {
            item.json().clone()
        };
        for assignment in assignments {
            if assignment.name.is_empty() {
                return Err(NodeError::new("assignment name must not be empty"));
            }
            set_path(&mut json, &assignment.name, assignment.value);
        }

        let mut output = Item::derive(json, index);
        if !keep_only_set {
            for (name, data) in item.binary() {
                output = output.with_binary(name.clone(), data.clone());
            }
        }
        Ok(vec![output])
    }
}

/// Sets `a.b.c` style paths, replacing non-object intermediates.
fn set_path(target: &mut JsonObject, path: &str, value: JsonValue) {
    let Some((head, rest)) = path.split_once('.') else {
        target.insert(path.to_string(), value);
        return;
    };
    let child = target
        .entry(head.to_string())
        .or_insert_with(|| JsonValue::Object(JsonObject::new()));
    if !child.is_object() {
        *child = JsonValue::Object(JsonObject::new());
    }
    if let JsonValue::Object(map) = child {
        set_path(map, rest, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_workflow::{Invocation, Node, NodeTypeRegistry, PairedItem, PinData, Workflow, invoke};

    fn object(value: JsonValue) -> JsonObject {
        match value {
            JsonValue::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    async fn run(node: &Node, items: Vec<Item>) -> Result<NodeOutput, NodeError> {
        let mut registry = NodeTypeRegistry::new();
        registry.register(SetNode);
        let workflow = Workflow::new("wf");
        let inputs = vec![PinData::from_items(items)];
        invoke(
            registry.get(TYPE_NAME).unwrap(),
            Invocation::new(&workflow, node, &inputs),
        )
        .await
    }

    #[test]
    fn set_path_creates_nested_objects() {
        let mut json = object(json!({ "a": 1 }));
        set_path(&mut json, "a.b", json!(2));
        set_path(&mut json, "c", json!("x"));
        assert_eq!(JsonValue::Object(json), json!({ "a": { "b": 2 }, "c": "x" }));
    }

    #[tokio::test]
    async fn resolves_values_per_item() {
        let node = Node::new("Set", TYPE_NAME).with_parameter(
            "values",
            json!([{ "name": "double", "value": "{{ $json.n }}" }, { "name": "tag", "value": "fixed" }]),
        );
        let output = run(
            &node,
            vec![
                Item::new(object(json!({ "n": 1 }))),
                Item::new(object(json!({ "n": 2 }))),
            ],
        )
        .await
        .unwrap();

        let items = &output[0];
        assert_eq!(items[1].get("double"), Some(&json!(2)));
        assert_eq!(items[1].get("n"), Some(&json!(2)));
        assert_eq!(items[0].get("tag"), Some(&json!("fixed")));
        assert_eq!(items[1].paired_item(), &[PairedItem::new(1)]);
    }

    #[tokio::test]
    async fn keep_only_set_drops_other_fields() {
        let node = Node::new("Set", TYPE_NAME)
            .with_parameter("values", json!([{ "name": "id", "value": "{{ $json.id }}" }]))
            .with_parameter("keepOnlySet", json!(true));
        let output = run(&node, vec![Item::new(object(json!({ "id": 7, "noise": true })))])
            .await
            .unwrap();
        assert_eq!(
            JsonValue::Object(output[0][0].json().clone()),
            json!({ "id": 7 })
        );
    }

    #[tokio::test]
    async fn empty_name_fails_the_item() {
        let node = Node::new("Set", TYPE_NAME).with_parameter("values", json!([{ "name": "" }]));
        let err = run(&node, vec![Item::default()]).await.unwrap_err();
        assert_eq!(err.item_index, Some(0));
    }
}
