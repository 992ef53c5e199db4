//! Merge node.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use weft_workflow::{
    ExecutionContext, InputPin, Item, NodeDescription, NodeError, NodeOutput, NodeType, OutputPin,
    PairedItem, ParameterKind, ParameterSpec,
};

pub const TYPE_NAME: &str = "weft.merge";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum MergeMode {
    /// Items of input 1, then items of input 2.
    Append,
    /// Item `i` of both inputs merged into one; input 2 wins on conflicts.
    CombineByPosition,
}

/// Joins two inputs. Both pins are optional, so it also runs on one input.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeNode;

#[async_trait]
impl NodeType for MergeNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "Merge")
            .with_input(InputPin::optional("input1"))
            .with_input(InputPin::optional("input2"))
            .with_output(OutputPin::new("main"))
            .with_parameter(ParameterSpec::optional(
                "mode",
                ParameterKind::Options(vec![
                    "append".to_string(),
                    "combineByPosition".to_string(),
                ]),
                json!("append"),
            ))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        let mode: MergeMode = ctx.parameter_as("mode")?;
        let items: Vec<Item> = match mode {
            MergeMode::Append => (0..2)
                .flat_map(|pin| {
                    ctx.input(pin).items().enumerate().map(move |(index, item)| {
                        Item::derive_from(
                            item.json().clone(),
                            vec![PairedItem::from_input(pin, index)],
                        )
                    })
                })
                .collect(),
            MergeMode::CombineByPosition => ctx
                .input(0)
                .items()
                .zip(ctx.input(1).items())
                .enumerate()
                .map(|(index, (left, right))| {
                    let mut json = left.json().clone();
                    json.extend(right.json().clone());
                    Item::derive_from(
                        json,
                        vec![PairedItem::from_input(0, index), PairedItem::from_input(1, index)],
                    )
                })
                .collect(),
        };
        Ok(vec![items])
    }
}
