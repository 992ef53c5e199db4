//! Remove Duplicates node.
//!
//! Derives a key per item and consults the processed-data store. Items whose
//! key was not seen before leave on output 0, repeats on output 1. Items are
//! passed through unchanged and paired with their input.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use tracing::debug;
use weft_workflow::{
    ExecutionContext, InputPin, Item, NodeDescription, NodeError, NodeOutput, NodeType, OutputPin,
    ParameterKind, ParameterSpec, ProcessedDataContext,
};

pub const TYPE_NAME: &str = "weft.removeDuplicates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
enum Operation {
    /// Record keys and split by whether they were recorded before.
    Record,
    /// Split by whether keys were recorded, without recording.
    Check,
    /// Forget keys; every item leaves on output 0.
    Forget,
}

/// Filters items already admitted by an earlier run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RemoveDuplicatesNode;

#[async_trait]
impl NodeType for RemoveDuplicatesNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "Remove Duplicates")
            .with_input(InputPin::required("main"))
            .with_output(OutputPin::new("new"))
            .with_output(OutputPin::new("processed"))
            .with_parameter(ParameterSpec::required("key", ParameterKind::Any))
            .with_parameter(ParameterSpec::optional(
                "operation",
                ParameterKind::Options(vec![
                    "record".to_string(),
                    "check".to_string(),
                    "forget".to_string(),
                ]),
                json!("record"),
            ))
            .with_parameter(ParameterSpec::optional(
                "scope",
                ParameterKind::Options(vec!["node".to_string(), "workflow".to_string()]),
                json!("node"),
            ))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        let operation: Operation = ctx.parameter_as("operation")?;
        let scope: String = ctx.parameter_as("scope")?;
        let context: ProcessedDataContext = scope.parse().unwrap_or_default();
        let manager = ctx.processed_data()?;
        let context_data = ctx.context_data();

        let input = ctx.input(0);
        let keys = (0..input.len())
            .map(|index| item_key(ctx, index))
            .collect::<Result<Vec<String>, NodeError>>()?;

        let passthrough = || {
            input
                .items()
                .enumerate()
                .map(|(index, item)| Item::passthrough(item, index))
        };

        let outcome = match operation {
            Operation::Forget => {
                manager
                    .remove_processed(&keys, context, &context_data)
                    .await
                    .map_err(|e| NodeError::new(e.to_string()))?;
                return Ok(vec![passthrough().collect(), Vec::new()]);
            }
            Operation::Check => manager.check_processed(&keys, context, &context_data).await,
            Operation::Record => {
                manager
                    .check_processed_and_record(&keys, context, &context_data)
                    .await
            }
        }
        .map_err(|e| NodeError::new(e.to_string()))?;

        let mut remaining: HashMap<&str, usize> = HashMap::new();
        for key in &outcome.new {
            *remaining.entry(key.as_str()).or_insert(0) += 1;
        }

        let mut new = Vec::new();
        let mut processed = Vec::new();
        for (item, key) in passthrough().zip(&keys) {
            match remaining.get_mut(key.as_str()) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    new.push(item);
                }
                _ => processed.push(item),
            }
        }
        debug!(new = new.len(), processed = processed.len(), "deduplicated items");
        Ok(vec![new, processed])
    }
}

/// The item's key as text; strings are used verbatim, other values as JSON.
fn item_key(ctx: &ExecutionContext<'_>, index: usize) -> Result<String, NodeError> {
    match ctx.item_parameter("key", index)? {
        JsonValue::Null => Err(NodeError::new("the key resolved to nothing").at_item(index)),
        JsonValue::String(key) => Ok(key),
        other => Ok(other.to_string()),
    }
}
