//! Manual trigger.

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use weft_workflow::{
    ExecutionContext, Item, NodeDescription, NodeError, NodeOutput, NodeType, OutputPin,
    ParameterKind, ParameterSpec,
};

pub const TYPE_NAME: &str = "weft.manualTrigger";

/// Emits the `items` parameter as root items. Defaults to one empty item.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualTrigger;

#[async_trait]
impl NodeType for ManualTrigger {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "Manual Trigger")
            .with_output(OutputPin::new("main"))
            .with_parameter(ParameterSpec::optional(
                "items",
                ParameterKind::List,
                json!([{}]),
            ))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        let items: Vec<JsonValue> = ctx.parameter_as("items")?;
        Ok(vec![items.into_iter().map(Item::from_value).collect()])
    }
}
