//! No-op node.

use async_trait::async_trait;
use weft_workflow::{
    ExecutionContext, InputPin, Item, NodeDescription, NodeError, NodeOutput, NodeType, OutputPin,
};

pub const TYPE_NAME: &str = "weft.noOp";

/// Passes its input through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNode;

#[async_trait]
impl NodeType for NoOpNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(TYPE_NAME, "No Operation")
            .with_input(InputPin::required("main"))
            .with_output(OutputPin::new("main"))
    }

    async fn execute(&self, ctx: &ExecutionContext<'_>) -> Result<NodeOutput, NodeError> {
        let items = ctx
            .input(0)
            .items()
            .enumerate()
            .map(|(index, item)| Item::passthrough(item, index))
            .collect();
        Ok(vec![items])
    }
}
