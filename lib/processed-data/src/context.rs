//! Storage keys for processed-data contexts.

use weft_core::NodeId;
use weft_workflow::{ContextData, ProcessedDataContext, ProcessedDataError};

/// Context key of workflow-scoped values.
pub const WORKFLOW_CONTEXT: &str = "";

/// Context key of values scoped to one node.
///
/// Keyed by node id so values survive a rename.
#[must_use]
pub fn node_context(node_id: NodeId) -> String {
    format!("n:{}", node_id.as_ulid())
}

/// Resolves the storage key for a context.
///
/// # Errors
///
/// Returns an error if node scope is requested without node information.
pub fn derive_context(
    context: ProcessedDataContext,
    context_data: &ContextData,
) -> Result<String, ProcessedDataError> {
    match context {
        ProcessedDataContext::Workflow => Ok(WORKFLOW_CONTEXT.to_string()),
        ProcessedDataContext::Node => context_data
            .node
            .as_ref()
            .map(|node| node_context(node.id))
            .ok_or(ProcessedDataError::MissingNodeContext),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_core::WorkflowId;
    use weft_workflow::Node;

    #[test]
    fn workflow_context_is_empty() {
        let data = ContextData::for_workflow(WorkflowId::new());
        assert_eq!(
            derive_context(ProcessedDataContext::Workflow, &data).unwrap(),
            ""
        );
    }

    #[test]
    fn node_context_uses_node_id() {
        let node = Node::new("Poll", "weft.removeDuplicates");
        let data = ContextData::for_node(WorkflowId::new(), &node);
        let key = derive_context(ProcessedDataContext::Node, &data).unwrap();
        assert_eq!(key, format!("n:{}", node.id.as_ulid()));

        let mut renamed = node.clone();
        renamed.name = "Renamed".to_string();
        let again = ContextData::for_node(WorkflowId::new(), &renamed);
        assert_eq!(derive_context(ProcessedDataContext::Node, &again).unwrap(), key);
    }

    #[test]
    fn node_context_requires_node() {
        let data = ContextData::for_workflow(WorkflowId::new());
        assert_eq!(
            derive_context(ProcessedDataContext::Node, &data),
            Err(ProcessedDataError::MissingNodeContext)
        );
    }
}
