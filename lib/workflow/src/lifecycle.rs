//! Workflow lifecycle hooks.
//!
//! Components that keep per-workflow state register a hook so the workflow
//! manager can tell them when a workflow changes or disappears.

use crate::definition::Workflow;
use crate::error::HookError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use weft_core::WorkflowId;

/// Reacts to workflow updates and deletions.
#[async_trait]
pub trait WorkflowLifecycleHook: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Called after a workflow definition was saved.
    async fn after_workflow_update(
        &self,
        workflow: &Workflow,
    ) -> weft_core::Result<(), HookError>;

    /// Called after a workflow was deleted.
    async fn after_workflow_delete(
        &self,
        workflow_id: WorkflowId,
    ) -> weft_core::Result<(), HookError>;
}

/// Registered lifecycle hooks, run in registration order.
#[derive(Clone, Default)]
pub struct LifecycleHooks {
    hooks: Vec<Arc<dyn WorkflowLifecycleHook>>,
}

impl LifecycleHooks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, hook: Arc<dyn WorkflowLifecycleHook>) {
        self.hooks.push(hook);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs every update hook, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first hook error.
    pub async fn after_update(&self, workflow: &Workflow) -> weft_core::Result<(), HookError> {
        for hook in &self.hooks {
            debug!(hook = hook.name(), workflow_id = %workflow.id, "running update hook");
            hook.after_workflow_update(workflow).await?;
        }
        Ok(())
    }

    /// Runs every delete hook, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first hook error.
    pub async fn after_delete(&self, workflow_id: WorkflowId) -> weft_core::Result<(), HookError> {
        for hook in &self.hooks {
            debug!(hook = hook.name(), %workflow_id, "running delete hook");
            hook.after_workflow_delete(workflow_id).await?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for LifecycleHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.hooks.iter().map(|hook| hook.name()))
            .finish()
    }
}
