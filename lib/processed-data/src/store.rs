//! The processed-data store.

use crate::context::{WORKFLOW_CONTEXT, derive_context, node_context};
use crate::hash::hash_value;
use crate::repository::{ContextFilter, ProcessedDataFilter, ProcessedDataRepository, ProcessedDataRow};
use crate::strategy::{Admission, BulkInsertReturning, InsertClassificationStrategy, PerRowInsert};
use async_trait::async_trait;
use rootcause::prelude::ResultExt;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use weft_core::WorkflowId;
use weft_workflow::{
    CheckProcessedOutput, ContextData, HookError, LifecycleHooks, ProcessedDataContext,
    ProcessedDataError, ProcessedDataManager, Workflow, WorkflowLifecycleHook,
};

/// Store settings, fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct ProcessedDataConfig {
    /// The backend supports one insert-or-ignore statement returning the
    /// inserted values. Otherwise every value is inserted on its own.
    #[serde(default)]
    pub bulk_insert_returning: bool,
}

/// Remembers processed values in a repository.
pub struct ProcessedDataStore {
    repository: Arc<dyn ProcessedDataRepository>,
    strategy: Arc<dyn InsertClassificationStrategy>,
    config: ProcessedDataConfig,
}

impl ProcessedDataStore {
    #[must_use]
    pub fn new(repository: Arc<dyn ProcessedDataRepository>, config: ProcessedDataConfig) -> Self {
        let strategy: Arc<dyn InsertClassificationStrategy> = if config.bulk_insert_returning {
            Arc::new(BulkInsertReturning)
        } else {
            Arc::new(PerRowInsert)
        };
        Self {
            repository,
            strategy,
            config,
        }
    }

    #[must_use]
    pub fn config(&self) -> ProcessedDataConfig {
        self.config
    }

    #[must_use]
    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Registers the store's cleanup hooks.
    pub fn register_lifecycle_hooks(self: &Arc<Self>, hooks: &mut LifecycleHooks) {
        hooks.register(Arc::clone(self) as Arc<dyn WorkflowLifecycleHook>);
    }

    fn scope(
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<(WorkflowId, String), ProcessedDataError> {
        let key = derive_context(context, context_data)?;
        let workflow_id = context_data
            .workflow_id
            .ok_or(ProcessedDataError::MissingWorkflowId)?;
        Ok((workflow_id, key))
    }
}

#[async_trait]
impl ProcessedDataManager for ProcessedDataStore {
    #[instrument(skip(self, items, context_data), fields(items = items.len(), ?context))]
    async fn check_processed(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<CheckProcessedOutput, ProcessedDataError> {
        let (workflow_id, key) = Self::scope(context, context_data)?;
        if items.is_empty() {
            return Ok(CheckProcessedOutput::default());
        }

        let hashes: Vec<String> = items.iter().map(|item| hash_value(item)).collect();
        let filter = ProcessedDataFilter::workflow(workflow_id)
            .with_context(ContextFilter::Equals(key))
            .with_values(hashes.clone());
        let found: HashSet<String> = self
            .repository
            .find(&filter)
            .await
            .context(ProcessedDataError::QueryFailed)?
            .into_iter()
            .map(|row| row.value)
            .collect();

        let mut output = CheckProcessedOutput::default();
        for (item, hash) in items.iter().zip(&hashes) {
            if found.contains(hash) {
                output.processed.push(item.clone());
            } else {
                output.new.push(item.clone());
            }
        }
        debug!(
            new = output.new.len(),
            processed = output.processed.len(),
            "checked processed data"
        );
        Ok(output)
    }

    #[instrument(
        skip(self, items, context_data),
        fields(items = items.len(), ?context, strategy = self.strategy.name())
    )]
    async fn check_processed_and_record(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<CheckProcessedOutput, ProcessedDataError> {
        let (workflow_id, key) = Self::scope(context, context_data)?;
        if items.is_empty() {
            return Ok(CheckProcessedOutput::default());
        }

        let rows: Vec<ProcessedDataRow> = items
            .iter()
            .map(|item| ProcessedDataRow {
                workflow_id,
                context: key.clone(),
                value: hash_value(item),
            })
            .collect();
        let admissions = self
            .strategy
            .record(self.repository.as_ref(), &rows)
            .await
            .context(ProcessedDataError::InsertFailed)?;

        let mut output = CheckProcessedOutput::default();
        for (item, admission) in items.iter().zip(admissions) {
            match admission {
                Admission::Inserted => output.new.push(item.clone()),
                Admission::AlreadyProcessed => output.processed.push(item.clone()),
            }
        }
        debug!(
            new = output.new.len(),
            processed = output.processed.len(),
            "recorded processed data"
        );
        Ok(output)
    }

    #[instrument(skip(self, items, context_data), fields(items = items.len(), ?context))]
    async fn remove_processed(
        &self,
        items: &[String],
        context: ProcessedDataContext,
        context_data: &ContextData,
    ) -> weft_core::Result<(), ProcessedDataError> {
        let (workflow_id, key) = Self::scope(context, context_data)?;
        if items.is_empty() {
            return Ok(());
        }

        let filter = ProcessedDataFilter::workflow(workflow_id)
            .with_context(ContextFilter::Equals(key))
            .with_values(items.iter().map(|item| hash_value(item)).collect());
        let removed = self
            .repository
            .delete(&filter)
            .await
            .context(ProcessedDataError::DeleteFailed)?;
        debug!(removed, "removed processed data");
        Ok(())
    }
}

#[async_trait]
impl WorkflowLifecycleHook for ProcessedDataStore {
    fn name(&self) -> &str {
        "processed-data"
    }

    /// Drops node-scoped values of nodes no longer in the workflow.
    #[instrument(skip(self, workflow), fields(workflow_id = %workflow.id))]
    async fn after_workflow_update(
        &self,
        workflow: &Workflow,
    ) -> weft_core::Result<(), HookError> {
        let mut contexts: Vec<String> = workflow
            .graph
            .nodes()
            .map(|node| node_context(node.id))
            .collect();
        contexts.push(WORKFLOW_CONTEXT.to_string());

        let filter = ProcessedDataFilter::workflow(workflow.id)
            .with_context(ContextFilter::NotIn(contexts));
        let removed = self
            .repository
            .delete(&filter)
            .await
            .context_with(|| HookError::new(self.name()))?;
        if removed > 0 {
            info!(removed, "removed processed data of deleted nodes");
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn after_workflow_delete(
        &self,
        workflow_id: WorkflowId,
    ) -> weft_core::Result<(), HookError> {
        let removed = self
            .repository
            .delete(&ProcessedDataFilter::workflow(workflow_id))
            .await
            .context_with(|| HookError::new(self.name()))?;
        info!(removed, "removed processed data of deleted workflow");
        Ok(())
    }
}
