//! Host process for weft workflows.
//!
//! Loads a workflow file, opens the processed-data backend named by the
//! configuration, and runs the workflow to completion with the built-in
//! nodes.

pub mod config;
pub mod error;

pub use config::RunnerConfig;
pub use error::RunnerError;

use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use weft_core::{WorkflowId, WorkflowRunId};
use weft_nodes::builtin_registry;
use weft_processed_data::{
    InMemoryRepository, PostgresRepository, ProcessedDataRepository, ProcessedDataStore,
    SqliteRepository,
};
use weft_workflow::{GraphWalker, Item, LifecycleHooks, RunState, Workflow};

/// Outcome of one run, printed by the runner.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Last outputs of nodes without outgoing connections, by node name.
    pub outputs: BTreeMap<String, Vec<Vec<Item>>>,
}

/// Opens the processed-data backend for a database URL.
///
/// # Errors
///
/// Returns an error for unknown schemes or if the backend cannot be opened.
pub async fn connect_repository(
    url: &str,
) -> Result<Arc<dyn ProcessedDataRepository>, RunnerError> {
    if url == config::MEMORY_DATABASE_URL {
        return Ok(Arc::new(InMemoryRepository::new()));
    }
    if url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteRepository::connect(url).await?));
    }
    if url.starts_with("postgres:") || url.starts_with("postgresql:") {
        return Ok(Arc::new(PostgresRepository::connect(url).await?));
    }
    Err(RunnerError::UnsupportedDatabase {
        url: url.to_string(),
    })
}

/// Reads a workflow definition.
///
/// # Errors
///
/// Returns an error if the file is unreadable or not a workflow.
pub fn load_workflow(path: &Path) -> Result<Workflow, RunnerError> {
    serde_json::from_str(&read(path)?).map_err(|e| RunnerError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Reads a JSON array of input items.
///
/// # Errors
///
/// Returns an error if the file is unreadable or not an array.
pub fn load_items(path: &Path) -> Result<Vec<Item>, RunnerError> {
    let values: Vec<JsonValue> =
        serde_json::from_str(&read(path)?).map_err(|e| RunnerError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    Ok(values.into_iter().map(Item::from_value).collect())
}

fn read(path: &Path) -> Result<String, RunnerError> {
    std::fs::read_to_string(path).map_err(|e| RunnerError::Read {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Runs the configured workflow once.
///
/// A run that fails inside the graph is reported through
/// [`RunReport::state`]; errors are returned only when the run cannot start.
///
/// # Errors
///
/// Returns an error if loading, connecting or a lifecycle hook fails.
#[instrument(skip_all, fields(workflow_path = %config.workflow_path.display()))]
pub async fn run_workflow(
    config: &RunnerConfig,
    cancel: CancellationToken,
) -> Result<RunReport, RunnerError> {
    let workflow = load_workflow(&config.workflow_path)?;
    let input = config.input_path.as_deref().map(load_items).transpose()?;
    info!(workflow_id = %workflow.id, name = workflow.name(), "loaded workflow");

    let repository = connect_repository(&config.database_url).await?;
    let store = Arc::new(ProcessedDataStore::new(repository, config.processed_data()));
    info!(strategy = store.strategy_name(), "processed-data store ready");

    let mut hooks = LifecycleHooks::new();
    store.register_lifecycle_hooks(&mut hooks);
    hooks.after_update(&workflow).await?;

    let start_node = match &config.start_node {
        Some(name) => Some(
            workflow
                .graph
                .nodes()
                .find(|node| &node.name == name)
                .map(|node| node.id)
                .ok_or_else(|| RunnerError::StartNodeNotFound { name: name.clone() })?,
        ),
        None => None,
    };

    let mut walker = GraphWalker::new(Arc::new(workflow), Arc::new(builtin_registry()))?
        .with_config(config.walker.clone())
        .with_processed_data(store)
        .with_cancellation(cancel);
    match (start_node, input) {
        (Some(node_id), items) => {
            walker = walker.with_trigger_items(node_id, items.unwrap_or_default())?;
        }
        (None, Some(_)) => return Err(RunnerError::MissingStartNode),
        (None, None) => {}
    }

    let state = match walker.execute().await {
        Ok(state) => state,
        Err(error) => {
            warn!(error = %error, "run did not complete");
            walker.state()
        }
    };
    info!(%state, invocations = walker.run_data().invocation_count(), "run finished");
    Ok(report(&walker, state))
}

fn report(walker: &GraphWalker, state: RunState) -> RunReport {
    let workflow = walker.workflow();
    let outputs = workflow
        .graph
        .terminal_nodes()
        .into_iter()
        .filter_map(|node| {
            let record = walker.run_data().last_run(node.id)?;
            let pins = record.outputs.iter().map(|items| items.to_vec()).collect();
            Some((node.name.clone(), pins))
        })
        .collect();
    RunReport {
        run_id: walker.run().id,
        workflow_id: workflow.id,
        state,
        error: walker.run().error.clone(),
        outputs,
    }
}
