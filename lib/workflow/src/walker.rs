//! The graph walker.
//!
//! The walker drives one workflow run. It seeds the start nodes, then
//! repeatedly picks a runnable node, invokes it, and routes its output into
//! the input buffers of downstream nodes, until nothing is runnable.
//!
//! A node is runnable when every required input pin has buffered data and at
//! least one pin has data. Among runnable nodes the walker prefers one that no
//! other runnable node can reach, so fan-in pins collect every upstream array
//! before their node runs. Loops are bounded by a per-node run ceiling.

use crate::context::CredentialsProvider;
use crate::definition::Workflow;
use crate::error::{ExecutionError, GraphError};
use crate::execution::{NodeRunRecord, RunData, RunState, WorkflowRun};
use crate::invocation::{Invocation, invoke};
use crate::item::Item;
use crate::node_type::{NodeTypeRegistry, RegisteredNodeType};
use crate::pin::{PinData, SourceRef};
use crate::processed::ProcessedDataManager;
use crate::router::OutputRouter;
use chrono::Utc;
use serde::Deserialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use weft_core::NodeId;

/// Walker limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WalkerConfig {
    /// How often a single node may run within one execution.
    #[serde(default = "default_max_node_runs")]
    pub max_node_runs: u32,
}

fn default_max_node_runs() -> u32 {
    100
}

impl Default for WalkerConfig {
    fn default() -> Self {
        Self {
            max_node_runs: default_max_node_runs(),
        }
    }
}

/// Executes one run of a workflow.
pub struct GraphWalker {
    workflow: Arc<Workflow>,
    registry: Arc<NodeTypeRegistry>,
    config: WalkerConfig,
    processed_data: Option<Arc<dyn ProcessedDataManager>>,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    cancel: CancellationToken,
    run: WorkflowRun,
    run_data: RunData,
    start_nodes: VecDeque<NodeId>,
    trigger_items: HashMap<NodeId, Vec<Item>>,
    buffers: HashMap<NodeId, Vec<PinData>>,
    /// Nodes with buffered input, in the order they first received it.
    waiting: Vec<NodeId>,
    invocations: HashMap<NodeId, u32>,
    error: Option<ExecutionError>,
}

impl GraphWalker {
    /// Prepares a run.
    ///
    /// # Errors
    ///
    /// Returns an error if a node type is not registered or a connection
    /// uses a pin its node does not declare.
    pub fn new(
        workflow: Arc<Workflow>,
        registry: Arc<NodeTypeRegistry>,
    ) -> Result<Self, ExecutionError> {
        validate(&workflow, &registry)?;
        Ok(Self {
            run: WorkflowRun::new(workflow.id),
            workflow,
            registry,
            config: WalkerConfig::default(),
            processed_data: None,
            credentials: None,
            cancel: CancellationToken::new(),
            run_data: RunData::new(),
            start_nodes: VecDeque::new(),
            trigger_items: HashMap::new(),
            buffers: HashMap::new(),
            waiting: Vec::new(),
            invocations: HashMap::new(),
            error: None,
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: WalkerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_processed_data(mut self, manager: Arc<dyn ProcessedDataManager>) -> Self {
        self.processed_data = Some(manager);
        self
    }

    #[must_use]
    pub fn with_credentials(mut self, provider: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(provider);
        self
    }

    /// Uses an externally owned cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Uses `items` as the output of a start node instead of executing it.
    ///
    /// Once any trigger items are given, only nodes with trigger items start.
    ///
    /// # Errors
    ///
    /// Returns an error if the node is not part of the workflow.
    pub fn with_trigger_items(
        mut self,
        node_id: NodeId,
        items: Vec<Item>,
    ) -> Result<Self, ExecutionError> {
        if self.workflow.graph.get_node(node_id).is_none() {
            return Err(GraphError::NodeNotFound { node_id }.into());
        }
        self.trigger_items.insert(node_id, items);
        Ok(self)
    }

    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.run.state
    }

    #[must_use]
    pub fn run(&self) -> &WorkflowRun {
        &self.run
    }

    #[must_use]
    pub fn run_data(&self) -> &RunData {
        &self.run_data
    }

    #[must_use]
    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    /// The failure that ended the run, if it failed.
    #[must_use]
    pub fn error(&self) -> Option<&ExecutionError> {
        self.error.as_ref()
    }

    /// Buffers host-provided items on a node's input pin.
    ///
    /// Call [`execute`](Self::execute) afterwards to resume a waiting run.
    ///
    /// # Errors
    ///
    /// Returns an error if the run has ended, or the node or pin is unknown.
    pub fn deliver(
        &mut self,
        node_id: NodeId,
        input_index: usize,
        items: Vec<Item>,
    ) -> Result<(), ExecutionError> {
        if self.run.state.is_terminal() {
            return Err(ExecutionError::InvalidStateTransition {
                from: self.run.state,
                to: RunState::Running,
            });
        }
        let declared = self.registered(node_id)?.description.inputs.len();
        if input_index >= declared {
            return Err(GraphError::InputPinNotFound {
                node_id,
                index: input_index,
            }
            .into());
        }
        debug!(%node_id, input_index, items = items.len(), "items delivered");
        self.buffer(node_id, input_index, None, items.into());
        Ok(())
    }

    /// Runs until no node is runnable, the run fails, or it is cancelled.
    ///
    /// Returns `WaitingOnInputs` when data is buffered but no node can use it
    /// yet; deliver more items and call `execute` again to resume.
    ///
    /// # Errors
    ///
    /// Returns the failure that moved the run to `Failed`, or an invalid
    /// transition when called on an ended run.
    #[instrument(skip(self), fields(run_id = %self.run.id, workflow_id = %self.workflow.id))]
    pub async fn execute(&mut self) -> Result<RunState, ExecutionError> {
        match self.run.state {
            RunState::Pending => {
                self.run.transition(RunState::Running)?;
                self.seed();
                info!(start_nodes = self.start_nodes.len(), "run started");
            }
            RunState::WaitingOnInputs => {
                self.run.transition(RunState::Running)?;
                debug!("run resumed");
            }
            from => {
                return Err(ExecutionError::InvalidStateTransition {
                    from,
                    to: RunState::Running,
                });
            }
        }

        loop {
            if self.cancel.is_cancelled() {
                self.run.transition(RunState::Cancelled)?;
                info!(invocations = self.run_data.invocation_count(), "run cancelled");
                return Ok(RunState::Cancelled);
            }
            let Some(node_id) = self.next_node() else {
                break;
            };
            if let Err(error) = self.step(node_id).await {
                return Err(self.fail(error));
            }
        }

        let next = if self.has_buffered_input() {
            RunState::WaitingOnInputs
        } else {
            RunState::Completed
        };
        self.run.transition(next)?;
        info!(state = %next, invocations = self.run_data.invocation_count(), "run idle");
        Ok(next)
    }

    fn seed(&mut self) {
        let enabled = self.workflow.graph.nodes().filter(|node| !node.disabled);
        self.start_nodes = if self.trigger_items.is_empty() {
            enabled
                .filter(|node| {
                    self.registry
                        .get(&node.node_type)
                        .is_some_and(|registered| registered.description.is_trigger())
                })
                .map(|node| node.id)
                .collect()
        } else {
            enabled
                .filter(|node| self.trigger_items.contains_key(&node.id))
                .map(|node| node.id)
                .collect()
        };
    }

    fn next_node(&mut self) -> Option<NodeId> {
        if let Some(node_id) = self.start_nodes.pop_front() {
            return Some(node_id);
        }

        let runnable: Vec<NodeId> = self
            .waiting
            .iter()
            .copied()
            .filter(|node_id| self.is_runnable(*node_id))
            .collect();
        let graph = &self.workflow.graph;
        let choice = runnable
            .iter()
            .copied()
            .find(|candidate| {
                !runnable
                    .iter()
                    .any(|other| other != candidate && graph.can_reach(*other, *candidate))
            })
            .or_else(|| runnable.first().copied())?;

        self.waiting.retain(|node_id| *node_id != choice);
        Some(choice)
    }

    fn is_runnable(&self, node_id: NodeId) -> bool {
        let Some(pins) = self.buffers.get(&node_id) else {
            return false;
        };
        let Ok(registered) = self.registered(node_id) else {
            return false;
        };
        let any_data = pins.iter().any(|pin| !pin.is_empty());
        let required_filled = registered
            .description
            .inputs
            .iter()
            .enumerate()
            .all(|(index, pin)| !pin.required || pins.get(index).is_some_and(|data| !data.is_empty()));
        any_data && required_filled
    }

    async fn step(&mut self, node_id: NodeId) -> Result<(), ExecutionError> {
        let workflow = Arc::clone(&self.workflow);
        let registry = Arc::clone(&self.registry);
        let node = workflow
            .graph
            .get_node(node_id)
            .ok_or(GraphError::NodeNotFound { node_id })?;
        let registered = registry
            .get(&node.node_type)
            .ok_or_else(|| GraphError::UnknownNodeType {
                node_id,
                node_type: node.node_type.clone(),
            })?;

        let runs = self.invocations.entry(node_id).or_insert(0);
        *runs += 1;
        if *runs > self.config.max_node_runs {
            return Err(ExecutionError::LoopLimitExceeded {
                node_id,
                node_name: node.name.clone(),
                limit: self.config.max_node_runs,
            });
        }

        let inputs = self
            .buffers
            .remove(&node_id)
            .unwrap_or_else(|| empty_pins(registered.description.inputs.len()));
        let run_index = self.run_data.runs(node_id).len();
        let started_at = Utc::now();

        let result = match self.trigger_items.remove(&node_id) {
            Some(items) => Ok(vec![items]),
            None => {
                let invocation = Invocation {
                    workflow: &workflow,
                    node,
                    inputs: &inputs,
                    run_index,
                    processed_data: self.processed_data.as_deref(),
                    credentials: self.credentials.as_deref(),
                };
                invoke(registered, invocation).await
            }
        };
        let finished_at = Utc::now();

        let output = match result {
            Ok(output) => output,
            Err(error) => {
                let lineage = error
                    .item_index
                    .and_then(|index| inputs.first()?.origin(index))
                    .map(|origin| self.run_data.trace_lineage(origin.into()))
                    .unwrap_or_default();
                let failure = ExecutionError::NodeFailed {
                    node_id,
                    node_name: node.name.clone(),
                    item_index: error.item_index,
                    message: error.message.clone(),
                    lineage,
                };
                self.run_data.record(
                    node_id,
                    NodeRunRecord {
                        run_index,
                        inputs,
                        outputs: Vec::new(),
                        error: Some(error),
                        started_at,
                        finished_at,
                    },
                );
                return Err(failure);
            }
        };

        let outputs =
            OutputRouter::complete_lineage(registered.description.outputs.len(), &inputs, output)
                .map_err(|source| ExecutionError::Routing {
                    node_id,
                    node_name: node.name.clone(),
                    source,
                })?;
        let deliveries = OutputRouter::new(&workflow.graph).route(node_id, run_index, &outputs);
        debug!(
            node = %node.name,
            run_index,
            items = outputs.iter().map(|items| items.len()).sum::<usize>(),
            deliveries = deliveries.len(),
            "node finished"
        );

        self.run_data.record(
            node_id,
            NodeRunRecord {
                run_index,
                inputs,
                outputs,
                error: None,
                started_at,
                finished_at,
            },
        );
        for delivery in deliveries {
            self.buffer(
                delivery.target,
                delivery.input_index,
                Some(delivery.source),
                delivery.items,
            );
        }
        Ok(())
    }

    fn buffer(
        &mut self,
        node_id: NodeId,
        input_index: usize,
        source: Option<SourceRef>,
        items: Arc<[Item]>,
    ) {
        let declared = self
            .registered(node_id)
            .map_or(input_index + 1, |registered| registered.description.inputs.len());
        let pins = self
            .buffers
            .entry(node_id)
            .or_insert_with(|| empty_pins(declared));
        if pins.len() <= input_index {
            pins.resize_with(input_index + 1, PinData::new);
        }
        pins[input_index].push(source, items);
        if !self.waiting.contains(&node_id) {
            self.waiting.push(node_id);
        }
    }

    fn has_buffered_input(&self) -> bool {
        self.buffers
            .values()
            .any(|pins| pins.iter().any(|pin| !pin.is_empty()))
    }

    fn fail(&mut self, error: ExecutionError) -> ExecutionError {
        warn!(error = %error, "run failed");
        if let Err(transition) = self.run.transition(RunState::Failed) {
            warn!(error = %transition, "could not mark run as failed");
        }
        self.run.error = Some(error.to_string());
        self.error = Some(error.clone());
        error
    }

    fn registered(&self, node_id: NodeId) -> Result<&RegisteredNodeType, GraphError> {
        let node = self
            .workflow
            .graph
            .get_node(node_id)
            .ok_or(GraphError::NodeNotFound { node_id })?;
        self.registry
            .get(&node.node_type)
            .ok_or_else(|| GraphError::UnknownNodeType {
                node_id,
                node_type: node.node_type.clone(),
            })
    }
}

fn empty_pins(count: usize) -> Vec<PinData> {
    (0..count).map(|_| PinData::new()).collect()
}

/// Checks every node type is known and every connection uses declared pins.
fn validate(workflow: &Workflow, registry: &NodeTypeRegistry) -> Result<(), GraphError> {
    let graph = &workflow.graph;
    for node in graph.nodes() {
        if !registry.contains(&node.node_type) {
            return Err(GraphError::UnknownNodeType {
                node_id: node.id,
                node_type: node.node_type.clone(),
            });
        }
    }

    let description = |node_id: NodeId| {
        graph
            .get_node(node_id)
            .and_then(|node| registry.get(&node.node_type))
            .map(|registered| &registered.description)
            .ok_or(GraphError::NodeNotFound { node_id })
    };
    for reference in graph.connections() {
        let source = description(reference.source_node)?;
        if reference.connection.source_output >= source.outputs.len() {
            return Err(GraphError::OutputPinNotFound {
                node_id: reference.source_node,
                index: reference.connection.source_output,
            });
        }
        let target = description(reference.target_node)?;
        if reference.connection.target_input >= target.inputs.len() {
            return Err(GraphError::InputPinNotFound {
                node_id: reference.target_node,
                index: reference.connection.target_input,
            });
        }
    }
    Ok(())
}
