//! Run state and run data.
//!
//! The walker records every node invocation (inputs with their origins,
//! outputs, error) in `RunData`. That record is what lineage traces walk.

use crate::error::{ExecutionError, NodeError};
use crate::item::Item;
use crate::pin::{ItemOrigin, PinData};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use weft_core::{NodeId, WorkflowId, WorkflowRunId};

/// The overall state of a workflow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// Created, not yet started.
    Pending,
    /// Nodes are being executed.
    Running,
    /// Idle with partially filled input buffers; the host may deliver more items.
    WaitingOnInputs,
    /// Idle with nothing left to run.
    Completed,
    /// A node failed or a limit was exceeded.
    Failed,
    /// Stopped through the cancellation token.
    Cancelled,
}

impl RunState {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    #[must_use]
    pub fn can_transition_to(&self, next: RunState) -> bool {
        use RunState::*;
        matches!(
            (*self, next),
            (Pending, Running)
                | (Pending, Cancelled)
                | (Running, WaitingOnInputs)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (WaitingOnInputs, Running)
                | (WaitingOnInputs, Cancelled)
        )
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::WaitingOnInputs => "waiting_on_inputs",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A record of a single workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRun {
    pub id: WorkflowRunId,
    pub workflow_id: WorkflowId,
    pub state: RunState,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Error message if failed.
    pub error: Option<String>,
}

impl WorkflowRun {
    /// Creates a new run in pending state.
    #[must_use]
    pub fn new(workflow_id: WorkflowId) -> Self {
        Self {
            id: WorkflowRunId::new(),
            workflow_id,
            state: RunState::Pending,
            started_at: None,
            finished_at: None,
            error: None,
        }
    }

    /// Moves the run to `next`, stamping start and finish times.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is not allowed from the current state.
    pub fn transition(&mut self, next: RunState) -> Result<(), ExecutionError> {
        if !self.state.can_transition_to(next) {
            return Err(ExecutionError::InvalidStateTransition {
                from: self.state,
                to: next,
            });
        }
        if next == RunState::Running && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        self.state = next;
        Ok(())
    }

    /// Returns the duration of the run, if it has started.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        let start = self.started_at?;
        let end = self.finished_at.unwrap_or_else(Utc::now);
        Some(end - start)
    }
}

/// One invocation of one node.
#[derive(Debug, Clone)]
pub struct NodeRunRecord {
    pub run_index: usize,
    /// Input pins as consumed by the invocation.
    pub inputs: Vec<PinData>,
    /// Output arrays after lineage completion, one per output pin.
    pub outputs: Vec<Arc<[Item]>>,
    pub error: Option<NodeError>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// One hop in a lineage chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageStep {
    pub node_id: NodeId,
    pub run_index: usize,
    pub output_index: usize,
    pub item_index: usize,
}

impl From<ItemOrigin> for LineageStep {
    fn from(origin: ItemOrigin) -> Self {
        Self {
            node_id: origin.node_id,
            run_index: origin.run_index,
            output_index: origin.output_index,
            item_index: origin.item_index,
        }
    }
}

/// Every node invocation of a run, by node.
#[derive(Debug, Clone, Default)]
pub struct RunData {
    runs: HashMap<NodeId, Vec<NodeRunRecord>>,
}

impl RunData {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, node_id: NodeId, record: NodeRunRecord) {
        self.runs.entry(node_id).or_default().push(record);
    }

    /// All invocations of a node, oldest first.
    #[must_use]
    pub fn runs(&self, node_id: NodeId) -> &[NodeRunRecord] {
        self.runs.get(&node_id).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn last_run(&self, node_id: NodeId) -> Option<&NodeRunRecord> {
        self.runs(node_id).last()
    }

    /// Items the latest invocation of a node emitted on an output pin.
    #[must_use]
    pub fn output(&self, node_id: NodeId, output_index: usize) -> Option<&[Item]> {
        self.last_run(node_id)?
            .outputs
            .get(output_index)
            .map(|items| &items[..])
    }

    /// Number of invocations across all nodes.
    #[must_use]
    pub fn invocation_count(&self) -> usize {
        self.runs.values().map(Vec::len).sum()
    }

    /// Follows lineage from an output item back to its root item.
    ///
    /// The chain starts with the given item and ends at an item without
    /// lineage, or at an item the host delivered. Where an item has several
    /// parents, the first one is followed.
    #[must_use]
    pub fn trace_lineage(&self, start: LineageStep) -> Vec<LineageStep> {
        let mut chain = Vec::new();
        let mut current = Some(start);
        // Each hop moves to an earlier invocation, so the chain is bounded.
        let max_hops = self.invocation_count() + 1;

        while let Some(step) = current.take() {
            chain.push(step);
            if chain.len() > max_hops {
                break;
            }
            current = self.parent_of(step);
        }
        chain
    }

    fn parent_of(&self, step: LineageStep) -> Option<LineageStep> {
        let record = self.runs(step.node_id).get(step.run_index)?;
        let item = record.outputs.get(step.output_index)?.get(step.item_index)?;
        let paired = item.paired_item().first()?;
        let origin = record.inputs.get(paired.input)?.origin(paired.item)?;
        Some(origin.into())
    }
}
