//! Workflow engine for the weft runtime.
//!
//! This crate provides the execution and data-routing core:
//!
//! - **Item Model**: JSON items with lineage ("paired item") pointers
//! - **Graph Model**: petgraph-backed workflow graphs; loops are allowed
//! - **Node Contract**: the `NodeType` trait every node implementation fulfils
//! - **Invocation**: per-item failure policies (stop-on-error, continue-on-fail)
//! - **Routing**: lineage completion and distribution onto connections
//! - **Walker**: readiness-driven scheduling with an iteration ceiling
//! - **Processed Data**: the deduplication interface trigger nodes consult

pub mod context;
pub mod definition;
pub mod edge;
pub mod error;
pub mod execution;
pub mod expression;
pub mod graph;
pub mod invocation;
pub mod item;
pub mod lifecycle;
pub mod node;
pub mod node_type;
pub mod pin;
pub mod processed;
pub mod router;
pub mod walker;

pub use context::{CredentialsProvider, ExecutionContext};
pub use definition::{Workflow, WorkflowMetadata};
pub use edge::{Connection, ConnectionRef};
pub use error::{
    ExecutionError, ExpressionError, GraphError, HookError, NodeError, ProcessedDataError,
    RouterError,
};
pub use execution::{LineageStep, NodeRunRecord, RunData, RunState, WorkflowRun};
pub use graph::WorkflowGraph;
pub use invocation::{Invocation, ItemOperation, error_item, invoke, run_per_item};
pub use item::{BinaryData, Item, JsonObject, PairedItem};
pub use lifecycle::{LifecycleHooks, WorkflowLifecycleHook};
pub use node::{ErrorPolicy, Node, NodeSettings};
pub use node_type::{
    NodeDescription, NodeOutput, NodeType, NodeTypeRegistry, ParameterKind, ParameterSpec,
    RegisteredNodeType,
};
pub use pin::{InputPin, ItemOrigin, OutputPin, PinData, PinSegment, SourceRef};
pub use processed::{
    CheckProcessedOutput, ContextData, NodeRef, ProcessedDataContext, ProcessedDataManager,
};
pub use router::{Delivery, OutputRouter};
pub use walker::{GraphWalker, WalkerConfig};
