//! Built-in nodes for weft.
//!
//! - [`ManualTrigger`]: starts a run with configured items
//! - [`SetNode`]: writes values into items
//! - [`MergeNode`]: joins two inputs
//! - [`NoOpNode`]: passes items through
//! - [`RemoveDuplicatesNode`]: splits items into first sightings and repeats
//! - [`DatabaseNode`]: runs SQL through a host-provided [`QueryExecutor`]

pub mod database;
pub mod merge;
pub mod no_op;
pub mod remove_duplicates;
pub mod set;
pub mod trigger;

pub use database::{DatabaseNode, DatabaseOperation, QueryExecutor, Resource, SqlQuery};
pub use merge::MergeNode;
pub use no_op::NoOpNode;
pub use remove_duplicates::RemoveDuplicatesNode;
pub use set::SetNode;
pub use trigger::ManualTrigger;

use weft_workflow::NodeTypeRegistry;

/// A registry with every built-in node that needs no host services.
///
/// [`DatabaseNode`] needs a query executor and is registered by the host.
#[must_use]
pub fn builtin_registry() -> NodeTypeRegistry {
    let mut registry = NodeTypeRegistry::new();
    registry.register(ManualTrigger);
    registry.register(SetNode);
    registry.register(MergeNode);
    registry.register(NoOpNode);
    registry.register(RemoveDuplicatesNode);
    registry
}
