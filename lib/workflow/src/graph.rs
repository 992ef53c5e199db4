//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where:
//! - Nodes are workflow steps
//! - Edges connect an output pin of one node to an input pin of another
//!
//! Cycles are allowed; the walker bounds loops at run time.

use crate::edge::{Connection, ConnectionRef};
use crate::error::GraphError;
use crate::node::Node;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use weft_core::NodeId;

/// Edge weight: the pins joined plus the order the connection was added in.
///
/// petgraph reuses edge indices on removal, so indices alone do not keep
/// insertion order.
#[derive(Debug, Clone, Copy)]
struct Wire {
    order: u64,
    connection: Connection,
}

/// A workflow graph using petgraph's directed graph.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    graph: DiGraph<Node, Wire>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    node_index_map: HashMap<NodeId, NodeIndex>,
    next_order: u64,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
            next_order: 0,
        }
    }

    /// Adds a node to the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if a node with the same ID already exists.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        let node_id = node.id;
        if self.node_index_map.contains_key(&node_id) {
            return Err(GraphError::DuplicateNode { node_id });
        }
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        Ok(node_id)
    }

    /// Removes a node and every connection touching it.
    pub fn remove_node(&mut self, node_id: NodeId) -> Option<Node> {
        let index = self.node_index_map.remove(&node_id)?;
        let node = self.graph.remove_node(index);
        // petgraph moves the last node into the freed slot.
        self.rebuild_index_map();
        node
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight(*index)
    }

    /// Connects two nodes.
    ///
    /// Pin indices are checked against node types by the walker, which has
    /// access to the registry.
    ///
    /// # Errors
    ///
    /// Returns an error if either node doesn't exist.
    pub fn add_connection(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        connection: Connection,
    ) -> Result<(), GraphError> {
        let source_index = self.index_of(source_id)?;
        let target_index = self.index_of(target_id)?;
        let order = self.next_order;
        self.next_order += 1;
        self.graph
            .add_edge(source_index, target_index, Wire { order, connection });
        Ok(())
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns every connection, in insertion order.
    #[must_use]
    pub fn connections(&self) -> Vec<ConnectionRef> {
        let mut wires: Vec<_> = self
            .graph
            .edge_references()
            .filter_map(|edge| {
                let source = self.graph.node_weight(edge.source())?;
                let target = self.graph.node_weight(edge.target())?;
                let wire = edge.weight();
                Some((
                    wire.order,
                    ConnectionRef::new(source.id, target.id, wire.connection),
                ))
            })
            .collect();
        wires.sort_by_key(|(order, _)| *order);
        wires.into_iter().map(|(_, reference)| reference).collect()
    }

    /// Returns nodes that have no outgoing connections (terminal nodes).
    pub fn terminal_nodes(&self) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter(|&idx| {
                self.graph
                    .edges_directed(idx, Direction::Outgoing)
                    .next()
                    .is_none()
            })
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Returns the targets wired to one output pin, in insertion order.
    #[must_use]
    pub fn outgoing(&self, node_id: NodeId, output_index: usize) -> Vec<(NodeId, Connection)> {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return Vec::new();
        };

        let mut wires: Vec<_> = self
            .graph
            .edges_directed(index, Direction::Outgoing)
            .filter(|edge| edge.weight().connection.source_output == output_index)
            .filter_map(|edge| {
                let target = self.graph.node_weight(edge.target())?;
                Some((edge.weight().order, target.id, edge.weight().connection))
            })
            .collect();
        wires.sort_by_key(|(order, _, _)| *order);
        wires
            .into_iter()
            .map(|(_, target, connection)| (target, connection))
            .collect()
    }

    /// True when a directed path leads from `from` to `to`.
    ///
    /// A node always reaches itself.
    #[must_use]
    pub fn can_reach(&self, from: NodeId, to: NodeId) -> bool {
        let (Some(&from), Some(&to)) = (self.node_index_map.get(&from), self.node_index_map.get(&to))
        else {
            return false;
        };
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    /// Rebuilds the node index map from the underlying graph.
    fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id, index);
            }
        }
    }

    fn index_of(&self, node_id: NodeId) -> Result<NodeIndex, GraphError> {
        self.node_index_map
            .get(&node_id)
            .copied()
            .ok_or(GraphError::NodeNotFound { node_id })
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialized as `{ "nodes": [...], "connections": [...] }`.
impl Serialize for WorkflowGraph {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;

        let nodes: Vec<&Node> = self.graph.node_weights().collect();
        let connections = self.connections();

        let mut state = serializer.serialize_struct("WorkflowGraph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("connections", &connections)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for WorkflowGraph {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{Error, MapAccess, Visitor};

        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = WorkflowGraph;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a workflow graph with nodes and connections")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut connections: Option<Vec<ConnectionRef>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "connections" => connections = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let mut graph = WorkflowGraph::new();
                for node in nodes.unwrap_or_default() {
                    graph.add_node(node).map_err(M::Error::custom)?;
                }
                for reference in connections.unwrap_or_default() {
                    graph
                        .add_connection(
                            reference.source_node,
                            reference.target_node,
                            reference.connection,
                        )
                        .map_err(M::Error::custom)?;
                }
                Ok(graph)
            }
        }

        deserializer.deserialize_struct("WorkflowGraph", &["nodes", "connections"], GraphVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> Node {
        Node::new(name, "weft.noOp")
    }

    fn chain(names: &[&str]) -> (WorkflowGraph, Vec<NodeId>) {
        let mut graph = WorkflowGraph::new();
        let ids: Vec<NodeId> = names
            .iter()
            .map(|name| graph.add_node(node(name)).unwrap())
            .collect();
        for pair in ids.windows(2) {
            graph
                .add_connection(pair[0], pair[1], Connection::main())
                .unwrap();
        }
        (graph, ids)
    }

    #[test]
    fn add_and_get_node() {
        let mut graph = WorkflowGraph::new();
        let node_id = graph.add_node(node("Test")).unwrap();

        let retrieved = graph.get_node(node_id);
        assert_eq!(retrieved.map(|n| n.name.as_str()), Some("Test"));
    }

    #[test]
    fn add_node_rejects_duplicate_id() {
        let mut graph = WorkflowGraph::new();
        let first = node("A");
        let copy = first.clone();
        graph.add_node(first).unwrap();
        assert!(matches!(
            graph.add_node(copy),
            Err(GraphError::DuplicateNode { .. })
        ));
    }

    #[test]
    fn add_connection_rejects_missing_node() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_node(node("A")).unwrap();
        let result = graph.add_connection(a, NodeId::new(), Connection::main());
        assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn remove_node_keeps_index_consistent() {
        let (mut graph, ids) = chain(&["A", "B", "C"]);
        graph.remove_node(ids[0]);
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.get_node(ids[2]).map(|n| n.name.as_str()), Some("C"));
        assert_eq!(graph.connections().len(), 1);
    }

    #[test]
    fn terminal_nodes_have_no_outgoing_connections() {
        let (graph, _) = chain(&["Trigger", "Middle", "End"]);
        let terminals = graph.terminal_nodes();
        assert_eq!(terminals.len(), 1);
        assert_eq!(terminals[0].name, "End");
    }

    #[test]
    fn outgoing_filters_by_output_pin_in_insertion_order() {
        let mut graph = WorkflowGraph::new();
        let source = graph.add_node(node("If")).unwrap();
        let yes = graph.add_node(node("Yes")).unwrap();
        let no = graph.add_node(node("No")).unwrap();
        let also_yes = graph.add_node(node("AlsoYes")).unwrap();
        graph.add_connection(source, yes, Connection::new(0, 0)).unwrap();
        graph.add_connection(source, no, Connection::new(1, 0)).unwrap();
        graph
            .add_connection(source, also_yes, Connection::new(0, 0))
            .unwrap();

        let targets: Vec<NodeId> = graph.outgoing(source, 0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(targets, vec![yes, also_yes]);
        assert_eq!(graph.outgoing(source, 1).len(), 1);
        assert!(graph.outgoing(source, 2).is_empty());
    }

    #[test]
    fn fan_out_order_survives_node_removal() {
        let mut graph = WorkflowGraph::new();
        let source = graph.add_node(node("Source")).unwrap();
        let first = graph.add_node(node("First")).unwrap();
        let gone = graph.add_node(node("Gone")).unwrap();
        let second = graph.add_node(node("Second")).unwrap();
        let third = graph.add_node(node("Third")).unwrap();
        for target in [first, gone, second, third] {
            graph.add_connection(source, target, Connection::main()).unwrap();
        }

        // Removing an edge moves the last edge into its slot.
        graph.remove_node(gone);

        let targets: Vec<NodeId> = graph.outgoing(source, 0).into_iter().map(|(id, _)| id).collect();
        assert_eq!(targets, vec![first, second, third]);
        let serialized: Vec<NodeId> = graph.connections().iter().map(|c| c.target_node).collect();
        assert_eq!(serialized, vec![first, second, third]);
    }

    #[test]
    fn can_reach_follows_direction() {
        let (graph, ids) = chain(&["A", "B", "C"]);
        assert!(graph.can_reach(ids[0], ids[2]));
        assert!(!graph.can_reach(ids[2], ids[0]));
    }

    #[test]
    fn loops_are_allowed() {
        let (mut graph, ids) = chain(&["A", "B"]);
        graph.add_connection(ids[1], ids[0], Connection::main()).unwrap();
        assert!(graph.can_reach(ids[0], ids[1]));
        assert!(graph.can_reach(ids[1], ids[0]));
    }

    #[test]
    fn graph_serde_roundtrip_rebuilds_index() {
        let (graph, ids) = chain(&["Trigger", "Set"]);

        let json = serde_json::to_value(&graph).expect("serialize");
        assert_eq!(json["connections"].as_array().map(Vec::len), Some(1));

        let parsed: WorkflowGraph = serde_json::from_value(json).expect("deserialize");
        assert_eq!(parsed.node_count(), 2);
        assert_eq!(parsed.connections().len(), 1);
        assert!(parsed.get_node(ids[0]).is_some());
        assert_eq!(parsed.outgoing(ids[0], 0), vec![(ids[1], Connection::main())]);
    }

    #[test]
    fn deserialize_rejects_dangling_connection() {
        let a = node("A");
        let source = a.id;
        let value = serde_json::json!({
            "nodes": [a],
            "connections": [{ "sourceNode": source, "targetNode": NodeId::new() }],
        });
        let result: Result<WorkflowGraph, _> = serde_json::from_value(value);
        assert!(result.unwrap_err().to_string().contains("node not found"));
    }
}
