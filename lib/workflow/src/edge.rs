//! Connections between node pins.
//!
//! A connection carries items from an output pin of one node to an input pin
//! of another. Pins are addressed by index.

use serde::{Deserialize, Serialize};
use weft_core::NodeId;

/// The pin pair joined by a graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// Output pin index on the source node.
    #[serde(default)]
    pub source_output: usize,
    /// Input pin index on the target node.
    #[serde(default)]
    pub target_input: usize,
}

impl Connection {
    #[must_use]
    pub const fn new(source_output: usize, target_input: usize) -> Self {
        Self {
            source_output,
            target_input,
        }
    }

    /// Output 0 to input 0.
    #[must_use]
    pub const fn main() -> Self {
        Self::new(0, 0)
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::main()
    }
}

/// A connection together with the nodes it joins.
///
/// This is the serialized form used in workflow files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRef {
    pub source_node: NodeId,
    pub target_node: NodeId,
    #[serde(flatten)]
    pub connection: Connection,
}

impl ConnectionRef {
    #[must_use]
    pub const fn new(source_node: NodeId, target_node: NodeId, connection: Connection) -> Self {
        Self {
            source_node,
            target_node,
            connection,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn connection_ref_flattens_pins() {
        let source = NodeId::new();
        let target = NodeId::new();
        let reference = ConnectionRef::new(source, target, Connection::new(1, 0));
        let value = serde_json::to_value(reference).unwrap();
        assert_eq!(value["sourceOutput"], json!(1));
        assert_eq!(value["targetInput"], json!(0));
        assert_eq!(value["sourceNode"], json!(source.as_ulid().to_string()));
    }

    #[test]
    fn pins_default_to_main() {
        let source = NodeId::new();
        let target = NodeId::new();
        let value = json!({ "sourceNode": source, "targetNode": target });
        let reference: ConnectionRef = serde_json::from_value(value).unwrap();
        assert_eq!(reference.connection, Connection::main());
    }
}
