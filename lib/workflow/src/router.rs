//! Output routing.
//!
//! After a node runs, the router completes missing lineage on its output
//! items and fans each output array out to every connection wired to that
//! output pin. Arrays are shared by `Arc`, never copied per consumer.

use crate::error::RouterError;
use crate::graph::WorkflowGraph;
use crate::item::{Item, PairedItem};
use crate::node_type::NodeOutput;
use crate::pin::{PinData, SourceRef};
use std::sync::Arc;
use weft_core::NodeId;

/// An output array on its way to one input pin.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub target: NodeId,
    pub input_index: usize,
    pub source: SourceRef,
    pub items: Arc<[Item]>,
}

/// Routes node output over a workflow graph.
#[derive(Debug, Clone, Copy)]
pub struct OutputRouter<'g> {
    graph: &'g WorkflowGraph,
}

impl<'g> OutputRouter<'g> {
    #[must_use]
    pub fn new(graph: &'g WorkflowGraph) -> Self {
        Self { graph }
    }

    /// Validates and completes lineage on a node's output.
    ///
    /// The result has exactly `declared_outputs` arrays. An item without
    /// lineage inherits `{ input: p, item: i }` when exactly one input pin `p`
    /// carried data and its item count equals the output array's length.
    /// Nodes without input data produce root items, which need no lineage.
    ///
    /// # Errors
    ///
    /// Returns an error for outputs beyond the declared pins, items whose
    /// lineage cannot be inferred, and lineage pointing at missing inputs.
    pub fn complete_lineage(
        declared_outputs: usize,
        inputs: &[PinData],
        output: NodeOutput,
    ) -> Result<Vec<Arc<[Item]>>, RouterError> {
        if output.len() > declared_outputs {
            return Err(RouterError::UndeclaredOutput {
                index: declared_outputs,
                declared: declared_outputs,
            });
        }

        let pins_with_data: Vec<(usize, usize)> = inputs
            .iter()
            .enumerate()
            .filter(|(_, pin)| !pin.is_empty())
            .map(|(index, pin)| (index, pin.len()))
            .collect();
        let single_source = match pins_with_data.as_slice() {
            [only] => Some(*only),
            _ => None,
        };

        let mut routed = Vec::with_capacity(declared_outputs);
        for (output_index, mut items) in output.into_iter().enumerate() {
            let count = items.len();
            for (item_index, item) in items.iter_mut().enumerate() {
                if item.has_lineage() {
                    check_pointers(inputs, item.paired_item(), output_index, item_index)?;
                    continue;
                }
                if pins_with_data.is_empty() {
                    continue;
                }
                match single_source {
                    Some((pin, len)) if len == count => {
                        item.inherit_lineage(PairedItem::from_input(pin, item_index));
                    }
                    _ => {
                        return Err(RouterError::UnresolvableLineage {
                            output_index,
                            item_index,
                        });
                    }
                }
            }
            routed.push(Arc::from(items));
        }
        routed.resize_with(declared_outputs, || Arc::from(Vec::<Item>::new()));
        Ok(routed)
    }

    /// Fans output arrays out to their connections.
    ///
    /// Empty arrays are not delivered; outputs wired to nothing stay in run
    /// data only.
    #[must_use]
    pub fn route(&self, node_id: NodeId, run_index: usize, outputs: &[Arc<[Item]>]) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        for (output_index, items) in outputs.iter().enumerate() {
            if items.is_empty() {
                continue;
            }
            let source = SourceRef {
                node_id,
                run_index,
                output_index,
            };
            for (target, connection) in self.graph.outgoing(node_id, output_index) {
                deliveries.push(Delivery {
                    target,
                    input_index: connection.target_input,
                    source,
                    items: Arc::clone(items),
                });
            }
        }
        deliveries
    }
}

fn check_pointers(
    inputs: &[PinData],
    pointers: &[PairedItem],
    output_index: usize,
    item_index: usize,
) -> Result<(), RouterError> {
    for pointer in pointers {
        let exists = inputs
            .get(pointer.input)
            .is_some_and(|pin| pointer.item < pin.len());
        if !exists {
            return Err(RouterError::DanglingLineage {
                output_index,
                item_index,
                input: pointer.input,
                item: pointer.item,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::Connection;
    use crate::item::JsonObject;
    use crate::node::Node;

    fn items(count: usize) -> Vec<Item> {
        (0..count).map(|_| Item::new(JsonObject::new())).collect()
    }

    #[test]
    fn one_to_one_output_inherits_lineage() {
        let inputs = vec![PinData::from_items(items(2))];
        let routed = OutputRouter::complete_lineage(1, &inputs, vec![items(2)]).unwrap();
        assert_eq!(routed[0][0].paired_item(), &[PairedItem::new(0)]);
        assert_eq!(routed[0][1].paired_item(), &[PairedItem::new(1)]);
    }

    #[test]
    fn inherits_from_the_only_pin_with_data() {
        let inputs = vec![PinData::new(), PinData::from_items(items(1))];
        let routed = OutputRouter::complete_lineage(1, &inputs, vec![items(1)]).unwrap();
        assert_eq!(routed[0][0].paired_item(), &[PairedItem::from_input(1, 0)]);
    }

    #[test]
    fn count_mismatch_is_unresolvable() {
        let inputs = vec![PinData::from_items(items(2))];
        let err = OutputRouter::complete_lineage(1, &inputs, vec![items(1)]).unwrap_err();
        assert_eq!(
            err,
            RouterError::UnresolvableLineage {
                output_index: 0,
                item_index: 0,
            }
        );
    }

    #[test]
    fn two_pins_with_data_are_ambiguous() {
        let inputs = vec![PinData::from_items(items(1)), PinData::from_items(items(1))];
        assert!(OutputRouter::complete_lineage(1, &inputs, vec![items(1)]).is_err());

        let merged = vec![Item::derive_from(
            JsonObject::new(),
            vec![PairedItem::from_input(0, 0), PairedItem::from_input(1, 0)],
        )];
        let routed = OutputRouter::complete_lineage(1, &inputs, vec![merged]).unwrap();
        assert_eq!(routed[0][0].paired_item().len(), 2);
    }

    #[test]
    fn explicit_lineage_is_kept_and_checked() {
        let inputs = vec![PinData::from_items(items(3))];
        let output = vec![Item::derive(JsonObject::new(), 2)];
        let routed = OutputRouter::complete_lineage(1, &inputs, vec![output]).unwrap();
        assert_eq!(routed[0][0].paired_item(), &[PairedItem::new(2)]);

        let dangling = vec![Item::derive(JsonObject::new(), 5)];
        assert!(matches!(
            OutputRouter::complete_lineage(1, &inputs, vec![dangling]),
            Err(RouterError::DanglingLineage { item: 5, .. })
        ));
    }

    #[test]
    fn root_items_need_no_lineage_and_outputs_are_padded() {
        let routed = OutputRouter::complete_lineage(2, &[], vec![items(3)]).unwrap();
        assert_eq!(routed.len(), 2);
        assert!(routed[1].is_empty());
        assert!(routed[0].iter().all(|item| !item.has_lineage()));
    }

    #[test]
    fn undeclared_output_is_rejected() {
        assert!(matches!(
            OutputRouter::complete_lineage(1, &[], vec![items(1), items(1)]),
            Err(RouterError::UndeclaredOutput { index: 1, .. })
        ));
    }

    #[test]
    fn route_fans_out_and_shares_arrays() {
        let mut graph = WorkflowGraph::new();
        let source = graph.add_node(Node::new("If", "test.if")).unwrap();
        let a = graph.add_node(Node::new("A", "test.noop")).unwrap();
        let b = graph.add_node(Node::new("B", "test.merge")).unwrap();
        let unused = graph.add_node(Node::new("C", "test.noop")).unwrap();
        graph.add_connection(source, a, Connection::new(0, 0)).unwrap();
        graph.add_connection(source, b, Connection::new(0, 1)).unwrap();
        graph.add_connection(source, unused, Connection::new(1, 0)).unwrap();

        let outputs: Vec<Arc<[Item]>> = vec![items(2).into(), Vec::<Item>::new().into()];
        let deliveries = OutputRouter::new(&graph).route(source, 3, &outputs);

        assert_eq!(deliveries.len(), 2);
        assert_eq!(deliveries[0].target, a);
        assert_eq!(deliveries[1].target, b);
        assert_eq!(deliveries[1].input_index, 1);
        assert_eq!(deliveries[1].source.run_index, 3);
        assert!(Arc::ptr_eq(&deliveries[0].items, &deliveries[1].items));
    }
}
