//! End-to-end runs of built-in nodes through the graph walker.

use serde_json::json;
use std::sync::Arc;
use weft_nodes::builtin_registry;
use weft_processed_data::{InMemoryRepository, ProcessedDataConfig, ProcessedDataStore};
use weft_core::NodeId;
use weft_workflow::{
    Connection, GraphWalker, Item, LineageStep, Node, PairedItem, RunState, Workflow,
};

fn step(node_id: NodeId, item_index: usize) -> LineageStep {
    LineageStep {
        node_id,
        run_index: 0,
        output_index: 0,
        item_index,
    }
}

#[tokio::test]
async fn set_reads_nested_input_per_item() {
    let mut workflow = Workflow::new("nested");
    let trigger = workflow
        .add_node(Node::new("Start", "weft.manualTrigger").with_parameter(
            "items",
            json!([{ "input": [{ "count": 0 }] }, { "input": [{ "count": 1 }] }]),
        ))
        .unwrap();
    let set = workflow
        .add_node(Node::new("Set", "weft.set").with_parameter(
            "values",
            json!([{ "name": "value", "value": "{{ $json.input[0].count }}" }]),
        ))
        .unwrap();
    workflow.connect(trigger, set).unwrap();

    let mut walker = GraphWalker::new(Arc::new(workflow), Arc::new(builtin_registry())).unwrap();
    assert_eq!(walker.execute().await.unwrap(), RunState::Completed);

    let output = walker.run_data().output(set, 0).unwrap();
    assert_eq!(output[0].get("value"), Some(&json!(0)));
    assert_eq!(output[1].get("value"), Some(&json!(1)));
    assert_eq!(output[1].paired_item(), &[PairedItem::new(1)]);

    let chain = walker.run_data().trace_lineage(step(set, 1));
    assert_eq!(chain.last().map(|s| (s.node_id, s.item_index)), Some((trigger, 1)));
}

#[tokio::test]
async fn remove_duplicates_admits_each_key_once_across_runs() {
    let mut workflow = Workflow::new("dedupe");
    let trigger = workflow
        .add_node(Node::new("Start", "weft.manualTrigger"))
        .unwrap();
    let dedupe = workflow
        .add_node(
            Node::new("Dedupe", "weft.removeDuplicates")
                .with_parameter("key", json!("{{ $json.id }}")),
        )
        .unwrap();
    let fresh = workflow.add_node(Node::new("Fresh", "weft.noOp")).unwrap();
    workflow.connect(trigger, dedupe).unwrap();
    workflow.connect(dedupe, fresh).unwrap();

    let workflow = Arc::new(workflow);
    let registry = Arc::new(builtin_registry());
    let store = Arc::new(ProcessedDataStore::new(
        Arc::new(InMemoryRepository::new()),
        ProcessedDataConfig::default(),
    ));

    let run = |ids: Vec<i64>| {
        let workflow = workflow.clone();
        let registry = registry.clone();
        let store = store.clone();
        async move {
            let items = ids
                .into_iter()
                .map(|id| Item::from_value(json!({ "id": id })))
                .collect();
            let mut walker = GraphWalker::new(workflow, registry)
                .unwrap()
                .with_processed_data(store)
                .with_trigger_items(trigger, items)
                .unwrap();
            assert_eq!(walker.execute().await.unwrap(), RunState::Completed);
            let fresh_ids: Vec<_> = walker
                .run_data()
                .output(fresh, 0)
                .unwrap_or_default()
                .iter()
                .filter_map(|item| item.get("id").cloned())
                .collect();
            let repeats = walker.run_data().output(dedupe, 1).map_or(0, <[_]>::len);
            (fresh_ids, repeats)
        }
    };

    assert_eq!(run(vec![1, 2]).await, (vec![json!(1), json!(2)], 0));
    assert_eq!(run(vec![2, 3]).await, (vec![json!(3)], 1));
    assert_eq!(run(vec![1, 3]).await, (vec![], 2));
}

#[tokio::test]
async fn merge_waits_for_both_branches_and_keeps_both_parents() {
    let mut workflow = Workflow::new("merge");
    let trigger = workflow
        .add_node(
            Node::new("Start", "weft.manualTrigger")
                .with_parameter("items", json!([{ "n": 1 }, { "n": 2 }])),
        )
        .unwrap();
    let left = workflow
        .add_node(
            Node::new("Left", "weft.set")
                .with_parameter("values", json!([{ "name": "side", "value": "left" }])),
        )
        .unwrap();
    let right = workflow
        .add_node(
            Node::new("Right", "weft.set")
                .with_parameter("values", json!([{ "name": "other", "value": "{{ $json.n }}" }]))
                .with_parameter("keepOnlySet", json!(true)),
        )
        .unwrap();
    let merge = workflow
        .add_node(
            Node::new("Merge", "weft.merge").with_parameter("mode", json!("combineByPosition")),
        )
        .unwrap();
    workflow.connect(trigger, left).unwrap();
    workflow.connect(trigger, right).unwrap();
    workflow.connect(left, merge).unwrap();
    workflow
        .connect_pins(right, merge, Connection::new(0, 1))
        .unwrap();

    let mut walker = GraphWalker::new(Arc::new(workflow), Arc::new(builtin_registry())).unwrap();
    assert_eq!(walker.execute().await.unwrap(), RunState::Completed);

    assert_eq!(walker.run_data().runs(merge).len(), 1);
    let output = walker.run_data().output(merge, 0).unwrap();
    assert_eq!(output.len(), 2);
    assert_eq!(output[1].get("side"), Some(&json!("left")));
    assert_eq!(output[1].get("other"), Some(&json!(2)));
    assert_eq!(
        output[1].paired_item(),
        &[PairedItem::from_input(0, 1), PairedItem::from_input(1, 1)]
    );

    let chain = walker.run_data().trace_lineage(step(merge, 1));
    let nodes: Vec<_> = chain.iter().map(|s| s.node_id).collect();
    assert_eq!(nodes, vec![merge, left, trigger]);
}
