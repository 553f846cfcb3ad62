use std::sync::Arc;
use std::time::Duration;

use arbor_core::event::EventBus;
use arbor_core::types::{Edge, ExecutionEvent, TraversalStrategy};
use arbor_engine::graph::{
    analyze_dependencies, critical_path, detect_cycles, parallel_groups, topological_sort,
    validate_graph,
};
use arbor_engine::tree::{find_lowest_common_ancestor, find_path, get_subtree, validate_tree};
use arbor_engine::{ExecutionOptions, GraphExecutor, NodeStatus, TreeExecutor};
use arbor_test_utils::{graph, payloads, RecordingCallbacks, ScriptedExecutor, TreeBuilder};

#[test]
fn test_topological_order_respects_every_edge() {
    let g = graph(
        &["e", "d", "c", "b", "a"],
        &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d"), ("d", "e")],
    );
    let sorted = topological_sort(&g);
    assert!(sorted.success);

    let pos = |id: &str| sorted.order.iter().position(|n| n == id).unwrap();
    for edge in &g.edges {
        assert!(pos(&edge.source_node_id) < pos(&edge.target_node_id));
    }
}

#[test]
fn test_three_cycle_is_reported() {
    let g = graph(&["A", "B", "C"], &[("A", "B"), ("B", "C"), ("C", "A")]);

    let sorted = topological_sort(&g);
    assert!(!sorted.success);

    let cycles = detect_cycles(&g);
    assert!(cycles.has_cycles);
    let cycle = &cycles.cycles[0];
    assert_eq!(cycle.first(), cycle.last());
    let mut members = cycle[..cycle.len() - 1].to_vec();
    members.sort();
    assert_eq!(members, vec!["A", "B", "C"]);
}

#[test]
fn test_inactive_edge_breaks_cycle() {
    let mut g = graph(&["A", "B"], &[("A", "B")]);
    g.edges.push(Edge::inactive("B", "A"));

    assert!(!detect_cycles(&g).has_cycles);
    assert_eq!(topological_sort(&g).order, vec!["A", "B"]);
}

#[test]
fn test_edgeless_graph_is_one_level() {
    let g = graph(&["a", "b", "c", "d", "e"], &[]);
    let sorted = topological_sort(&g);
    assert_eq!(sorted.levels.len(), 1);
    assert_eq!(sorted.levels[0].len(), 5);

    let groups = parallel_groups(&g, 2);
    assert_eq!(groups, vec![vec!["a", "b"], vec!["c", "d"], vec!["e"]]);
}

#[test]
fn test_connected_dag_is_valid() {
    let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c")]);
    let result = validate_graph(&g);
    assert!(result.is_valid);
    assert!(result.is_dag);
    assert!(!result.has_cycles);
    assert!(result.isolated_nodes.is_empty());
    assert!(result.errors.is_empty());
}

#[test]
fn test_dependencies_and_critical_path() {
    let g = graph(&["a", "b", "c", "d"], &[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);

    let info = analyze_dependencies(&g, "d").unwrap();
    assert_eq!(info.direct_dependencies, vec!["b", "c"]);
    assert_eq!(info.all_dependencies.len(), 3);
    assert_eq!(info.level, Some(2));

    let durations = [("a", 1.0), ("b", 5.0), ("c", 1.0), ("d", 1.0)]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    assert_eq!(critical_path(&g, &durations), vec!["a", "b", "d"]);
}

#[test]
fn test_tree_path_queries() {
    let tree = TreeBuilder::new("root")
        .child("root", "A")
        .child("A", "B")
        .child("A", "C")
        .build("t");
    let map = tree.node_map();

    assert_eq!(find_lowest_common_ancestor(&map, "B", "C").as_deref(), Some("A"));
    let path = find_path(&map, "B", "C").unwrap();
    assert_eq!(path.path, vec!["B", "A", "C"]);
    assert_eq!(path.length, 3);

    let sub = get_subtree(&map, "A", Some(1)).unwrap();
    assert_eq!(sub.nodes.len(), 3);
    assert_eq!(sub.stats.leaf_nodes, 2);
    assert_eq!(sub.stats.branch_nodes, 1);
}

#[tokio::test]
async fn test_execute_halts_after_failure() {
    let tree = TreeBuilder::new("r")
        .child("r", "a")
        .child("r", "x")
        .child("r", "b")
        .child("b", "b1")
        .build("t");
    assert!(validate_tree(&tree).is_valid);

    let scripted = Arc::new(ScriptedExecutor::new().failing_on(&["x"]));
    let callbacks = Arc::new(RecordingCallbacks::new());
    let executor = TreeExecutor::<String, String>::new(scripted.clone())
        .with_callbacks(callbacks.clone());

    let result = executor
        .execute(&tree, &payloads(&tree), &ExecutionOptions::default())
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.completed_nodes, vec!["r", "a"]);
    assert_eq!(result.failed_nodes, vec!["x"]);
    assert_eq!(result.skipped_nodes, vec!["b", "b1"]);
    assert_eq!(result.results["a"], "done:a");
    assert_eq!(scripted.calls(), vec!["r", "a", "x"]);

    assert_eq!(
        callbacks.log(),
        vec![
            "start:r",
            "complete:r",
            "progress:1/5",
            "start:a",
            "complete:a",
            "progress:2/5",
            "start:x",
            "error:x",
            "progress:2/5",
        ]
    );
}

#[tokio::test]
async fn test_traversal_override() {
    let tree = TreeBuilder::new("r")
        .child("r", "a")
        .child("r", "b")
        .child("a", "a1")
        .build("t");
    let executor = TreeExecutor::<String, String>::new(Arc::new(ScriptedExecutor::new()));
    let options = ExecutionOptions::default().with_traversal(TraversalStrategy::Bfs);

    let result = executor.execute(&tree, &payloads(&tree), &options).await.unwrap();
    assert_eq!(result.traversal_order, vec!["r", "a", "b", "a1"]);

    let post = tree.clone().with_traversal(TraversalStrategy::DfsPostOrder);
    let result = executor
        .execute(&post, &payloads(&post), &ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.traversal_order, vec!["a1", "a", "b", "r"]);
}

#[tokio::test]
async fn test_by_level_continue_on_error_runs_deeper_levels() {
    let tree = TreeBuilder::new("r")
        .child("r", "ok")
        .child("r", "bad")
        .child("ok", "deep")
        .build("t");
    let executor = TreeExecutor::<String, String>::new(Arc::new(
        ScriptedExecutor::new().failing_on(&["bad"]),
    ));
    let options = ExecutionOptions::default().with_continue_on_error(true);

    let result = executor
        .execute_by_level(&tree, &payloads(&tree), &options)
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.status_of("ok"), Some(NodeStatus::Completed));
    assert_eq!(result.status_of("bad"), Some(NodeStatus::Failed));
    assert_eq!(result.status_of("deep"), Some(NodeStatus::Completed));
    assert!(result.skipped_nodes.is_empty());
}

#[tokio::test]
async fn test_by_level_dispatches_a_level_together() {
    let tree = TreeBuilder::new("r")
        .child("r", "a")
        .child("r", "b")
        .child("r", "c")
        .build("t");
    let scripted = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(20)));
    let callbacks = Arc::new(RecordingCallbacks::new());
    let executor = TreeExecutor::<String, String>::new(scripted.clone())
        .with_callbacks(callbacks.clone());

    let result = executor
        .execute_by_level(&tree, &payloads(&tree), &ExecutionOptions::default())
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(scripted.peak_concurrency(), 3);
    assert_eq!(callbacks.entries("progress:"), vec!["progress:1/4", "progress:4/4"]);
}

#[tokio::test]
async fn test_graph_run_publishes_events() {
    let g = graph(&["a", "b", "c"], &[("a", "b"), ("a", "c")]);
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();

    let scripted = Arc::new(ScriptedExecutor::new().with_delay(Duration::from_millis(5)));
    let executor = GraphExecutor::<String, String>::new(scripted.clone());
    let node_payloads = g.node_ids.iter().map(|id| (id.clone(), id.clone())).collect();
    let options = ExecutionOptions::default().with_event_bus(bus.clone());

    let out = executor.execute(&g, &node_payloads, &options).await.unwrap();
    assert!(out.result.success);
    assert_eq!(out.groups, vec![vec!["a"], vec!["b", "c"]]);
    assert_eq!(scripted.peak_concurrency(), 2);

    let mut completed = Vec::new();
    let mut finished = false;
    while let Ok(event) = rx.try_recv() {
        assert_eq!(event.execution_id(), &out.result.execution_id);
        match event {
            ExecutionEvent::NodeCompleted { node_id, .. } => completed.push(node_id),
            ExecutionEvent::RunFinished { success, .. } => finished = success,
            _ => {}
        }
    }
    assert_eq!(completed, vec!["a", "b", "c"]);
    assert!(finished);
}
