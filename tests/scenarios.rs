use std::collections::{HashMap, HashSet};
use std::time::Duration;

use eframe::egui::{Vec2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use treeforce::graph::invariants::{compute_visible_subgraph, derive_children_map};
use treeforce::graph::{Dataset, NodeRecord};
use treeforce::physics::DragRelease;
use treeforce::{
    CommandOutcome, Edge, GraphError, LayoutController, Node, NodeKind, PositionMap,
    TreeforceConfig, simulate,
};

fn seeded_config() -> TreeforceConfig {
    let mut config = TreeforceConfig::default();
    config.placement.seed = Some(42);
    config
}

fn record(id: &str, kind: NodeKind) -> NodeRecord {
    NodeRecord {
        id: id.to_owned(),
        kind,
        label: id.to_uppercase(),
        shape: Default::default(),
        size: 1.0,
        x: None,
        y: None,
    }
}

fn tree(nodes: &[&str], edges: &[(&str, &str)]) -> LayoutController {
    let dataset = Dataset {
        tree_id: "scenario".to_owned(),
        nodes: nodes
            .iter()
            .enumerate()
            .map(|(index, id)| {
                let kind = if index == 0 {
                    NodeKind::Root
                } else {
                    NodeKind::Question
                };
                record(id, kind)
            })
            .collect(),
        edges: edges
            .iter()
            .map(|(source, target)| Edge::hierarchy(*source, *target))
            .collect(),
    };
    LayoutController::from_dataset(dataset, seeded_config())
}

fn ids(graph_ids: impl IntoIterator<Item = impl Into<String>>) -> HashSet<String> {
    graph_ids.into_iter().map(Into::into).collect()
}

#[test]
fn back_edge_is_rejected_and_root_removal_empties_the_tree() {
    let mut controller = tree(&["A", "B", "C"], &[("A", "B"), ("A", "C")]);
    let nodes_before = controller.graph().node_count();
    let edges_before = controller.graph().edges().to_vec();

    let result = controller.add_edge(Edge::hierarchy("C", "A"));
    assert_eq!(
        result,
        Err(GraphError::Cycle {
            parent: "C".to_owned(),
            child: "A".to_owned(),
        })
    );
    assert_eq!(controller.graph().node_count(), nodes_before);
    assert_eq!(controller.graph().edges(), edges_before.as_slice());

    let removed = controller.remove_node("A");
    assert_eq!(removed, ids(["A", "B", "C"]));
    assert!(controller.graph().is_empty());
    assert_eq!(controller.graph().edge_count(), 0);
}

#[test]
fn collapsing_hides_descendants_and_their_edges() {
    let mut controller = tree(
        &["A", "B", "C", "D", "E"],
        &[("A", "B"), ("A", "C"), ("B", "D"), ("B", "E")],
    );
    assert_eq!(controller.toggle_collapse("B"), CommandOutcome::Applied);

    let visible = controller.visible();
    assert!(visible.contains("B"));
    assert!(!visible.contains("D"));
    assert!(!visible.contains("E"));
    let graph = controller.graph();
    let visible_edges = visible
        .edge_indices
        .iter()
        .map(|&index| &graph.edges()[index])
        .collect::<Vec<_>>();
    assert!(visible_edges.iter().all(|edge| edge.source != "B"));
    assert_eq!(visible_edges.len(), 2);

    let collapsed = ids(["B"]);
    let first = compute_visible_subgraph(graph, Some("A"), &collapsed);
    let second = compute_visible_subgraph(graph, Some("A"), &collapsed);
    assert_eq!(first, second);
    assert_eq!(first.node_ids, visible.node_ids);

    assert_eq!(controller.toggle_collapse("B"), CommandOutcome::Applied);
    assert_eq!(controller.visible().len(), 5);
}

#[test]
fn released_node_returns_to_the_simulation() {
    let nodes = vec![
        Node::new("root", NodeKind::Root).with_position(Vec2::ZERO),
        Node::new("X", NodeKind::Question).with_position(vec2(60.0, 0.0)),
        Node::new("Y", NodeKind::Question).with_position(vec2(-60.0, 10.0)),
    ];
    let edges = vec![Edge::hierarchy("root", "X"), Edge::hierarchy("root", "Y")];
    let mut simulation = simulate(&nodes, &edges, &PositionMap::new(), &seeded_config());

    assert!(simulation.begin_drag("X", &[]));
    simulation.drag_to(vec2(120.0, 80.0));
    let frame = simulation.tick().unwrap();
    let dragged = frame.node("X").unwrap();
    assert_eq!(dragged.position, vec2(120.0, 80.0));
    assert_eq!(dragged.pin, Some(vec2(120.0, 80.0)));

    simulation.end_drag(DragRelease::Unpin);
    let frame = simulation.tick().unwrap();
    let released = frame.node("X").unwrap();
    assert_eq!(released.pin, None);
    assert_ne!(released.position, vec2(120.0, 80.0));
}

#[test]
fn free_release_through_the_controller_clears_the_pin() {
    let mut controller = tree(&["root", "X"], &[("root", "X")]);
    controller.frame(Duration::from_millis(16));

    assert_eq!(controller.begin_drag("X", &[]), CommandOutcome::Applied);
    controller.drag_to(vec2(120.0, 80.0));
    let frame = controller.frame(Duration::from_millis(16)).unwrap();
    assert_eq!(frame.node("X").unwrap().position, vec2(120.0, 80.0));
    assert_eq!(controller.end_drag(), CommandOutcome::Applied);
    assert_eq!(controller.graph().node("X").unwrap().pin, None);

    let frame = controller.frame(Duration::from_millis(16)).unwrap();
    assert_eq!(frame.node("X").unwrap().pin, None);
}

fn random_forest(rng: &mut StdRng, size: usize) -> (Vec<String>, Vec<(String, String)>) {
    let ids = (0..size).map(|index| format!("n{index}")).collect::<Vec<_>>();
    let mut edges = Vec::new();
    for index in 1..size {
        if rng.gen_bool(0.85) {
            let parent = rng.gen_range(0..index);
            edges.push((ids[parent].clone(), ids[index].clone()));
        }
    }
    (ids, edges)
}

fn descendants(edges: &[Edge], id: &str) -> HashSet<String> {
    let children = derive_children_map(edges);
    let mut found = HashSet::from([id.to_owned()]);
    let mut frontier = vec![id.to_owned()];
    while let Some(current) = frontier.pop() {
        for child in children.get(&current).into_iter().flatten() {
            if found.insert(child.clone()) {
                frontier.push(child.clone());
            }
        }
    }
    found
}

fn reachable(edges: &[Edge], from: &str, to: &str) -> bool {
    descendants(edges, from).contains(to)
}

#[test]
fn removal_returns_exactly_the_subtree() {
    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..25 {
        let (node_ids, edges) = random_forest(&mut rng, 18);
        let node_refs = node_ids.iter().map(String::as_str).collect::<Vec<_>>();
        let edge_refs = edges
            .iter()
            .map(|(source, target)| (source.as_str(), target.as_str()))
            .collect::<Vec<_>>();
        let mut controller = tree(&node_refs, &edge_refs);

        let victim = node_ids[rng.gen_range(0..node_ids.len())].clone();
        let expected = descendants(controller.graph().edges(), &victim);
        let removed = controller.remove_node(&victim);

        assert_eq!(removed, expected);
        let graph = controller.graph();
        assert_eq!(graph.node_count(), node_ids.len() - removed.len());
        assert!(removed.iter().all(|id| !graph.contains(id)));
        assert!(
            graph
                .edges()
                .iter()
                .all(|edge| !removed.contains(&edge.source) && !removed.contains(&edge.target))
        );
    }
}

#[test]
fn candidate_edges_closing_a_cycle_never_commit() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..25 {
        let (node_ids, edges) = random_forest(&mut rng, 12);
        let node_refs = node_ids.iter().map(String::as_str).collect::<Vec<_>>();
        let edge_refs = edges
            .iter()
            .map(|(source, target)| (source.as_str(), target.as_str()))
            .collect::<Vec<_>>();
        let mut controller = tree(&node_refs, &edge_refs);

        for _ in 0..10 {
            let source = &node_ids[rng.gen_range(0..node_ids.len())];
            let target = &node_ids[rng.gen_range(0..node_ids.len())];
            let before = controller.graph().edges().to_vec();
            let closes_cycle = source == target || reachable(&before, target, source);

            let result = controller.add_edge(Edge::hierarchy(source.clone(), target.clone()));
            if closes_cycle {
                assert!(matches!(result, Err(GraphError::Cycle { .. })));
                assert_eq!(controller.graph().edges(), before.as_slice());
            }
            let parents = controller
                .graph()
                .edges()
                .iter()
                .fold(HashMap::<&str, usize>::new(), |mut parents, edge| {
                    *parents.entry(edge.target.as_str()).or_default() += 1;
                    parents
                });
            assert!(parents.values().all(|&count| count == 1));
        }
    }
}

#[test]
fn memo_follows_its_anchor_into_and_out_of_view() {
    let mut controller = tree(&["A", "B"], &[("A", "B")]);
    controller
        .add_node(Node::new("memo", NodeKind::Memo), Some(Edge::memo("B", "memo")))
        .unwrap();
    assert!(controller.visible().contains("memo"));
    assert_eq!(controller.graph().node("memo").unwrap().depth, 2);

    controller.toggle_collapse("A");
    assert!(!controller.visible().contains("B"));
    assert!(!controller.visible().contains("memo"));

    let removed = controller.remove_node("B");
    assert_eq!(removed, ids(["B"]));
    assert!(controller.graph().contains("memo"));
    assert!(controller.graph().edges().is_empty());

    // Without its anchor the memo stands on its own.
    assert!(controller.visible().contains("memo"));
    let mut frames = 0;
    while controller.frame(Duration::from_millis(16)).is_some() {
        frames += 1;
        assert!(frames < 2_000, "layout never settled");
    }
    assert!(controller.graph().node("memo").unwrap().position.is_some());
    assert_eq!(controller.remove_node("memo"), ids(["memo"]));
}

#[test]
fn every_tree_of_a_forest_is_laid_out() {
    let mut controller = tree(&["A", "B", "C", "D"], &[("A", "B"), ("C", "D")]);
    controller
        .add_node(Node::new("loose", NodeKind::Question), None)
        .unwrap();
    assert_eq!(controller.visible().len(), 5);

    let mut frames = 0;
    while controller.frame(Duration::from_millis(16)).is_some() {
        frames += 1;
        assert!(frames < 2_000, "layout never settled");
    }
    assert!(
        controller
            .graph()
            .nodes()
            .iter()
            .all(|node| node.position.is_some())
    );
}
