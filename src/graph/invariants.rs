//! Structural invariants over the hierarchy edges of a [`Graph`].
//!
//! Only `Hierarchy` edges are considered here unless stated otherwise. They must
//! form a forest: every node has at most one hierarchy parent and no directed
//! cycle exists. Everything in this module is a pure function of its inputs.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{GraphError, Result};

use super::{Edge, EdgeKind, Graph, NodeKind};

pub type ChildrenMap = HashMap<String, Vec<String>>;
pub type ParentMap = HashMap<String, String>;

pub fn derive_children_map(edges: &[Edge]) -> ChildrenMap {
    let mut children: ChildrenMap = HashMap::new();
    for edge in edges.iter().filter(|edge| edge.kind.is_structural()) {
        children
            .entry(edge.source.clone())
            .or_default()
            .push(edge.target.clone());
    }
    children
}

pub fn derive_parent_map(edges: &[Edge]) -> ParentMap {
    let mut parents = HashMap::new();
    for edge in edges.iter().filter(|edge| edge.kind.is_structural()) {
        parents
            .entry(edge.target.clone())
            .or_insert_with(|| edge.source.clone());
    }
    parents
}

/// Whether adding the hierarchy edge `source -> target` on top of `edges` and
/// `pending` closes a directed cycle, i.e. whether `source` is reachable from
/// `target`.
pub fn would_create_cycle(edges: &[Edge], source: &str, target: &str, pending: &[Edge]) -> bool {
    if source == target {
        return true;
    }

    let mut children: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges
        .iter()
        .chain(pending.iter())
        .filter(|edge| edge.kind.is_structural())
    {
        children
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }
    children.entry(source).or_default().push(target);

    let mut visited = HashSet::from([target]);
    let mut queue = VecDeque::from([target]);
    while let Some(current) = queue.pop_front() {
        let Some(next_nodes) = children.get(current) else {
            continue;
        };
        for &next in next_nodes {
            if next == source {
                return true;
            }
            if visited.insert(next) {
                queue.push_back(next);
            }
        }
    }

    false
}

/// Checks a proposed edge against the committed graph plus edges already
/// accepted earlier in the same transaction. Endpoints are assumed to exist.
pub fn validate_edge(graph: &Graph, edge: &Edge, pending: &[Edge]) -> Result<()> {
    let committed = graph.edges();
    match edge.kind {
        EdgeKind::Hierarchy => {
            if would_create_cycle(committed, &edge.source, &edge.target, pending) {
                return Err(GraphError::Cycle {
                    parent: edge.source.clone(),
                    child: edge.target.clone(),
                });
            }

            if let Some(parent) = committed
                .iter()
                .chain(pending.iter())
                .find(|existing| existing.kind.is_structural() && existing.target == edge.target)
                && parent.source != edge.source
            {
                return Err(GraphError::MultipleParents {
                    child: edge.target.clone(),
                    parent: parent.source.clone(),
                });
            }
        }
        EdgeKind::Memo => {
            if edge.source == edge.target {
                return Err(GraphError::SelfLoop {
                    id: edge.source.clone(),
                });
            }
            if let Some(anchor) = committed
                .iter()
                .chain(pending.iter())
                .find(|existing| existing.kind == EdgeKind::Memo && existing.target == edge.target)
                && anchor.source != edge.source
            {
                return Err(GraphError::MultipleParents {
                    child: edge.target.clone(),
                    parent: anchor.source.clone(),
                });
            }
        }
        EdgeKind::Connection => {
            if edge.source == edge.target {
                return Err(GraphError::SelfLoop {
                    id: edge.source.clone(),
                });
            }
        }
    }

    Ok(())
}

/// The first `root` node without a hierarchy parent, falling back to the first
/// parentless non-memo node in arena order.
pub fn find_root(graph: &Graph) -> Option<&str> {
    let parents = derive_parent_map(graph.edges());
    let mut fallback = None;
    for node in graph.nodes() {
        if parents.contains_key(&node.id) || node.kind == NodeKind::Memo {
            continue;
        }
        if node.kind == NodeKind::Root {
            return Some(node.id.as_str());
        }
        if fallback.is_none() {
            fallback = Some(node.id.as_str());
        }
    }
    fallback
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VisibleSubgraph {
    /// Visible node ids in traversal order.
    pub node_ids: Vec<String>,
    /// Indices into `Graph::edges` of edges whose endpoints are both visible.
    pub edge_indices: Vec<usize>,
    members: HashSet<String>,
}

impl VisibleSubgraph {
    pub fn contains(&self, id: &str) -> bool {
        self.members.contains(id)
    }

    pub fn len(&self) -> usize {
        self.node_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.node_ids.is_empty()
    }

    fn everything(graph: &Graph) -> Self {
        let node_ids = graph
            .nodes()
            .iter()
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        Self {
            members: node_ids.iter().cloned().collect(),
            node_ids,
            edge_indices: (0..graph.edge_count()).collect(),
        }
    }
}

/// Nodes a visibility walk starts from: the primary root first, then every
/// other node without a hierarchy parent in arena order. A memo only counts once
/// its anchor edge is gone.
pub fn top_level_nodes(graph: &Graph) -> Vec<&str> {
    let parents = derive_parent_map(graph.edges());
    let anchored = graph
        .edges()
        .iter()
        .filter(|edge| edge.kind == EdgeKind::Memo)
        .map(|edge| edge.target.as_str())
        .collect::<HashSet<_>>();

    let primary = find_root(graph);
    let mut roots = primary.into_iter().collect::<Vec<_>>();
    roots.extend(
        graph
            .nodes()
            .iter()
            .map(|node| node.id.as_str())
            .filter(|id| {
                Some(*id) != primary && !parents.contains_key(*id) && !anchored.contains(id)
            }),
    );
    roots
}

/// Depth-first walk over hierarchy edges. Collapsed nodes stay visible but
/// their hierarchy children are not entered. Memo nodes follow their anchor;
/// connection edges are kept when both endpoints are visible.
///
/// With `root == None` the walk starts from every [`top_level_nodes`] entry, so
/// a forest stays fully reachable. When there is nothing to start from every
/// node is visible.
pub fn compute_visible_subgraph(
    graph: &Graph,
    root: Option<&str>,
    collapsed: &HashSet<String>,
) -> VisibleSubgraph {
    let roots = match root {
        Some(root) if graph.contains(root) => vec![root],
        Some(_) => Vec::new(),
        None => top_level_nodes(graph),
    };
    if roots.is_empty() {
        return VisibleSubgraph::everything(graph);
    }

    let children = derive_children_map(graph.edges());
    let mut memos: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in graph.edges().iter().filter(|edge| edge.kind == EdgeKind::Memo) {
        memos
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
    }

    let mut node_ids = Vec::new();
    let mut members = HashSet::new();
    // Reversed so that the primary root is walked first.
    let mut stack = roots
        .iter()
        .rev()
        .map(|root| (*root).to_owned())
        .collect::<Vec<_>>();
    while let Some(current) = stack.pop() {
        if !graph.contains(&current) || !members.insert(current.clone()) {
            continue;
        }
        node_ids.push(current.clone());

        if let Some(attached) = memos.get(current.as_str()) {
            for &memo in attached {
                if graph.contains(memo) && members.insert(memo.to_owned()) {
                    node_ids.push(memo.to_owned());
                }
            }
        }

        if collapsed.contains(&current) {
            continue;
        }
        if let Some(next_nodes) = children.get(&current) {
            // Reverse so that the first child is visited first.
            for next in next_nodes.iter().rev() {
                stack.push(next.clone());
            }
        }
    }

    let edge_indices = graph
        .edges()
        .iter()
        .enumerate()
        .filter(|(_, edge)| {
            if !members.contains(&edge.source) || !members.contains(&edge.target) {
                return false;
            }
            !(edge.kind.is_structural() && collapsed.contains(&edge.source))
        })
        .map(|(index, _)| index)
        .collect();

    VisibleSubgraph {
        node_ids,
        edge_indices,
        members,
    }
}

/// `node_id` together with every hierarchy descendant.
pub fn removal_set(edges: &[Edge], node_id: &str) -> HashSet<String> {
    let children = derive_children_map(edges);
    let mut removed = HashSet::from([node_id.to_owned()]);
    let mut stack = vec![node_id.to_owned()];
    while let Some(current) = stack.pop() {
        if let Some(next_nodes) = children.get(&current) {
            for next in next_nodes {
                if removed.insert(next.clone()) {
                    stack.push(next.clone());
                }
            }
        }
    }
    removed
}

/// Hierarchy depth of every node. Parentless nodes sit at depth 0 and memo nodes
/// share the depth of their anchor plus one.
pub fn derive_depths(graph: &Graph) -> HashMap<String, usize> {
    let children = derive_children_map(graph.edges());
    let parents = derive_parent_map(graph.edges());

    let mut depths = HashMap::with_capacity(graph.node_count());
    let mut queue = VecDeque::new();
    for node in graph.nodes() {
        if !parents.contains_key(&node.id) {
            depths.insert(node.id.clone(), 0usize);
            queue.push_back(node.id.clone());
        }
    }

    while let Some(current) = queue.pop_front() {
        let depth = depths.get(&current).copied().unwrap_or(0);
        let Some(next_nodes) = children.get(&current) else {
            continue;
        };
        for next in next_nodes {
            if !depths.contains_key(next) {
                depths.insert(next.clone(), depth + 1);
                queue.push_back(next.clone());
            }
        }
    }

    for edge in graph.edges().iter().filter(|edge| edge.kind == EdgeKind::Memo) {
        let anchor_depth = depths.get(&edge.source).copied().unwrap_or(0);
        depths.insert(edge.target.clone(), anchor_depth + 1);
    }

    depths
}
