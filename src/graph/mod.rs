mod dataset;
pub mod invariants;

use std::collections::{HashMap, HashSet};

use eframe::egui::Vec2;
use serde::{Deserialize, Serialize};

pub use dataset::{Dataset, NodeRecord};
pub use invariants::VisibleSubgraph;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    #[default]
    Question,
    Memo,
}

impl NodeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Root => "root",
            Self::Question => "question",
            Self::Memo => "memo",
        }
    }

    fn base_radius(self) -> f32 {
        match self {
            Self::Root => 34.0,
            Self::Question => 24.0,
            Self::Memo => 14.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeShape {
    #[default]
    Circle,
    Square,
    Diamond,
    Pill,
}

impl NodeShape {
    /// Scale applied to the bounding circle so that corners do not poke into neighbours.
    fn radius_factor(self) -> f32 {
        match self {
            Self::Circle => 1.0,
            Self::Square => std::f32::consts::SQRT_2,
            Self::Diamond => 1.15,
            Self::Pill => 1.6,
        }
    }
}

/// Relationship carried by an edge.
///
/// Only `Hierarchy` edges are structural: they must form a forest and drive
/// depth, visibility and cascading removal. `Connection` and `Memo` edges are
/// auxiliary and never take part in cycle checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Hierarchy,
    Connection,
    Memo,
}

impl EdgeKind {
    pub fn is_structural(self) -> bool {
        matches!(self, Self::Hierarchy)
    }
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: String,
    pub label: String,
    pub kind: NodeKind,
    pub shape: NodeShape,
    pub size_value: f32,
    pub depth: usize,
    pub position: Option<Vec2>,
    pub pin: Option<Vec2>,
    pub velocity: Vec2,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            kind,
            shape: NodeShape::default(),
            size_value: 1.0,
            depth: 0,
            position: None,
            pin: None,
            velocity: Vec2::ZERO,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_shape(mut self, shape: NodeShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_position(mut self, position: Vec2) -> Self {
        self.position = Some(position);
        self
    }

    pub fn radius(&self) -> f32 {
        self.kind.base_radius() * self.shape.radius_factor() * self.size_value.clamp(0.25, 4.0)
    }
}

/// Attribute overrides accepted by `update_node`. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct NodePatch {
    pub label: Option<String>,
    pub kind: Option<NodeKind>,
    pub shape: Option<NodeShape>,
    pub size_value: Option<f32>,
}

impl NodePatch {
    pub(crate) fn apply(self, node: &mut Node) -> bool {
        let mut changed = false;
        if let Some(label) = self.label {
            changed |= node.label != label;
            node.label = label;
        }
        if let Some(kind) = self.kind {
            changed |= node.kind != kind;
            node.kind = kind;
        }
        if let Some(shape) = self.shape {
            changed |= node.shape != shape;
            node.shape = shape;
        }
        if let Some(size_value) = self.size_value
            && size_value.is_finite()
            && size_value > 0.0
        {
            changed |= (node.size_value - size_value).abs() > f32::EPSILON;
            node.size_value = size_value;
        }
        changed
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    #[serde(default = "default_weight")]
    pub weight: f32,
}

fn default_weight() -> f32 {
    1.0
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>, kind: EdgeKind) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            weight: 1.0,
        }
    }

    pub fn hierarchy(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, EdgeKind::Hierarchy)
    }

    pub fn connection(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(source, target, EdgeKind::Connection)
    }

    pub fn memo(anchor: impl Into<String>, memo: impl Into<String>) -> Self {
        Self::new(anchor, memo, EdgeKind::Memo)
    }

    pub fn touches(&self, id: &str) -> bool {
        self.source == id || self.target == id
    }

    fn same_link(&self, other: &Edge) -> bool {
        self.kind == other.kind && self.source == other.source && self.target == other.target
    }
}

/// Arena of nodes and edges addressed by stable string ids.
#[derive(Clone, Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    index_by_id: HashMap<String, usize>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index_of(id).map(|index| &self.nodes[index])
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.index_of(id).map(|index| &mut self.nodes[index])
    }

    pub fn has_edge(&self, edge: &Edge) -> bool {
        self.edges.iter().any(|existing| existing.same_link(edge))
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub(crate) fn push_node(&mut self, node: Node) -> usize {
        let index = self.nodes.len();
        self.index_by_id.insert(node.id.clone(), index);
        self.nodes.push(node);
        index
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Drops every listed node and every edge touching one of them.
    pub(crate) fn remove_nodes(&mut self, removed: &HashSet<String>) {
        if removed.is_empty() {
            return;
        }
        self.nodes.retain(|node| !removed.contains(&node.id));
        self.edges
            .retain(|edge| !removed.contains(&edge.source) && !removed.contains(&edge.target));
        self.reindex();
    }

    /// Recomputes `depth` for every node from the hierarchy edges.
    pub(crate) fn refresh_depths(&mut self) {
        let depths = invariants::derive_depths(self);
        for node in &mut self.nodes {
            node.depth = depths.get(&node.id).copied().unwrap_or(0);
        }
    }

    fn reindex(&mut self) {
        self.index_by_id.clear();
        for (index, node) in self.nodes.iter().enumerate() {
            self.index_by_id.insert(node.id.clone(), index);
        }
    }
}
