use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use eframe::egui::vec2;
use serde::{Deserialize, Serialize};

use super::{Edge, Node, NodeKind, NodeShape};

/// On-disk form of a tree as handed over by the UI collaborator.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Dataset {
    #[serde(default)]
    pub tree_id: String,
    #[serde(default)]
    pub nodes: Vec<NodeRecord>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub kind: NodeKind,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub shape: NodeShape,
    #[serde(default = "default_size")]
    pub size: f32,
    #[serde(default)]
    pub x: Option<f32>,
    #[serde(default)]
    pub y: Option<f32>,
}

fn default_size() -> f32 {
    1.0
}

impl NodeRecord {
    pub fn into_node(self) -> Node {
        let mut node = Node::new(self.id, self.kind)
            .with_label(self.label)
            .with_shape(self.shape);
        if self.size.is_finite() && self.size > 0.0 {
            node.size_value = self.size;
        }
        if let (Some(x), Some(y)) = (self.x, self.y)
            && x.is_finite()
            && y.is_finite()
        {
            node.position = Some(vec2(x, y));
        }
        node
    }
}

impl Dataset {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("invalid tree dataset JSON")
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read dataset {}", path.display()))?;
        Self::from_json(&raw).with_context(|| format!("while loading {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    #[test]
    fn parses_minimal_dataset_with_defaults() {
        let dataset = Dataset::from_json(
            r#"{
                "tree_id": "t1",
                "nodes": [
                    { "id": "a", "kind": "root", "x": 4, "y": -2 },
                    { "id": "b", "label": "Why?" }
                ],
                "edges": [ { "source": "a", "target": "b", "kind": "hierarchy" } ]
            }"#,
        )
        .unwrap();

        assert_eq!(dataset.tree_id, "t1");
        assert_eq!(dataset.edges[0].kind, EdgeKind::Hierarchy);
        assert_eq!(dataset.edges[0].weight, 1.0);

        let mut nodes = dataset.nodes.into_iter().map(NodeRecord::into_node);
        let root = nodes.next().unwrap();
        assert_eq!(root.kind, NodeKind::Root);
        assert_eq!(root.position, Some(vec2(4.0, -2.0)));
        let child = nodes.next().unwrap();
        assert_eq!(child.kind, NodeKind::Question);
        assert_eq!(child.label, "Why?");
        assert_eq!(child.position, None);
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(Dataset::from_json("{ nodes: ").is_err());
    }
}
