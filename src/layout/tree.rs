use std::collections::{HashMap, HashSet};

use eframe::egui::{Vec2, vec2};

use crate::config::AnimationConfig;
use crate::graph::{Edge, EdgeKind, Node};

use super::Orientation;

/// Cross-axis shift of a memo relative to its anchor, in sibling slots.
const MEMO_SLOT_OFFSET: f32 = 0.4;
/// Main-axis step between stacked memos of one anchor, in levels.
const MEMO_LEVEL_STEP: f32 = 0.35;

struct Placer<'a> {
    children: HashMap<&'a str, Vec<&'a str>>,
    memos: HashMap<&'a str, Vec<&'a str>>,
    visited: HashSet<&'a str>,
    next_slot: f32,
    slots: HashMap<&'a str, (f32, f32)>,
}

enum Visit<'a> {
    Enter(&'a str, usize),
    Leave(&'a str, usize),
}

impl<'a> Placer<'a> {
    /// Leaves take consecutive slots in depth-first order; a parent sits midway
    /// between its first and last child. Walks with an explicit stack, so chain
    /// depth is bounded by memory only.
    fn place(&mut self, root: &'a str) {
        let mut stack = vec![Visit::Enter(root, 0)];
        // Slots of the children placed so far, one entry per open parent.
        let mut child_slots: Vec<Vec<f32>> = Vec::new();

        while let Some(visit) = stack.pop() {
            match visit {
                Visit::Enter(id, level) => {
                    if !self.visited.insert(id) {
                        continue;
                    }
                    stack.push(Visit::Leave(id, level));
                    child_slots.push(Vec::new());
                    if let Some(children) = self.children.get(id) {
                        stack.extend(
                            children
                                .iter()
                                .rev()
                                .map(|&child| Visit::Enter(child, level + 1)),
                        );
                    }
                }
                Visit::Leave(id, level) => {
                    let placed = child_slots.pop().unwrap_or_default();
                    let slot = match (placed.first(), placed.last()) {
                        (Some(first), Some(last)) => (first + last) * 0.5,
                        _ => {
                            let slot = self.next_slot;
                            self.next_slot += 1.0;
                            slot
                        }
                    };
                    self.slots.insert(id, (slot, level as f32));
                    self.place_memos(id, slot, level);
                    if let Some(parent) = child_slots.last_mut() {
                        parent.push(slot);
                    }
                }
            }
        }
    }

    fn place_memos(&mut self, anchor: &'a str, slot: f32, level: usize) {
        let Some(memos) = self.memos.get(anchor) else {
            return;
        };
        for (stack, &memo) in memos.iter().enumerate() {
            if self.visited.insert(memo) {
                self.slots.insert(
                    memo,
                    (
                        slot + MEMO_SLOT_OFFSET,
                        level as f32 + MEMO_LEVEL_STEP * (stack + 1) as f32,
                    ),
                );
            }
        }
    }
}

/// Deterministic layered layout of `nodes`, using only the hierarchy and memo
/// edges among them. Every node gets exactly one coordinate, centered around
/// the origin along the sibling axis.
pub fn layered_layout(
    nodes: &[Node],
    edges: &[Edge],
    orientation: Orientation,
    config: &AnimationConfig,
) -> HashMap<String, Vec2> {
    let ids = nodes
        .iter()
        .map(|node| node.id.as_str())
        .collect::<HashSet<_>>();

    let mut children = HashMap::<&str, Vec<&str>>::new();
    let mut memos = HashMap::<&str, Vec<&str>>::new();
    let mut attached = HashSet::new();
    for edge in edges {
        let (source, target) = (edge.source.as_str(), edge.target.as_str());
        if source == target || !ids.contains(source) || !ids.contains(target) {
            continue;
        }
        let bucket = match edge.kind {
            EdgeKind::Hierarchy => &mut children,
            EdgeKind::Memo => &mut memos,
            EdgeKind::Connection => continue,
        };
        if attached.insert(target) {
            bucket.entry(source).or_default().push(target);
        }
    }

    let mut placer = Placer {
        children,
        memos,
        visited: HashSet::with_capacity(nodes.len()),
        next_slot: 0.0,
        slots: HashMap::with_capacity(nodes.len()),
    };
    for node in nodes {
        if !attached.contains(node.id.as_str()) {
            placer.place(&node.id);
        }
    }
    // Anything left over is only reachable through a cycle.
    for node in nodes {
        placer.place(&node.id);
    }

    let (min_slot, max_slot) = placer
        .slots
        .values()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(min, max), (slot, _)| {
            (min.min(*slot), max.max(*slot))
        });
    let center_slot = if min_slot.is_finite() {
        (min_slot + max_slot) * 0.5
    } else {
        0.0
    };

    placer
        .slots
        .into_iter()
        .map(|(id, (slot, level))| {
            let across = (slot - center_slot) * config.sibling_gap;
            let along = level * config.level_gap;
            let position = match orientation {
                Orientation::Vertical => vec2(across, along),
                Orientation::Horizontal => vec2(along, across),
            };
            (id.to_owned(), position)
        })
        .collect()
}
