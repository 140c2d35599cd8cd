mod persist;

use std::collections::{BTreeMap, HashMap};
use std::f32::consts::TAU;

use eframe::egui::{Vec2, vec2};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::PlacementConfig;
use crate::graph::Node;

pub use persist::{JsonFileBackend, LoadGate, PositionBackend, SaveQueue};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<Vec2> for Position {
    fn from(value: Vec2) -> Self {
        Self {
            x: value.x,
            y: value.y,
        }
    }
}

impl From<Position> for Vec2 {
    fn from(value: Position) -> Self {
        vec2(value.x, value.y)
    }
}

pub type PositionMap = HashMap<String, Position>;

fn is_finite(point: Vec2) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Current coordinates of every node that has a finite position.
pub fn snapshot(nodes: &[Node]) -> PositionMap {
    nodes
        .iter()
        .filter_map(|node| {
            let position = node.position.filter(|position| is_finite(*position))?;
            Some((node.id.clone(), Position::from(position)))
        })
        .collect()
}

/// Applies known coordinates and zeroes velocity for matched nodes. Unmatched
/// nodes keep their coordinates when finite and become unpositioned otherwise.
/// Returns how many nodes were matched.
pub fn restore(map: &PositionMap, nodes: &mut [Node]) -> usize {
    let mut matched = 0usize;
    for node in nodes {
        match map.get(&node.id).copied().filter(|position| position.is_finite()) {
            Some(position) => {
                node.position = Some(position.into());
                node.velocity = Vec2::ZERO;
                matched += 1;
            }
            None => {
                if node.position.is_some_and(|position| !is_finite(position)) {
                    node.position = None;
                }
            }
        }
    }
    matched
}

/// Places every unpositioned node on a ring whose radius grows with its depth.
///
/// Nodes sharing a depth are spread at even angular steps from a random global
/// offset, each with a small jitter kept well under half a step so that no two
/// angles on a ring coincide. Positioned nodes are left untouched. Returns the
/// number of nodes placed.
pub fn assign_fallback_positions(
    nodes: &mut [Node],
    config: &PlacementConfig,
    rng: &mut impl Rng,
) -> usize {
    let mut by_depth: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for (index, node) in nodes.iter().enumerate() {
        if node.position.is_none() {
            by_depth.entry(node.depth).or_default().push(index);
        }
    }

    let global_offset = rng.gen_range(0.0..TAU);
    let jitter_bound = config.angular_jitter.clamp(0.0, 0.45) * 0.5;
    let radial_jitter = config.radial_jitter.max(0.0);
    let mut placed = 0usize;

    for (depth, indices) in by_depth {
        let count = indices.len();
        let ring_radius = if depth == 0 && count == 1 {
            0.0
        } else {
            (depth as f32).max(0.5) * config.ring_spacing
        };
        let step = TAU / count as f32;

        for (slot, index) in indices.into_iter().enumerate() {
            let jitter = if jitter_bound > 0.0 {
                rng.gen_range(-jitter_bound..=jitter_bound) * step
            } else {
                0.0
            };
            let angle = global_offset + (slot as f32 * step) + jitter;
            let radius = if ring_radius > 0.0 && radial_jitter > 0.0 {
                (ring_radius + rng.gen_range(-radial_jitter..=radial_jitter)).max(1.0)
            } else {
                ring_radius
            };

            let node = &mut nodes[index];
            node.position = Some(vec2(angle.cos(), angle.sin()) * radius);
            node.velocity = Vec2::ZERO;
            placed += 1;
        }
    }

    placed
}
