use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TreeforceConfig {
    pub simulation: SimulationConfig,
    pub forces: ForceConfig,
    pub edge_repulsion: EdgeRepulsionConfig,
    pub placement: PlacementConfig,
    pub animation: AnimationConfig,
    pub persistence: PersistenceConfig,
    pub notices: NoticeConfig,
    /// Keep dragged nodes pinned after release instead of handing them back to the simulation.
    pub manual_layout: bool,
}

impl TreeforceConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub alpha_start: f32,
    pub alpha_min: f32,
    pub alpha_decay: f32,
    pub alpha_target: f32,
    /// Fraction of velocity removed every tick.
    pub velocity_decay: f32,
    /// Alpha below which a tick counts towards auto-stop.
    pub stop_threshold: f32,
    /// Consecutive ticks below `stop_threshold` before the loop halts.
    pub stop_ticks: u32,
    /// Alpha restored by structural edits.
    pub reheat_alpha: f32,
    /// Alpha target held while a drag gesture is active.
    pub drag_alpha_target: f32,
    pub max_speed: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            alpha_start: 1.0,
            alpha_min: 0.001,
            alpha_decay: 0.0228,
            alpha_target: 0.0,
            velocity_decay: 0.4,
            stop_threshold: 0.02,
            stop_ticks: 30,
            reheat_alpha: 0.6,
            drag_alpha_target: 0.3,
            max_speed: 60.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ForceConfig {
    pub link_distance_leaf: f32,
    pub link_distance_branch: f32,
    pub link_distance_memo: f32,
    pub link_distance_connection: f32,
    pub link_strength_hierarchy: f32,
    pub link_strength_memo: f32,
    pub link_strength_connection: f32,
    pub charge_strength: f32,
    /// Multiplier applied per depth level; below 1 makes deeper nodes repel less.
    pub charge_depth_falloff: f32,
    pub charge_min_strength: f32,
    pub charge_distance_max: f32,
    pub barnes_hut_theta: f32,
    pub collision_padding: f32,
    pub collision_strength: f32,
    pub center_strength: f32,
    pub radial_ring_spacing: f32,
    pub radial_strength: f32,
}

impl Default for ForceConfig {
    fn default() -> Self {
        Self {
            link_distance_leaf: 110.0,
            link_distance_branch: 170.0,
            link_distance_memo: 48.0,
            link_distance_connection: 220.0,
            link_strength_hierarchy: 0.7,
            link_strength_memo: 1.0,
            link_strength_connection: 0.05,
            charge_strength: -900.0,
            charge_depth_falloff: 0.72,
            charge_min_strength: -180.0,
            charge_distance_max: 900.0,
            barnes_hut_theta: 0.9,
            collision_padding: 8.0,
            collision_strength: 0.8,
            center_strength: 0.02,
            radial_ring_spacing: 180.0,
            radial_strength: 0.08,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeRepulsionConfig {
    pub enabled: bool,
    /// Positions along each edge (0 = source, 1 = target) where samples are taken.
    pub sample_ratios: [f32; 3],
    pub padding: f32,
    pub node_strength: f32,
    /// Share of a node push applied back to each endpoint of the edge.
    pub endpoint_counter: f32,
    pub edge_strength: f32,
    /// Minimum sample distance at which two edges still interact.
    pub edge_range: f32,
    pub shared_endpoint_damping: f32,
    pub intersection_boost: f32,
}

impl Default for EdgeRepulsionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_ratios: [0.33, 0.5, 0.67],
            padding: 12.0,
            node_strength: 0.6,
            endpoint_counter: 0.25,
            edge_strength: 0.35,
            edge_range: 60.0,
            shared_endpoint_damping: 0.3,
            intersection_boost: 3.0,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PlacementConfig {
    pub ring_spacing: f32,
    /// Maximum per-node jitter, as a fraction of the angular step.
    pub angular_jitter: f32,
    pub radial_jitter: f32,
    pub seed: Option<u64>,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            ring_spacing: 180.0,
            angular_jitter: 0.2,
            radial_jitter: 12.0,
            seed: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    pub duration_ms: u64,
    pub frame_interval_ms: u64,
    pub level_gap: f32,
    pub sibling_gap: f32,
}

impl AnimationConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            duration_ms: 600,
            frame_interval_ms: 16,
            level_gap: 160.0,
            sibling_gap: 90.0,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub debounce_ms: u64,
    pub directory: Option<PathBuf>,
}

impl PersistenceConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 800,
            directory: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct NoticeConfig {
    pub ttl_ms: u64,
}

impl NoticeConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl Default for NoticeConfig {
    fn default() -> Self {
        Self { ttl_ms: 4000 }
    }
}
