mod edge_repulsion;
mod forces;
pub mod geometry;
mod quadtree;

use std::collections::{HashMap, HashSet};
use std::f32::consts::TAU;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use eframe::egui::{Vec2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::config::{EdgeRepulsionConfig, ForceConfig, SimulationConfig, TreeforceConfig};
use crate::graph::{Edge, EdgeKind, Node, NodeKind};
use crate::positions::{self, Position, PositionMap};

use forces::{ChargeParams, CollisionParams};
use geometry::is_finite;
use quadtree::{CellId, Quadtree};

/// Distance a body is moved off another one sitting on exactly the same point.
const JIGGLE: f32 = 0.01;

pub(crate) struct Body {
    pub(crate) id: String,
    pub(crate) depth: usize,
    pub(crate) radius: f32,
    pub(crate) charge: f32,
    pub(crate) is_memo: bool,
    pub(crate) position: Vec2,
    pub(crate) velocity: Vec2,
    pub(crate) pin: Option<Vec2>,
    pub(crate) anchor: Option<Vec2>,
}

pub(crate) struct Link {
    pub(crate) source: usize,
    pub(crate) target: usize,
    pub(crate) kind: EdgeKind,
    pub(crate) distance: f32,
    pub(crate) strength: f32,
    pub(crate) bias: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NodeState {
    pub id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub pin: Option<Vec2>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct EdgeState {
    pub source: String,
    pub target: String,
    pub kind: EdgeKind,
    pub from: Vec2,
    pub to: Vec2,
}

/// Positions emitted once per frame.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    pub tick: u64,
    pub alpha: f32,
    /// Set on the last frame a simulation emits before halting on its own.
    pub converged: bool,
    pub nodes: Vec<NodeState>,
    pub edges: Vec<EdgeState>,
}

impl Frame {
    pub fn positions(&self) -> PositionMap {
        self.nodes
            .iter()
            .filter(|node| is_finite(node.position))
            .map(|node| (node.id.clone(), Position::from(node.position)))
            .collect()
    }

    pub fn node(&self, id: &str) -> Option<&NodeState> {
        self.nodes.iter().find(|node| node.id == id)
    }
}

/// Shared stop flag. Once set, the owning simulation never emits again.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What happens to the dragged nodes when a gesture ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragRelease {
    /// Hand the nodes back to the simulation.
    Unpin,
    /// Leave them fixed where they were dropped.
    KeepPinned,
}

struct DragGesture {
    primary: usize,
    companions: Vec<(usize, Vec2)>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    Running,
    Halted,
}

#[derive(Default)]
struct PhysicsScratch {
    impulses: Vec<Vec2>,
    positions: Vec<Vec2>,
    charges: Vec<f32>,
    radii: Vec<f32>,
    walk: Vec<CellId>,
}

/// Force-directed simulation over an index-addressed copy of the visible graph.
///
/// Each call to [`Simulation::tick`] advances one step and returns the new
/// frame; the simulation is also an [`Iterator`] over its frames. It halts on
/// its own once alpha stayed below the stop threshold for long enough, and
/// never emits again after [`Simulation::stop`].
pub struct Simulation {
    bodies: Vec<Body>,
    links: Vec<Link>,
    index_by_id: HashMap<String, usize>,
    sim: SimulationConfig,
    forces: ForceConfig,
    edge_repulsion: EdgeRepulsionConfig,
    alpha: f32,
    alpha_target: f32,
    ticks: u64,
    calm_ticks: u32,
    state: RunState,
    cancel: CancelToken,
    drag: Option<DragGesture>,
    center: Vec2,
    root_index: Option<usize>,
    rng: StdRng,
    scratch: PhysicsScratch,
}

/// Builds a simulation over `nodes` and `edges`.
///
/// Known coordinates from `initial_positions` are applied first, then every
/// node still lacking a position gets a fallback ring placement. Edges whose
/// endpoints are not in `nodes` are ignored.
pub fn simulate(
    nodes: &[Node],
    edges: &[Edge],
    initial_positions: &PositionMap,
    config: &TreeforceConfig,
) -> Simulation {
    let mut nodes = nodes.to_vec();
    positions::restore(initial_positions, &mut nodes);
    positions::assign_fallback_positions(&mut nodes, &config.placement, &mut seeded_rng(config));
    Simulation::new(&nodes, edges, config)
}

fn seeded_rng(config: &TreeforceConfig) -> StdRng {
    match config.placement.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl Simulation {
    /// Nodes are expected to carry positions already; unpositioned ones start at the origin.
    pub fn new(nodes: &[Node], edges: &[Edge], config: &TreeforceConfig) -> Self {
        let mut index_by_id = HashMap::with_capacity(nodes.len());
        for (index, node) in nodes.iter().enumerate() {
            index_by_id.insert(node.id.clone(), index);
        }

        let parents_with_children = edges
            .iter()
            .filter(|edge| edge.kind.is_structural() && index_by_id.contains_key(&edge.target))
            .map(|edge| edge.source.as_str())
            .collect::<HashSet<_>>();

        let forces = config.forces;
        let bodies = nodes
            .iter()
            .map(|node| {
                let charge = (forces.charge_strength
                    * forces.charge_depth_falloff.powi(node.depth as i32))
                .min(forces.charge_min_strength);
                let position = node
                    .position
                    .filter(|position| is_finite(*position))
                    .unwrap_or(Vec2::ZERO);
                let velocity = if is_finite(node.velocity) {
                    node.velocity
                } else {
                    Vec2::ZERO
                };
                Body {
                    id: node.id.clone(),
                    depth: node.depth,
                    radius: node.radius(),
                    charge,
                    is_memo: node.kind == NodeKind::Memo,
                    position,
                    velocity,
                    pin: node.pin.filter(|pin| is_finite(*pin)),
                    anchor: None,
                }
            })
            .collect::<Vec<_>>();

        let mut degree = vec![0usize; bodies.len()];
        let mut resolved = Vec::with_capacity(edges.len());
        for edge in edges {
            let (Some(&source), Some(&target)) =
                (index_by_id.get(&edge.source), index_by_id.get(&edge.target))
            else {
                continue;
            };
            if source == target {
                continue;
            }
            degree[source] += 1;
            degree[target] += 1;
            resolved.push((source, target, edge));
        }

        let links = resolved
            .into_iter()
            .map(|(source, target, edge)| {
                let target_node = &nodes[target];
                let (distance, base_strength) =
                    if edge.kind == EdgeKind::Memo || target_node.kind == NodeKind::Memo {
                        (forces.link_distance_memo, forces.link_strength_memo)
                    } else if edge.kind == EdgeKind::Connection {
                        (
                            forces.link_distance_connection,
                            forces.link_strength_connection,
                        )
                    } else if parents_with_children.contains(target_node.id.as_str()) {
                        (forces.link_distance_branch, forces.link_strength_hierarchy)
                    } else {
                        (forces.link_distance_leaf, forces.link_strength_hierarchy)
                    };
                let weight = if edge.weight.is_finite() {
                    edge.weight.clamp(0.1, 4.0)
                } else {
                    1.0
                };
                Link {
                    source,
                    target,
                    kind: edge.kind,
                    distance: distance + (bodies[source].radius + bodies[target].radius) * 0.5,
                    strength: (base_strength * weight).clamp(0.0, 1.0),
                    bias: degree[source] as f32 / (degree[source] + degree[target]) as f32,
                }
            })
            .collect::<Vec<_>>();

        let root_index = nodes
            .iter()
            .position(|node| node.kind == NodeKind::Root && node.depth == 0)
            .or_else(|| {
                nodes
                    .iter()
                    .position(|node| node.depth == 0 && node.kind != NodeKind::Memo)
            });
        let center = root_index
            .map(|index| bodies[index].position)
            .unwrap_or(Vec2::ZERO);

        Self {
            bodies,
            links,
            index_by_id,
            sim: config.simulation,
            forces,
            edge_repulsion: config.edge_repulsion.clone(),
            alpha: config.simulation.alpha_start,
            alpha_target: config.simulation.alpha_target,
            ticks: 0,
            calm_ticks: 0,
            state: RunState::Running,
            cancel: CancelToken::default(),
            drag: None,
            center,
            root_index,
            rng: seeded_rng(config),
            scratch: PhysicsScratch::default(),
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running && !self.cancel.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Stops the simulation for good. Safe to call any number of times.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.drag = None;
    }

    /// Raises alpha to at least `alpha` and resumes a halted simulation.
    pub fn reheat(&mut self, alpha: f32) {
        self.set_alpha(self.alpha.max(alpha));
    }

    /// Sets alpha outright and resumes a halted simulation.
    pub fn set_alpha(&mut self, alpha: f32) {
        if self.cancel.is_cancelled() || !alpha.is_finite() {
            return;
        }
        self.alpha = alpha.max(0.0);
        self.calm_ticks = 0;
        self.state = RunState::Running;
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index_by_id.contains_key(id)
    }

    pub fn position_of(&self, id: &str) -> Option<Vec2> {
        self.index_by_id
            .get(id)
            .map(|&index| self.bodies[index].position)
    }

    /// Fixes (`Some`) or frees (`None`) a node outside of a drag gesture.
    pub fn set_pin(&mut self, id: &str, pin: Option<Vec2>) -> bool {
        let Some(&index) = self.index_by_id.get(id) else {
            return false;
        };
        if pin.is_some_and(|pin| !is_finite(pin)) {
            return false;
        }
        let body = &mut self.bodies[index];
        body.pin = pin;
        if let Some(pin) = pin {
            body.position = pin;
            body.velocity = Vec2::ZERO;
        }
        true
    }

    /// Anchors a node's centering spring to `anchor` instead of the layout center.
    pub fn set_anchor(&mut self, id: &str, anchor: Option<Vec2>) {
        if let Some(&index) = self.index_by_id.get(id) {
            self.bodies[index].anchor = anchor.filter(|anchor| is_finite(*anchor));
        }
    }

    pub fn anchor_of(&self, id: &str) -> Option<Vec2> {
        self.index_by_id
            .get(id)
            .and_then(|&index| self.bodies[index].anchor)
    }

    /// Starts a drag on `primary`. Every id in `companions` follows at its current
    /// offset from the primary node. Unknown ids are skipped.
    pub fn begin_drag(&mut self, primary: &str, companions: &[String]) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        let Some(&primary_index) = self.index_by_id.get(primary) else {
            return false;
        };

        let origin = self.bodies[primary_index].position;
        let companions = companions
            .iter()
            .filter_map(|id| self.index_by_id.get(id).copied())
            .filter(|&index| index != primary_index)
            .map(|index| (index, self.bodies[index].position - origin))
            .collect::<Vec<_>>();

        for index in std::iter::once(primary_index).chain(companions.iter().map(|(index, _)| *index))
        {
            let body = &mut self.bodies[index];
            body.pin = Some(body.position);
            body.velocity = Vec2::ZERO;
        }

        self.drag = Some(DragGesture {
            primary: primary_index,
            companions,
        });
        self.alpha_target = self.sim.drag_alpha_target;
        self.reheat(self.sim.drag_alpha_target);
        true
    }

    /// Moves the dragged nodes so that the primary one sits at `pointer`.
    pub fn drag_to(&mut self, pointer: Vec2) {
        if !is_finite(pointer) {
            return;
        }
        let Some(drag) = &self.drag else {
            return;
        };
        self.bodies[drag.primary].pin = Some(pointer);
        for &(index, offset) in &drag.companions {
            self.bodies[index].pin = Some(pointer + offset);
        }
    }

    /// Ends the gesture and returns the ids it moved.
    pub fn end_drag(&mut self, release: DragRelease) -> Vec<String> {
        let Some(drag) = self.drag.take() else {
            return Vec::new();
        };
        self.alpha_target = self.sim.alpha_target;

        let mut moved = Vec::with_capacity(drag.companions.len() + 1);
        for index in std::iter::once(drag.primary).chain(drag.companions.iter().map(|(index, _)| *index))
        {
            let body = &mut self.bodies[index];
            if let Some(pin) = body.pin {
                body.position = pin;
                body.velocity = Vec2::ZERO;
            }
            if release == DragRelease::Unpin {
                body.pin = None;
            }
            moved.push(body.id.clone());
        }
        moved
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    /// Ids held by the current gesture, primary first. Empty when not dragging.
    pub fn dragged_ids(&self) -> Vec<String> {
        let Some(drag) = &self.drag else {
            return Vec::new();
        };
        std::iter::once(drag.primary)
            .chain(drag.companions.iter().map(|(index, _)| *index))
            .map(|index| self.bodies[index].id.clone())
            .collect()
    }

    /// Advances one step. Returns `None` once halted or cancelled.
    pub fn tick(&mut self) -> Option<Frame> {
        if self.cancel.is_cancelled() || self.state == RunState::Halted {
            return None;
        }

        self.alpha += (self.alpha_target - self.alpha) * self.sim.alpha_decay;
        self.separate_coincident();
        self.apply_forces();
        self.integrate();
        self.ticks += 1;

        let converged = self.update_auto_stop();
        Some(self.frame(converged))
    }

    /// Current state without advancing.
    pub fn frame(&self, converged: bool) -> Frame {
        Frame {
            tick: self.ticks,
            alpha: self.alpha,
            converged,
            nodes: self
                .bodies
                .iter()
                .map(|body| NodeState {
                    id: body.id.clone(),
                    position: body.position,
                    velocity: body.velocity,
                    pin: body.pin,
                })
                .collect(),
            edges: self
                .links
                .iter()
                .map(|link| EdgeState {
                    source: self.bodies[link.source].id.clone(),
                    target: self.bodies[link.target].id.clone(),
                    kind: link.kind,
                    from: self.bodies[link.source].position,
                    to: self.bodies[link.target].position,
                })
                .collect(),
        }
    }

    /// Moves free bodies off any body already sitting on exactly the same
    /// point, in a seeded random direction. No force can tell such a pair apart.
    fn separate_coincident(&mut self) {
        let mut occupied = HashSet::with_capacity(self.bodies.len());
        // Pinned bodies claim their spot first so that only free ones move.
        let (pinned, free): (Vec<usize>, Vec<usize>) =
            (0..self.bodies.len()).partition(|&index| self.bodies[index].pin.is_some());
        for index in pinned.into_iter().chain(free) {
            let position = self.bodies[index].position;
            if !is_finite(position) {
                continue;
            }
            if occupied.insert((position.x.to_bits(), position.y.to_bits()))
                || self.bodies[index].pin.is_some()
            {
                continue;
            }
            let angle = self.rng.gen_range(0.0..TAU);
            self.bodies[index].position += vec2(angle.cos(), angle.sin()) * JIGGLE;
        }
    }

    fn apply_forces(&mut self) {
        let alpha = self.alpha;
        let forces = self.forces;
        let node_count = self.bodies.len();

        forces::apply_links(&mut self.bodies, &self.links, alpha);

        let scratch = &mut self.scratch;
        scratch.impulses.clear();
        scratch.impulses.resize(node_count, Vec2::ZERO);
        scratch.positions.clear();
        scratch.charges.clear();
        scratch.radii.clear();
        let mut max_radius = 0.0_f32;
        for body in &self.bodies {
            scratch.positions.push(body.position);
            scratch.charges.push(body.charge);
            scratch.radii.push(body.radius);
            max_radius = max_radius.max(body.radius);
        }

        if node_count > 1
            && let Some(quadtree) = Quadtree::build(&scratch.positions, &scratch.charges)
        {
            let charge = ChargeParams {
                alpha,
                theta: forces.barnes_hut_theta,
                distance_max_sq: forces.charge_distance_max * forces.charge_distance_max,
            };
            for (index, impulse) in scratch.impulses.iter_mut().enumerate() {
                if !is_finite(scratch.positions[index]) {
                    continue;
                }
                forces::accumulate_charge_for_body(
                    &quadtree,
                    index,
                    &scratch.positions,
                    &scratch.charges,
                    charge,
                    &mut scratch.walk,
                    impulse,
                );
            }

            let max_collision_distance = max_radius * 2.0 + forces.collision_padding;
            forces::accumulate_collisions(
                &quadtree,
                &scratch.positions,
                &scratch.radii,
                CollisionParams {
                    strength: forces.collision_strength,
                    padding: forces.collision_padding,
                    max_collision_distance_sq: max_collision_distance * max_collision_distance,
                },
                &mut scratch.impulses,
            );
        }

        edge_repulsion::accumulate(
            &self.bodies,
            &self.links,
            &self.edge_repulsion,
            alpha,
            &mut scratch.impulses,
        );

        for (body, impulse) in self.bodies.iter_mut().zip(&scratch.impulses) {
            if is_finite(*impulse) {
                body.velocity += *impulse;
            }
        }

        let center = self.center;
        forces::apply_centering(&mut self.bodies, center, forces.center_strength, alpha);
        let origin = self
            .root_index
            .map(|index| self.bodies[index].position)
            .filter(|origin| is_finite(*origin))
            .unwrap_or(center);
        forces::apply_radial(
            &mut self.bodies,
            origin,
            forces.radial_ring_spacing,
            forces.radial_strength,
            alpha,
        );
    }

    fn integrate(&mut self) {
        let retain = (1.0 - self.sim.velocity_decay).clamp(0.0, 1.0);
        let max_speed = self.sim.max_speed.max(0.0);
        for body in &mut self.bodies {
            if let Some(pin) = body.pin {
                body.position = pin;
                body.velocity = Vec2::ZERO;
                continue;
            }

            let mut velocity = body.velocity * retain;
            if !is_finite(velocity) {
                velocity = Vec2::ZERO;
            }
            let speed = velocity.length();
            if speed > max_speed && speed > 0.0 {
                velocity *= max_speed / speed;
            }

            let next = body.position + velocity;
            if is_finite(next) {
                body.position = next;
                body.velocity = velocity;
            } else {
                body.velocity = Vec2::ZERO;
            }
        }
    }

    fn update_auto_stop(&mut self) -> bool {
        if self.drag.is_some() {
            self.calm_ticks = 0;
            return false;
        }

        if self.alpha < self.sim.stop_threshold {
            self.calm_ticks = self.calm_ticks.saturating_add(1);
        } else {
            self.calm_ticks = 0;
        }

        if self.calm_ticks < self.sim.stop_ticks.max(1) && self.alpha >= self.sim.alpha_min {
            return false;
        }

        for body in &mut self.bodies {
            body.velocity = Vec2::ZERO;
        }
        self.state = RunState::Halted;
        debug!(ticks = self.ticks, alpha = self.alpha, "simulation converged");
        true
    }
}

impl Iterator for Simulation {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        self.tick()
    }
}
