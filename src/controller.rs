//! Single owner of the live layout state.
//!
//! [`LayoutController`] holds the graph arena, the collapse set, the current
//! engine (force simulation or tree animation) and the persistence handles.
//! Every mutation goes through the invariant layer before it is committed, and
//! positions advance only when the caller drives [`LayoutController::frame`].

use std::collections::HashSet;
use std::f32::consts::TAU;
use std::sync::Arc;
use std::time::{Duration, Instant};

use eframe::egui::{Vec2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, warn};

use crate::config::TreeforceConfig;
use crate::error::{GraphError, Result};
use crate::graph::invariants::{self, VisibleSubgraph};
use crate::graph::{Dataset, Edge, Graph, Node, NodePatch};
use crate::layout::{LayoutAnimator, Orientation, layered_layout};
use crate::physics::geometry::is_finite;
use crate::physics::{self, EdgeState, Frame, NodeState, Simulation};
use crate::positions::{self, LoadGate, PositionBackend, PositionMap, SaveQueue};

pub use crate::physics::DragRelease;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LayoutMode {
    #[default]
    Force,
    Tree(Orientation),
}

impl LayoutMode {
    pub fn label(self) -> &'static str {
        match self {
            Self::Force => "Force",
            Self::Tree(Orientation::Vertical) => "Tree (vertical)",
            Self::Tree(Orientation::Horizontal) => "Tree (horizontal)",
        }
    }
}

/// Result of a command that passed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandOutcome {
    Applied,
    /// Unknown ids or nothing to change.
    Ignored,
}

/// Human-readable rejection message that expires on its own.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidationNotice {
    pub error: GraphError,
    pub message: String,
    pub expires_at: Instant,
}

impl ValidationNotice {
    pub fn is_active(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// One-shot events for the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    /// The force simulation halted on its own.
    Converged { ticks: u64 },
    /// A tree layout animation reached its target.
    AnimationFinished,
    Rejected(GraphError),
}

struct Persistence {
    queue: SaveQueue,
    backend: Arc<dyn PositionBackend>,
    tree_id: String,
    user_id: String,
}

enum Engine {
    Idle,
    Force(Simulation),
    Tree,
}

pub struct LayoutController {
    config: TreeforceConfig,
    graph: Graph,
    collapsed: HashSet<String>,
    visible: VisibleSubgraph,
    mode: LayoutMode,
    engine: Engine,
    animator: LayoutAnimator,
    needs_rebuild: bool,
    next_alpha: f32,
    tree_ticks: u64,
    notice: Option<ValidationNotice>,
    notifications: Vec<Notification>,
    /// Ids of a gesture cut short by a rebuild, primary first.
    interrupted_drag: Vec<String>,
    load_gate: LoadGate,
    persistence: Option<Persistence>,
    rng: StdRng,
}

impl LayoutController {
    pub fn new(config: TreeforceConfig) -> Self {
        let rng = match config.placement.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            animator: LayoutAnimator::new(config.animation.duration()),
            next_alpha: config.simulation.alpha_start,
            config,
            graph: Graph::new(),
            collapsed: HashSet::new(),
            visible: VisibleSubgraph::default(),
            mode: LayoutMode::Force,
            engine: Engine::Idle,
            needs_rebuild: true,
            tree_ticks: 0,
            notice: None,
            notifications: Vec::new(),
            interrupted_drag: Vec::new(),
            load_gate: LoadGate::settled(),
            persistence: None,
            rng,
        }
    }

    /// Builds the graph from a dataset. Records with duplicate ids, edges with
    /// unknown endpoints and edges the invariants reject are dropped.
    pub fn from_dataset(dataset: Dataset, config: TreeforceConfig) -> Self {
        let mut controller = Self::new(config);
        let mut dropped = 0usize;

        for record in dataset.nodes {
            if controller.graph.contains(&record.id) {
                warn!(id = %record.id, "dropping node with duplicate id");
                dropped += 1;
                continue;
            }
            controller.graph.push_node(record.into_node());
        }

        for edge in dataset.edges {
            if !controller.graph.contains(&edge.source) || !controller.graph.contains(&edge.target)
            {
                warn!(source = %edge.source, target = %edge.target, "dropping edge to unknown node");
                dropped += 1;
                continue;
            }
            if controller.graph.has_edge(&edge) {
                continue;
            }
            if let Err(error) = invariants::validate_edge(&controller.graph, &edge, &[]) {
                warn!("dropping edge: {error}");
                dropped += 1;
                continue;
            }
            controller.graph.push_edge(edge);
        }

        controller.graph.refresh_depths();
        controller.refresh_visible();
        info!(
            tree_id = %dataset.tree_id,
            nodes = controller.graph.node_count(),
            edges = controller.graph.edge_count(),
            dropped,
            "loaded dataset"
        );
        controller
    }

    /// Attaches a position store. The load starts right away and gates the
    /// first frame; saves go through one debounced writer.
    pub fn with_persistence(
        mut self,
        backend: Arc<dyn PositionBackend>,
        tree_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let tree_id = tree_id.into();
        let user_id = user_id.into();
        let queue = SaveQueue::spawn(
            Arc::clone(&backend),
            tree_id.clone(),
            user_id.clone(),
            self.config.persistence.debounce(),
        );
        self.load_gate = LoadGate::new();
        self.load_gate
            .start(Arc::clone(&backend), tree_id.clone(), user_id.clone());
        self.persistence = Some(Persistence {
            queue,
            backend,
            tree_id,
            user_id,
        });
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn config(&self) -> &TreeforceConfig {
        &self.config
    }

    pub fn visible(&self) -> &VisibleSubgraph {
        &self.visible
    }

    pub fn mode(&self) -> LayoutMode {
        self.mode
    }

    pub fn is_collapsed(&self, id: &str) -> bool {
        self.collapsed.contains(id)
    }

    pub fn set_manual_layout(&mut self, manual_layout: bool) {
        self.config.manual_layout = manual_layout;
    }

    /// Whether anything still moves without further input.
    pub fn is_active(&self) -> bool {
        if self.needs_rebuild || !self.load_gate.is_settled() {
            return true;
        }
        match &self.engine {
            Engine::Idle => false,
            Engine::Force(simulation) => simulation.is_running(),
            Engine::Tree => self.animator.is_animating(),
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(&self.engine, Engine::Force(simulation) if simulation.is_dragging())
    }

    /// Current notice, if it has not expired at `now`.
    pub fn active_notice(&self, now: Instant) -> Option<&ValidationNotice> {
        self.notice.as_ref().filter(|notice| notice.is_active(now))
    }

    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Adds `node`, optionally linked by `link`, which must have the new node as
    /// one endpoint. Unpositioned nodes start next to the other endpoint.
    pub fn add_node(&mut self, mut node: Node, link: Option<Edge>) -> Result<CommandOutcome> {
        if self.graph.contains(&node.id) {
            return Err(self.reject(GraphError::DuplicateNode { id: node.id }));
        }

        let neighbour = match &link {
            Some(edge) => {
                let other = if edge.source == node.id {
                    &edge.target
                } else if edge.target == node.id {
                    &edge.source
                } else {
                    return Ok(CommandOutcome::Ignored);
                };
                if !self.graph.contains(other) {
                    return Ok(CommandOutcome::Ignored);
                }
                if let Err(error) = invariants::validate_edge(&self.graph, edge, &[]) {
                    return Err(self.reject(error));
                }
                Some(other.clone())
            }
            None => None,
        };

        if node.position.is_none_or(|position| !is_finite(position))
            && let Some(origin) = neighbour
                .as_deref()
                .and_then(|id| self.graph.node(id))
                .and_then(|neighbour| neighbour.position)
        {
            let angle = self.rng.gen_range(0.0..TAU);
            let distance = self.config.forces.link_distance_leaf * 0.5;
            node.position = Some(origin + vec2(angle.cos(), angle.sin()) * distance);
        }

        debug!(id = %node.id, kind = node.kind.label(), "adding node");
        self.graph.push_node(node);
        if let Some(edge) = link {
            self.graph.push_edge(edge);
        }
        self.structure_changed();
        Ok(CommandOutcome::Applied)
    }

    pub fn add_edge(&mut self, edge: Edge) -> Result<CommandOutcome> {
        self.add_edges(vec![edge])
    }

    /// Adds a batch atomically. Each edge is validated against the committed
    /// edges plus the ones accepted before it; one rejection rejects the batch.
    /// A batch naming an unknown node is ignored as a whole.
    pub fn add_edges(&mut self, edges: Vec<Edge>) -> Result<CommandOutcome> {
        if edges
            .iter()
            .any(|edge| !self.graph.contains(&edge.source) || !self.graph.contains(&edge.target))
        {
            return Ok(CommandOutcome::Ignored);
        }

        let mut pending: Vec<Edge> = Vec::with_capacity(edges.len());
        for edge in edges {
            if self.graph.has_edge(&edge) || pending.contains(&edge) {
                continue;
            }
            if let Err(error) = invariants::validate_edge(&self.graph, &edge, &pending) {
                return Err(self.reject(error));
            }
            pending.push(edge);
        }

        if pending.is_empty() {
            return Ok(CommandOutcome::Ignored);
        }
        debug!(count = pending.len(), "committing edges");
        for edge in pending {
            self.graph.push_edge(edge);
        }
        self.structure_changed();
        Ok(CommandOutcome::Applied)
    }

    pub fn update_node(&mut self, id: &str, patch: NodePatch) -> CommandOutcome {
        let Some(node) = self.graph.node_mut(id) else {
            return CommandOutcome::Ignored;
        };
        if !patch.apply(node) {
            return CommandOutcome::Ignored;
        }
        self.structure_changed();
        CommandOutcome::Applied
    }

    /// Removes `id` with all of its hierarchy descendants and returns the removed
    /// ids. Unknown ids remove nothing.
    pub fn remove_node(&mut self, id: &str) -> HashSet<String> {
        if !self.graph.contains(id) {
            return HashSet::new();
        }

        let removed = invariants::removal_set(self.graph.edges(), id);
        self.graph.remove_nodes(&removed);
        self.collapsed.retain(|collapsed| !removed.contains(collapsed));
        for removed_id in &removed {
            self.animator.forget(removed_id);
        }
        debug!(id, removed = removed.len(), "removed subtree");

        self.structure_changed();
        self.schedule_save();
        removed
    }

    pub fn toggle_collapse(&mut self, id: &str) -> CommandOutcome {
        if !self.graph.contains(id) {
            return CommandOutcome::Ignored;
        }
        if !self.collapsed.remove(id) {
            self.collapsed.insert(id.to_owned());
        }
        self.refresh_visible();
        self.request_rebuild();
        CommandOutcome::Applied
    }

    pub fn set_layout_mode(&mut self, mode: LayoutMode) -> CommandOutcome {
        if mode == self.mode {
            return CommandOutcome::Ignored;
        }
        debug!(mode = mode.label(), "switching layout mode");
        self.stop_engine();
        self.mode = mode;
        self.next_alpha = self.config.simulation.alpha_start;
        self.needs_rebuild = true;
        CommandOutcome::Applied
    }

    /// Starts dragging `id`; every id in `companions` keeps its offset to it.
    /// Only the force layout can be dragged.
    pub fn begin_drag(&mut self, id: &str, companions: &[String]) -> CommandOutcome {
        if self.mode != LayoutMode::Force || !self.visible.contains(id) {
            return CommandOutcome::Ignored;
        }
        self.ensure_engine();
        let Engine::Force(simulation) = &mut self.engine else {
            return CommandOutcome::Ignored;
        };
        if simulation.begin_drag(id, companions) {
            CommandOutcome::Applied
        } else {
            CommandOutcome::Ignored
        }
    }

    /// Pointer position in scene coordinates.
    pub fn drag_to(&mut self, pointer: Vec2) {
        if let Engine::Force(simulation) = &mut self.engine {
            simulation.drag_to(pointer);
        }
    }

    /// Ends the gesture. Nodes stay pinned in manual layout and are released otherwise.
    pub fn end_drag(&mut self) -> CommandOutcome {
        let release = if self.config.manual_layout {
            DragRelease::KeepPinned
        } else {
            DragRelease::Unpin
        };
        let Engine::Force(simulation) = &mut self.engine else {
            return CommandOutcome::Ignored;
        };
        let moved = simulation.end_drag(release);
        if moved.is_empty() {
            return CommandOutcome::Ignored;
        }
        let frame = simulation.frame(false);
        self.apply_frame(&frame);
        self.schedule_save();
        CommandOutcome::Applied
    }

    /// Releases the pin on `id` so the simulation moves it again.
    pub fn unpin(&mut self, id: &str) -> CommandOutcome {
        if self.graph.node(id).is_none_or(|node| node.pin.is_none()) {
            return CommandOutcome::Ignored;
        }
        self.release_pins(&[id.to_owned()]);
        CommandOutcome::Applied
    }

    /// Releases every pinned node.
    pub fn unpin_all(&mut self) -> CommandOutcome {
        let pinned = self
            .graph
            .nodes()
            .iter()
            .filter(|node| node.pin.is_some())
            .map(|node| node.id.clone())
            .collect::<Vec<_>>();
        if pinned.is_empty() {
            return CommandOutcome::Ignored;
        }
        self.release_pins(&pinned);
        CommandOutcome::Applied
    }

    fn release_pins(&mut self, ids: &[String]) {
        for id in ids {
            if let Some(node) = self.graph.node_mut(id) {
                node.pin = None;
            }
            if let Engine::Force(simulation) = &mut self.engine {
                simulation.set_pin(id, None);
            }
        }
        if let Engine::Force(simulation) = &mut self.engine {
            simulation.reheat(self.config.simulation.reheat_alpha);
        }
    }

    /// Advances the active engine by one frame. `dt` drives tree animations, and
    /// a zero `dt` steps them by the configured frame interval. The simulation
    /// takes exactly one tick per call. Returns `None` while the position load is
    /// pending and once everything came to rest.
    pub fn frame(&mut self, dt: Duration) -> Option<Frame> {
        if !self.load_gate.is_settled() {
            let loaded = self.load_gate.poll();
            if !self.load_gate.is_settled() {
                return None;
            }
            if let Some(loaded) = loaded {
                self.apply_loaded_positions(&loaded);
            }
        }

        self.ensure_engine();
        match &mut self.engine {
            Engine::Idle => None,
            Engine::Force(simulation) => {
                let frame = simulation.tick()?;
                self.apply_frame(&frame);
                if frame.converged {
                    info!(ticks = frame.tick, "layout settled");
                    self.notifications
                        .push(Notification::Converged { ticks: frame.tick });
                    self.schedule_save();
                }
                Some(frame)
            }
            Engine::Tree => {
                let step = if dt.is_zero() {
                    self.config.animation.frame_interval()
                } else {
                    dt
                };
                let animation = self.animator.advance(step)?;
                for (id, position) in &animation.positions {
                    if let Some(node) = self.graph.node_mut(id) {
                        node.position = Some(*position);
                        node.velocity = Vec2::ZERO;
                    }
                }
                self.tree_ticks += 1;
                if animation.finished {
                    debug!(ticks = self.tree_ticks, "tree animation finished");
                    self.notifications.push(Notification::AnimationFinished);
                    self.schedule_save();
                }
                Some(self.visible_frame(animation.finished))
            }
        }
    }

    /// Blocks until a pending position load settles, then applies it.
    pub fn wait_for_positions(&mut self) {
        if self.load_gate.is_settled() {
            return;
        }
        if let Some(loaded) = self.load_gate.wait() {
            self.apply_loaded_positions(&loaded);
        }
    }

    /// Writes any debounced save right away.
    pub fn flush_positions(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.queue.flush();
        }
    }

    /// Reads back what the position store currently holds.
    pub fn stored_positions(&self) -> Option<PositionMap> {
        let persistence = self.persistence.as_ref()?;
        match persistence
            .backend
            .load_positions(&persistence.tree_id, &persistence.user_id)
        {
            Ok(positions) => positions,
            Err(error) => {
                warn!("failed to read stored positions: {error:#}");
                None
            }
        }
    }

    fn reject(&mut self, error: GraphError) -> GraphError {
        debug!("rejected mutation: {error}");
        self.notice = Some(ValidationNotice {
            message: error.to_string(),
            error: error.clone(),
            expires_at: Instant::now() + self.config.notices.ttl(),
        });
        self.notifications.push(Notification::Rejected(error.clone()));
        error
    }

    fn structure_changed(&mut self) {
        self.graph.refresh_depths();
        self.refresh_visible();
        self.request_rebuild();
    }

    fn refresh_visible(&mut self) {
        self.visible = invariants::compute_visible_subgraph(&self.graph, None, &self.collapsed);
    }

    /// Schedules a rebuild that starts at least at the reheat alpha.
    fn request_rebuild(&mut self) {
        let reheat = self.config.simulation.reheat_alpha;
        self.next_alpha = match &self.engine {
            Engine::Force(simulation) if simulation.is_running() => simulation.alpha().max(reheat),
            _ if self.needs_rebuild => self.next_alpha.max(reheat),
            _ => reheat,
        };
        self.needs_rebuild = true;
    }

    fn stop_engine(&mut self) {
        if let Engine::Force(simulation) = &mut self.engine {
            let dragged = simulation.dragged_ids();
            if !dragged.is_empty() {
                self.interrupted_drag = dragged;
            }
            simulation.stop();
        }
        self.animator.cancel();
        self.engine = Engine::Idle;
    }

    fn ensure_engine(&mut self) {
        if !self.needs_rebuild || !self.load_gate.is_settled() {
            return;
        }
        self.needs_rebuild = false;
        self.stop_engine();

        // A gesture survives the rebuild when its node is still on screen;
        // otherwise it ends as if the pointer had been released.
        let interrupted = std::mem::take(&mut self.interrupted_drag);
        let resume_drag = self.mode == LayoutMode::Force
            && interrupted.first().is_some_and(|id| self.visible.contains(id));
        if !resume_drag && !interrupted.is_empty() {
            self.release_interrupted_drag(&interrupted);
        }
        if self.graph.is_empty() {
            return;
        }

        match self.mode {
            LayoutMode::Force => {
                let nodes = self.visible_nodes();
                let edges = self.visible_edges();
                let mut simulation =
                    physics::simulate(&nodes, &edges, &PositionMap::new(), &self.config);
                simulation.set_alpha(self.next_alpha);
                for node in &nodes {
                    if let Some(position) = node.position.filter(|position| is_finite(*position)) {
                        simulation.set_anchor(&node.id, Some(position));
                    }
                }
                if resume_drag && let Some((primary, companions)) = interrupted.split_first() {
                    simulation.begin_drag(primary, companions);
                }
                // Unpositioned nodes got fallback coordinates; keep them.
                let frame = simulation.frame(false);
                self.apply_frame(&frame);
                debug!(
                    nodes = nodes.len(),
                    edges = edges.len(),
                    alpha = self.next_alpha,
                    "started simulation"
                );
                self.engine = Engine::Force(simulation);
            }
            LayoutMode::Tree(orientation) => {
                let nodes = self.visible_nodes();
                let edges = self.visible_edges();
                let target = layered_layout(&nodes, &edges, orientation, &self.config.animation);
                self.animator.set_rendered(
                    nodes
                        .iter()
                        .filter_map(|node| Some((node.id.clone(), node.position?))),
                );
                self.animator.animate_to(target);
                self.engine = Engine::Tree;
            }
        }
    }

    fn release_interrupted_drag(&mut self, ids: &[String]) {
        debug!(count = ids.len(), "drag ended by a rebuild");
        if self.config.manual_layout {
            return;
        }
        for id in ids {
            if let Some(node) = self.graph.node_mut(id) {
                node.pin = None;
            }
        }
    }

    fn visible_nodes(&self) -> Vec<Node> {
        self.visible
            .node_ids
            .iter()
            .filter_map(|id| self.graph.node(id).cloned())
            .collect()
    }

    fn visible_edges(&self) -> Vec<Edge> {
        self.visible
            .edge_indices
            .iter()
            .filter_map(|&index| self.graph.edges().get(index).cloned())
            .collect()
    }

    fn visible_frame(&self, converged: bool) -> Frame {
        let position_of = |id: &str| {
            self.graph
                .node(id)
                .and_then(|node| node.position)
                .unwrap_or(Vec2::ZERO)
        };
        Frame {
            tick: self.tree_ticks,
            alpha: 0.0,
            converged,
            nodes: self
                .visible
                .node_ids
                .iter()
                .filter_map(|id| self.graph.node(id))
                .map(|node| NodeState {
                    id: node.id.clone(),
                    position: node.position.unwrap_or(Vec2::ZERO),
                    velocity: Vec2::ZERO,
                    pin: node.pin,
                })
                .collect(),
            edges: self
                .visible
                .edge_indices
                .iter()
                .filter_map(|&index| self.graph.edges().get(index))
                .map(|edge| EdgeState {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                    kind: edge.kind,
                    from: position_of(&edge.source),
                    to: position_of(&edge.target),
                })
                .collect(),
        }
    }

    fn apply_frame(&mut self, frame: &Frame) {
        for state in &frame.nodes {
            if let Some(node) = self.graph.node_mut(&state.id) {
                node.position = Some(state.position);
                node.velocity = state.velocity;
                node.pin = state.pin;
            }
        }
    }

    fn apply_loaded_positions(&mut self, loaded: &PositionMap) {
        let matched = positions::restore(loaded, self.graph.nodes_mut());
        info!(matched, stored = loaded.len(), "restored node positions");
        self.needs_rebuild = true;
    }

    fn schedule_save(&self) {
        if let Some(persistence) = &self.persistence {
            persistence
                .queue
                .schedule(positions::snapshot(self.graph.nodes()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, NodeKind};

    fn config() -> TreeforceConfig {
        let mut config = TreeforceConfig::default();
        config.placement.seed = Some(3);
        config
    }

    fn controller(edges: &[(&str, &str)]) -> LayoutController {
        let mut controller = LayoutController::new(config());
        let mut seen = HashSet::new();
        for (source, target) in edges {
            for id in [source, target] {
                if seen.insert(*id) {
                    let kind = if seen.len() == 1 {
                        NodeKind::Root
                    } else {
                        NodeKind::Question
                    };
                    controller.add_node(Node::new(*id, kind), None).unwrap();
                }
            }
        }
        controller
            .add_edges(
                edges
                    .iter()
                    .map(|(source, target)| Edge::hierarchy(*source, *target))
                    .collect(),
            )
            .unwrap();
        controller
    }

    fn settle(controller: &mut LayoutController) {
        let mut frames = 0;
        while controller.frame(Duration::from_millis(16)).is_some() {
            frames += 1;
            assert!(frames < 2_000, "layout did not settle");
        }
    }

    #[test]
    fn rejected_batch_leaves_graph_untouched_and_raises_notice() {
        let mut controller = controller(&[("a", "b"), ("b", "c")]);
        let before = controller.graph().edges().to_vec();

        let error = controller
            .add_edges(vec![Edge::connection("a", "c"), Edge::hierarchy("c", "a")])
            .unwrap_err();
        assert!(matches!(error, GraphError::Cycle { .. }));
        assert_eq!(controller.graph().edges(), before.as_slice());

        let now = Instant::now();
        let notice = controller.active_notice(now).unwrap();
        assert_eq!(notice.error, error);
        let later = now + controller.config().notices.ttl() + Duration::from_millis(1);
        assert!(controller.active_notice(later).is_none());
        assert_eq!(
            controller.take_notifications(),
            vec![Notification::Rejected(error)]
        );
        assert!(controller.take_notifications().is_empty());
    }

    #[test]
    fn edges_pending_in_one_batch_see_each_other() {
        let mut controller = controller(&[]);
        for id in ["x", "y"] {
            controller
                .add_node(Node::new(id, NodeKind::Question), None)
                .unwrap();
        }
        let result =
            controller.add_edges(vec![Edge::hierarchy("x", "y"), Edge::hierarchy("y", "x")]);
        assert!(matches!(result, Err(GraphError::Cycle { .. })));
        assert_eq!(controller.graph().edge_count(), 0);
    }

    #[test]
    fn unknown_ids_are_ignored() {
        let mut controller = controller(&[("a", "b")]);
        assert_eq!(
            controller.add_edge(Edge::connection("a", "ghost")),
            Ok(CommandOutcome::Ignored)
        );
        assert_eq!(controller.toggle_collapse("ghost"), CommandOutcome::Ignored);
        assert_eq!(
            controller.update_node("ghost", NodePatch::default()),
            CommandOutcome::Ignored
        );
        assert!(controller.remove_node("ghost").is_empty());
        assert_eq!(
            controller.add_node(Node::new("c", NodeKind::Question), Some(Edge::hierarchy("ghost", "c"))),
            Ok(CommandOutcome::Ignored)
        );
        assert!(!controller.graph().contains("c"));
    }

    #[test]
    fn duplicates_and_second_parents_are_rejected() {
        let mut controller = controller(&[("a", "b"), ("a", "c")]);
        assert_eq!(
            controller.add_node(Node::new("b", NodeKind::Question), None),
            Err(GraphError::DuplicateNode { id: "b".to_owned() })
        );
        assert_eq!(
            controller.add_edge(Edge::hierarchy("a", "b")),
            Ok(CommandOutcome::Ignored)
        );
        assert!(matches!(
            controller.add_edge(Edge::hierarchy("c", "b")),
            Err(GraphError::MultipleParents { .. })
        ));
        assert_eq!(
            controller.add_edge(Edge::connection("c", "b")),
            Ok(CommandOutcome::Applied)
        );
    }

    #[test]
    fn new_child_starts_next_to_its_parent() {
        let mut controller = controller(&[]);
        controller
            .add_node(
                Node::new("root", NodeKind::Root).with_position(vec2(40.0, -20.0)),
                None,
            )
            .unwrap();
        controller
            .add_node(
                Node::new("child", NodeKind::Question),
                Some(Edge::hierarchy("root", "child")),
            )
            .unwrap();

        let child = controller.graph().node("child").unwrap();
        let offset = child.position.unwrap() - vec2(40.0, -20.0);
        let expected = controller.config().forces.link_distance_leaf * 0.5;
        assert!((offset.length() - expected).abs() < 1e-3);
        assert_eq!(child.depth, 1);
    }

    #[test]
    fn collapse_and_removal_keep_collapse_set_consistent() {
        let mut controller = controller(&[("a", "b"), ("b", "d"), ("b", "e")]);
        assert_eq!(controller.toggle_collapse("b"), CommandOutcome::Applied);
        assert!(controller.visible().contains("b"));
        assert!(!controller.visible().contains("d"));

        let removed = controller.remove_node("b");
        assert_eq!(removed.len(), 3);
        assert!(!controller.is_collapsed("b"));
        assert!(
            controller
                .graph()
                .edges()
                .iter()
                .all(|edge| !removed.contains(&edge.source) && !removed.contains(&edge.target))
        );
    }

    #[test]
    fn force_mode_runs_until_converged() {
        let mut controller = controller(&[("a", "b"), ("a", "c"), ("c", "d")]);
        let mut frames = 0;
        while controller.frame(Duration::from_millis(16)).is_some() {
            frames += 1;
            assert!(frames < 2_000, "simulation did not settle");
        }
        assert!(!controller.is_active());
        assert!(
            controller
                .take_notifications()
                .iter()
                .any(|notification| matches!(notification, Notification::Converged { .. }))
        );
        assert!(
            controller
                .graph()
                .nodes()
                .iter()
                .all(|node| node.velocity == Vec2::ZERO && node.position.is_some())
        );
    }

    #[test]
    fn tree_mode_animates_to_layered_layout() {
        let mut controller = controller(&[("a", "b"), ("a", "c")]);
        controller.frame(Duration::from_millis(16));
        assert_eq!(
            controller.set_layout_mode(LayoutMode::Tree(Orientation::Vertical)),
            CommandOutcome::Applied
        );
        assert_eq!(
            controller.begin_drag("a", &[]),
            CommandOutcome::Ignored
        );

        let mut last = None;
        while let Some(frame) = controller.frame(Duration::from_millis(50)) {
            last = Some(frame);
        }
        let last = last.unwrap();
        assert!(last.converged);
        let gap = controller.config().animation.level_gap;
        assert_eq!(last.node("a").unwrap().position.y, 0.0);
        assert_eq!(last.node("b").unwrap().position.y, gap);
        assert_eq!(
            controller.take_notifications().last(),
            Some(&Notification::AnimationFinished)
        );
    }

    #[test]
    fn drag_release_follows_manual_layout_setting() {
        let mut controller = controller(&[("a", "b")]);
        controller.set_manual_layout(true);
        controller.frame(Duration::from_millis(16));

        assert_eq!(controller.begin_drag("b", &[]), CommandOutcome::Applied);
        controller.drag_to(vec2(300.0, 10.0));
        controller.frame(Duration::from_millis(16));
        assert_eq!(controller.end_drag(), CommandOutcome::Applied);
        assert_eq!(
            controller.graph().node("b").unwrap().pin,
            Some(vec2(300.0, 10.0))
        );

        assert_eq!(controller.unpin("a"), CommandOutcome::Ignored);
        assert_eq!(controller.unpin("b"), CommandOutcome::Applied);
        assert!(controller.graph().node("b").unwrap().pin.is_none());
        assert_eq!(controller.unpin_all(), CommandOutcome::Ignored);
        assert!(controller.graph().edges().iter().all(|edge| edge.kind == EdgeKind::Hierarchy));
    }

    #[test]
    fn unlinked_and_orphaned_nodes_keep_a_place_in_the_layout() {
        let mut controller = controller(&[("a", "b")]);
        controller
            .add_node(Node::new("loose", NodeKind::Question), None)
            .unwrap();
        controller
            .add_node(Node::new("note", NodeKind::Memo), Some(Edge::memo("b", "note")))
            .unwrap();
        controller.remove_node("b");
        settle(&mut controller);

        for id in ["a", "loose", "note"] {
            assert!(controller.visible().contains(id), "{id} is hidden");
            assert!(controller.graph().node(id).unwrap().position.is_some());
        }
        assert_eq!(controller.begin_drag("note", &[]), CommandOutcome::Applied);
    }

    #[test]
    fn drag_carries_over_a_structural_edit() {
        let mut controller = controller(&[("a", "b")]);
        controller.frame(Duration::from_millis(16));
        assert_eq!(controller.begin_drag("b", &[]), CommandOutcome::Applied);
        controller.drag_to(vec2(120.0, 80.0));
        controller.frame(Duration::from_millis(16));

        controller
            .add_node(Node::new("c", NodeKind::Question), Some(Edge::hierarchy("a", "c")))
            .unwrap();
        let frame = controller.frame(Duration::from_millis(16)).unwrap();
        assert!(controller.is_dragging());
        assert_eq!(frame.node("b").unwrap().position, vec2(120.0, 80.0));

        controller.drag_to(vec2(150.0, 90.0));
        let frame = controller.frame(Duration::from_millis(16)).unwrap();
        assert_eq!(frame.node("b").unwrap().position, vec2(150.0, 90.0));
        assert_eq!(controller.end_drag(), CommandOutcome::Applied);
        assert!(controller.graph().node("b").unwrap().pin.is_none());

        for _ in 0..5 {
            controller.frame(Duration::from_millis(16));
        }
        assert!(controller.graph().node("b").unwrap().pin.is_none());
    }

    #[test]
    fn leaving_force_mode_mid_drag_releases_the_node() {
        let mut controller = controller(&[("a", "b")]);
        controller.frame(Duration::from_millis(16));
        controller.begin_drag("b", &[]);
        controller.drag_to(vec2(-40.0, 60.0));
        controller.frame(Duration::from_millis(16));
        assert!(controller.graph().node("b").unwrap().pin.is_some());

        controller.set_layout_mode(LayoutMode::Tree(Orientation::Horizontal));
        controller.frame(Duration::from_millis(16));
        assert!(!controller.is_dragging());
        assert!(controller.graph().node("b").unwrap().pin.is_none());
        assert_eq!(controller.end_drag(), CommandOutcome::Ignored);
    }

    #[test]
    fn rebuilt_simulation_centers_nodes_on_their_last_position() {
        let mut controller = controller(&[("a", "b"), ("a", "c")]);
        settle(&mut controller);
        let before = controller.graph().node("b").unwrap().position.unwrap();

        controller.toggle_collapse("c");
        controller.frame(Duration::from_millis(16)).unwrap();
        let Engine::Force(simulation) = &controller.engine else {
            panic!("force engine was not rebuilt");
        };
        assert_eq!(simulation.anchor_of("b"), Some(before));
    }

    #[test]
    fn zero_dt_steps_tree_animation_by_frame_interval() {
        let mut controller = controller(&[("a", "b")]);
        controller.frame(Duration::from_millis(16));
        controller.set_layout_mode(LayoutMode::Tree(Orientation::Vertical));

        let mut frames = 0;
        while controller.frame(Duration::ZERO).is_some() {
            frames += 1;
        }
        let animation = controller.config().animation;
        assert_eq!(frames, animation.duration_ms.div_ceil(animation.frame_interval_ms));
    }
}
