use eframe::egui::{self, Pos2, Rect, Ui};

use super::ViewModel;
use super::render_utils::screen_to_world;

/// Screen-space footprint of one visible node.
#[derive(Clone)]
pub(super) struct NodeHit {
    pub(super) id: String,
    pub(super) position: Pos2,
    pub(super) radius: f32,
}

impl ViewModel {
    pub(super) fn handle_graph_zoom(&mut self, ui: &Ui, rect: Rect, response: &egui::Response) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.05, 6.0);
        self.pan = pointer - rect.center() - (world_before * self.zoom);
    }

    pub(super) fn handle_graph_pan(&mut self, response: &egui::Response) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }
    }

    pub(super) fn hovered_node<'a>(ui: &Ui, hits: &'a [NodeHit]) -> Option<&'a NodeHit> {
        let pointer = ui.input(|input| input.pointer.hover_pos())?;
        hits.iter()
            .filter_map(|hit| {
                let distance = hit.position.distance(pointer);
                (distance <= hit.radius).then_some((hit, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(hit, _)| hit)
    }

    /// Primary-button drags move nodes; pointer positions are handed to the
    /// controller in scene coordinates. With shift held the selected node follows.
    pub(super) fn handle_node_drag(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        hovered: Option<&str>,
    ) {
        if response.drag_started_by(egui::PointerButton::Primary)
            && let Some(id) = hovered
        {
            let bring_selection = ui.input(|input| input.modifiers.shift);
            let companions = self
                .selected
                .iter()
                .filter(|selected| bring_selection && selected.as_str() != id)
                .cloned()
                .collect::<Vec<_>>();
            if self.controller.begin_drag(id, &companions) == treeforce::CommandOutcome::Applied {
                self.dragging = Some(id.to_owned());
            }
        }

        if self.dragging.is_none() {
            return;
        }

        if response.dragged_by(egui::PointerButton::Primary)
            && let Some(pointer) = response.interact_pointer_pos()
        {
            let world = screen_to_world(rect, self.pan, self.zoom, pointer);
            self.controller.drag_to(world);
        }

        if response.drag_stopped() {
            self.controller.end_drag();
            self.dragging = None;
        }
    }
}
