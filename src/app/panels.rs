use std::time::Instant;

use eframe::egui::{self, Align, Color32, Context, Layout, RichText, Ui};
use treeforce::graph::{EdgeKind, NodePatch};
use treeforce::{CommandOutcome, Edge, LayoutMode, Node, NodeKind, Orientation};

use super::ViewModel;

const LAYOUT_MODES: [LayoutMode; 3] = [
    LayoutMode::Force,
    LayoutMode::Tree(Orientation::Vertical),
    LayoutMode::Tree(Orientation::Horizontal),
];

impl ViewModel {
    pub(super) fn show(&mut self, ctx: &Context) {
        egui::TopBottomPanel::top("top_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("treeforce");
                ui.separator();
                ui.label(format!("tree: {}", self.tree_id));
                ui.separator();
                let graph = self.controller.graph();
                ui.label(format!(
                    "nodes: {}  edges: {}  visible: {}",
                    graph.node_count(),
                    graph.edge_count(),
                    self.controller.visible().len()
                ));
                ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                    if let Some(status) = &self.status {
                        ui.label(status.as_str());
                    }
                    if self.controller.is_active() {
                        ui.spinner();
                    }
                });
            });
        });

        egui::SidePanel::left("controls")
            .resizable(true)
            .default_width(280.0)
            .show(ctx, |ui| {
                egui::ScrollArea::vertical().show(ui, |ui| self.show_controls(ui));
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::NONE)
            .show(ctx, |ui| self.draw_graph(ui));
    }

    fn show_controls(&mut self, ui: &mut Ui) {
        ui.label("Search");
        ui.text_edit_singleline(&mut self.search)
            .on_hover_text("Fuzzy match on node label or id");
        ui.separator();

        ui.label("Layout");
        let current = self.controller.mode();
        for mode in LAYOUT_MODES {
            if ui.selectable_label(current == mode, mode.label()).clicked() && current != mode {
                self.controller.set_layout_mode(mode);
            }
        }

        let mut manual_layout = self.controller.config().manual_layout;
        if ui
            .checkbox(&mut manual_layout, "Keep dragged nodes pinned")
            .changed()
        {
            self.controller.set_manual_layout(manual_layout);
        }
        if ui.button("Unpin all").clicked()
            && self.controller.unpin_all() == CommandOutcome::Applied
        {
            self.status = Some("all nodes released".to_owned());
        }
        ui.separator();

        self.show_selection(ui);

        if let Some(notice) = self.controller.active_notice(Instant::now()) {
            ui.separator();
            ui.colored_label(Color32::from_rgb(240, 110, 100), notice.message.as_str());
        }
    }

    fn show_selection(&mut self, ui: &mut Ui) {
        let Some(selected) = self.selected.clone() else {
            ui.label(RichText::new("Click a node to edit it").weak());
            return;
        };
        let Some(node) = self.controller.graph().node(&selected) else {
            self.selected = None;
            return;
        };

        ui.label(RichText::new(format!("{} ({})", node.label, node.kind.label())).strong());
        ui.label(format!("id: {}  depth: {}", node.id, node.depth));
        let collapsed = self.controller.is_collapsed(&selected);
        let pinned = node.pin.is_some();
        ui.add_space(6.0);

        ui.text_edit_singleline(&mut self.new_label)
            .on_hover_text("Label for new or renamed nodes");
        ui.horizontal_wrapped(|ui| {
            if ui.button("Add child").clicked() {
                let id = self.fresh_id("q");
                let node = Node::new(id.clone(), NodeKind::Question).with_label(self.take_label(&id));
                self.run_add(node, Edge::hierarchy(selected.clone(), id));
            }
            if ui.button("Add memo").clicked() {
                let id = self.fresh_id("memo");
                let node = Node::new(id.clone(), NodeKind::Memo).with_label(self.take_label(&id));
                self.run_add(node, Edge::memo(selected.clone(), id));
            }
            if ui.button("Rename").clicked() && !self.new_label.trim().is_empty() {
                let patch = NodePatch {
                    label: Some(std::mem::take(&mut self.new_label).trim().to_owned()),
                    ..NodePatch::default()
                };
                self.controller.update_node(&selected, patch);
            }
        });

        ui.horizontal_wrapped(|ui| {
            let toggle = if collapsed { "Expand" } else { "Collapse" };
            if ui.button(toggle).clicked() {
                self.controller.toggle_collapse(&selected);
            }
            if pinned && ui.button("Unpin").clicked() {
                self.controller.unpin(&selected);
            }
            if ui.button("Remove").clicked() {
                let removed = self.controller.remove_node(&selected);
                self.status = Some(format!("removed {} node(s)", removed.len()));
                self.selected = None;
            }
        });

        ui.add_space(6.0);
        ui.collapsing("Link", |ui| {
            ui.horizontal(|ui| {
                ui.selectable_value(&mut self.link_kind, EdgeKind::Connection, "connection");
                ui.selectable_value(&mut self.link_kind, EdgeKind::Hierarchy, "hierarchy");
            });
            ui.horizontal(|ui| {
                ui.label("to");
                ui.text_edit_singleline(&mut self.link_target);
            });
            if ui.button("Link").clicked() {
                let target = self.link_target.trim().to_owned();
                let edge = Edge::new(selected.clone(), target, self.link_kind);
                match self.controller.add_edge(edge) {
                    Ok(CommandOutcome::Applied) => self.link_target.clear(),
                    Ok(CommandOutcome::Ignored) => {
                        self.status = Some("link ignored: unknown node or duplicate".to_owned());
                    }
                    Err(_) => {}
                }
            }
        });
    }

    fn take_label(&mut self, fallback: &str) -> String {
        let label = std::mem::take(&mut self.new_label);
        let label = label.trim();
        if label.is_empty() {
            fallback.to_owned()
        } else {
            label.to_owned()
        }
    }

    /// Rejections already surface as a notice, so only successes are reported here.
    fn run_add(&mut self, node: Node, link: Edge) {
        let id = node.id.clone();
        if let Ok(CommandOutcome::Applied) = self.controller.add_node(node, Some(link)) {
            self.selected = Some(id);
        }
    }
}
