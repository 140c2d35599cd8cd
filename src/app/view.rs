use std::collections::HashSet;
use std::time::Instant;

use eframe::egui::{self, Align2, Color32, FontId, Sense, Stroke, Ui, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use treeforce::graph::{NodeKind, NodeShape};

use super::ViewModel;
use super::interaction::NodeHit;
use super::render_utils::{
    blend_color, circle_visible, dim_color, draw_background, draw_node_shape, edge_stroke,
    edge_visible, kind_color, world_to_screen,
};

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

struct DrawNode {
    hit: NodeHit,
    kind: NodeKind,
    shape: NodeShape,
    label: String,
    collapsed: bool,
    pinned: bool,
}

impl ViewModel {
    fn search_matches(&self) -> HashSet<String> {
        let query = self.search.trim();
        if query.is_empty() {
            return HashSet::new();
        }
        let matcher = SkimMatcherV2::default();
        self.controller
            .graph()
            .nodes()
            .iter()
            .filter(|node| {
                fuzzy_match_score(&matcher, &node.label, query).is_some()
                    || fuzzy_match_score(&matcher, &node.id, query).is_some()
            })
            .map(|node| node.id.clone())
            .collect()
    }

    fn collect_draw_nodes(&self, rect: egui::Rect) -> Vec<DrawNode> {
        let graph = self.controller.graph();
        self.controller
            .visible()
            .node_ids
            .iter()
            .filter_map(|id| graph.node(id))
            .filter_map(|node| {
                let position = world_to_screen(rect, self.pan, self.zoom, node.position?);
                let radius = (node.radius() * self.zoom).clamp(2.5, 80.0);
                Some(DrawNode {
                    hit: NodeHit {
                        id: node.id.clone(),
                        position,
                        radius,
                    },
                    kind: node.kind,
                    shape: node.shape,
                    label: if node.label.is_empty() {
                        node.id.clone()
                    } else {
                        node.label.clone()
                    },
                    collapsed: self.controller.is_collapsed(&node.id),
                    pinned: node.pin.is_some(),
                })
            })
            .collect()
    }

    pub(super) fn draw_graph(&mut self, ui: &mut Ui) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_pan(&response);

        let nodes = self.collect_draw_nodes(rect);
        let hits = nodes.iter().map(|node| node.hit.clone()).collect::<Vec<_>>();
        let hovered = Self::hovered_node(ui, &hits).map(|hit| hit.id.clone());
        if hovered.is_some() {
            ui.output_mut(|output| {
                output.cursor_icon = egui::CursorIcon::PointingHand;
            });
        }

        self.handle_node_drag(ui, rect, &response, hovered.as_deref());
        if response.double_clicked_by(egui::PointerButton::Primary)
            && let Some(id) = hovered.as_deref()
        {
            self.controller.toggle_collapse(id);
        } else if response.clicked_by(egui::PointerButton::Primary) {
            self.selected = hovered.clone();
        }

        let graph = self.controller.graph();
        for &index in &self.controller.visible().edge_indices {
            let Some(edge) = graph.edges().get(index) else {
                continue;
            };
            let (Some(source), Some(target)) = (graph.node(&edge.source), graph.node(&edge.target))
            else {
                continue;
            };
            let (Some(from), Some(to)) = (source.position, target.position) else {
                continue;
            };
            let start = world_to_screen(rect, self.pan, self.zoom, from);
            let end = world_to_screen(rect, self.pan, self.zoom, to);
            if !edge_visible(rect, start, end, 2.5) {
                continue;
            }
            painter.line_segment([start, end], edge_stroke(edge.kind, self.zoom));
        }

        let matches = self.search_matches();
        let searching = !matches.is_empty();
        let selected_color = Color32::from_rgb(245, 206, 93);
        let outline = Stroke::new(1.0, Color32::from_rgba_unmultiplied(15, 15, 15, 190));

        for node in &nodes {
            let NodeHit {
                id,
                position,
                radius,
            } = &node.hit;
            if !circle_visible(rect, *position, *radius) {
                continue;
            }

            let is_selected = self.selected.as_deref() == Some(id.as_str());
            let is_hovered = hovered.as_deref() == Some(id.as_str());
            let is_match = matches.contains(id);

            let base_color = kind_color(node.kind);
            let color = if is_selected {
                selected_color
            } else if is_hovered {
                Color32::from_rgb(255, 164, 101)
            } else if is_match {
                blend_color(base_color, Color32::from_rgb(103, 196, 255), 0.68)
            } else if searching {
                dim_color(base_color, 0.38)
            } else {
                base_color
            };

            draw_node_shape(&painter, node.shape, *position, *radius, color, outline);
            if node.collapsed {
                painter.circle_stroke(
                    *position,
                    radius + 4.0,
                    Stroke::new(1.4, Color32::from_rgba_unmultiplied(245, 206, 93, 160)),
                );
            }
            if node.pinned {
                painter.circle_filled(
                    *position + vec2(*radius * 0.7, -*radius * 0.7),
                    3.0,
                    Color32::from_gray(230),
                );
            }

            let should_draw_label =
                is_selected || is_hovered || is_match || *radius > 14.0 || self.zoom > 1.35;
            if should_draw_label {
                painter.text(
                    *position + vec2(radius + 5.0, 0.0),
                    Align2::LEFT_CENTER,
                    &node.label,
                    FontId::proportional(12.0),
                    Color32::from_gray(238),
                );
            }
        }

        if let Some(notice) = self.controller.active_notice(Instant::now()) {
            painter.text(
                rect.left_bottom() + vec2(12.0, -14.0),
                Align2::LEFT_BOTTOM,
                &notice.message,
                FontId::proportional(14.0),
                Color32::from_rgb(240, 110, 100),
            );
        }

        if let Some(id) = hovered.as_deref()
            && let Some(node) = graph.node(id)
        {
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                format!("{}  |  {}  |  depth {}", node.id, node.kind.label(), node.depth),
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }
    }
}
