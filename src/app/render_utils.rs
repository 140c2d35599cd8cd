use eframe::egui::{Color32, Painter, Pos2, Rect, Stroke, Vec2, vec2};
use treeforce::graph::{EdgeKind, NodeKind, NodeShape};
use treeforce::physics::geometry::segments_intersect;

const BACKGROUND: Color32 = Color32::from_rgb(19, 23, 29);
const GRID: Color32 = Color32::from_rgba_premultiplied(17, 20, 22, 70);

/// Mixes `overlay` into `base`; `amount` 0 keeps `base`, 1 gives `overlay`.
pub(super) fn blend_color(base: Color32, overlay: Color32, amount: f32) -> Color32 {
    base.lerp_to_gamma(overlay, amount.clamp(0.0, 1.0))
}

/// Darkens and slightly fades a color for nodes outside the search result.
pub(super) fn dim_color(color: Color32, factor: f32) -> Color32 {
    color.gamma_multiply(0.2 + factor.clamp(0.0, 1.0) * 0.8)
}

/// Scene grid that pans and scales with the view.
pub(super) fn draw_background(painter: &Painter, rect: Rect, pan: Vec2, zoom: f32) {
    painter.rect_filled(rect, 0.0, BACKGROUND);

    let spacing = (48.0 * zoom.clamp(0.5, 2.0)).max(18.0);
    let anchor = rect.center() + pan;
    let stroke = Stroke::new(1.0, GRID);

    let first_column = ((rect.left() - anchor.x) / spacing).ceil() as i32;
    let last_column = ((rect.right() - anchor.x) / spacing).floor() as i32;
    for column in first_column..=last_column {
        let x = anchor.x + column as f32 * spacing;
        painter.vline(x, rect.y_range(), stroke);
    }

    let first_row = ((rect.top() - anchor.y) / spacing).ceil() as i32;
    let last_row = ((rect.bottom() - anchor.y) / spacing).floor() as i32;
    for row in first_row..=last_row {
        let y = anchor.y + row as f32 * spacing;
        painter.hline(rect.x_range(), y, stroke);
    }
}

pub(super) fn circle_visible(rect: Rect, position: Pos2, radius: f32) -> bool {
    rect.expand(radius).contains(position)
}

/// Whether any part of the segment can show up inside `rect`.
pub(super) fn edge_visible(rect: Rect, start: Pos2, end: Pos2, padding: f32) -> bool {
    let bounds = Rect::from_two_pos(start, end).expand(padding);
    if !bounds.intersects(rect) {
        return false;
    }
    if rect.contains(start) || rect.contains(end) {
        return true;
    }

    let corners = [
        rect.left_top(),
        rect.right_top(),
        rect.right_bottom(),
        rect.left_bottom(),
    ];
    corners
        .iter()
        .zip(corners.iter().cycle().skip(1))
        .any(|(a, b)| segments_intersect(start.to_vec2(), end.to_vec2(), a.to_vec2(), b.to_vec2()))
}

pub(super) fn world_to_screen(rect: Rect, pan: Vec2, zoom: f32, world: Vec2) -> Pos2 {
    rect.center() + pan + world * zoom
}

pub(super) fn screen_to_world(rect: Rect, pan: Vec2, zoom: f32, screen: Pos2) -> Vec2 {
    (screen - rect.center() - pan) / zoom
}

pub(super) fn kind_color(kind: NodeKind) -> Color32 {
    match kind {
        NodeKind::Root => Color32::from_rgb(245, 158, 91),
        NodeKind::Question => Color32::from_rgb(86, 156, 214),
        NodeKind::Memo => Color32::from_rgb(170, 201, 120),
    }
}

pub(super) fn edge_stroke(kind: EdgeKind, zoom: f32) -> Stroke {
    let zoom_sqrt = zoom.sqrt();
    match kind {
        EdgeKind::Hierarchy => Stroke::new(
            (1.6 * zoom_sqrt).clamp(0.8, 3.4),
            Color32::from_rgba_unmultiplied(150, 160, 172, 210),
        ),
        EdgeKind::Connection => Stroke::new(
            (1.1 * zoom_sqrt).clamp(0.6, 2.4),
            Color32::from_rgba_unmultiplied(103, 196, 255, 150),
        ),
        EdgeKind::Memo => Stroke::new(
            (0.9 * zoom_sqrt).clamp(0.5, 2.0),
            Color32::from_rgba_unmultiplied(170, 201, 120, 170),
        ),
    }
}

/// Fills `shape` centered on `position`. `radius` is the bounding circle.
pub(super) fn draw_node_shape(
    painter: &Painter,
    shape: NodeShape,
    position: Pos2,
    radius: f32,
    fill: Color32,
    stroke: Stroke,
) {
    match shape {
        NodeShape::Circle => {
            painter.circle_filled(position, radius, fill);
            painter.circle_stroke(position, radius, stroke);
        }
        NodeShape::Square => {
            let half = radius / std::f32::consts::SQRT_2;
            let rect = Rect::from_center_size(position, vec2(half, half) * 2.0);
            painter.rect_filled(rect, 2.0, fill);
            painter.line_segment([rect.left_top(), rect.right_top()], stroke);
            painter.line_segment([rect.right_top(), rect.right_bottom()], stroke);
            painter.line_segment([rect.right_bottom(), rect.left_bottom()], stroke);
            painter.line_segment([rect.left_bottom(), rect.left_top()], stroke);
        }
        NodeShape::Diamond => {
            let points = vec![
                position + vec2(0.0, -radius),
                position + vec2(radius, 0.0),
                position + vec2(0.0, radius),
                position + vec2(-radius, 0.0),
            ];
            painter.add(eframe::egui::Shape::convex_polygon(points, fill, stroke));
        }
        NodeShape::Pill => {
            let rect = Rect::from_center_size(position, vec2(radius * 2.0, radius * 0.9));
            painter.rect_filled(rect, radius * 0.45, fill);
        }
    }
}
