//! Small planar helpers shared by the forces and the viewer.

use eframe::egui::Vec2;

pub const EPSILON: f32 = 1e-6;

pub fn is_finite(point: Vec2) -> bool {
    point.x.is_finite() && point.y.is_finite()
}

/// Unit vector and length of `delta`, or `None` for zero-length or non-finite input.
pub fn direction(delta: Vec2) -> Option<(Vec2, f32)> {
    if !is_finite(delta) {
        return None;
    }
    let length = delta.length();
    if length <= EPSILON || !length.is_finite() {
        return None;
    }
    Some((delta / length, length))
}

pub fn lerp(from: Vec2, to: Vec2, ratio: f32) -> Vec2 {
    from + (to - from) * ratio
}

fn cross(origin: Vec2, a: Vec2, b: Vec2) -> f32 {
    let oa = a - origin;
    let ob = b - origin;
    (oa.x * ob.y) - (oa.y * ob.x)
}

fn orientation(origin: Vec2, a: Vec2, b: Vec2) -> i8 {
    let value = cross(origin, a, b);
    if value.abs() <= EPSILON {
        0
    } else if value > 0.0 {
        1
    } else {
        -1
    }
}

/// Whether `point`, known to be collinear with `a`-`b`, lies within that segment.
fn within_segment(a: Vec2, b: Vec2, point: Vec2) -> bool {
    point.x >= a.x.min(b.x) - EPSILON
        && point.x <= a.x.max(b.x) + EPSILON
        && point.y >= a.y.min(b.y) - EPSILON
        && point.y <= a.y.max(b.y) + EPSILON
}

/// Segment intersection by orientation signs, including touching endpoints and
/// collinear overlap.
pub fn segments_intersect(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> bool {
    if !(is_finite(a1) && is_finite(a2) && is_finite(b1) && is_finite(b2)) {
        return false;
    }

    let o1 = orientation(a1, a2, b1);
    let o2 = orientation(a1, a2, b2);
    let o3 = orientation(b1, b2, a1);
    let o4 = orientation(b1, b2, a2);

    if o1 != o2 && o3 != o4 && o1 != 0 && o2 != 0 && o3 != 0 && o4 != 0 {
        return true;
    }

    (o1 == 0 && within_segment(a1, a2, b1))
        || (o2 == 0 && within_segment(a1, a2, b2))
        || (o3 == 0 && within_segment(b1, b2, a1))
        || (o4 == 0 && within_segment(b1, b2, a2))
}

/// Whether `point` lies on the segment `a`-`b`, endpoints included.
pub fn point_on_segment(a: Vec2, b: Vec2, point: Vec2) -> bool {
    is_finite(a)
        && is_finite(b)
        && is_finite(point)
        && orientation(a, b, point) == 0
        && within_segment(a, b, point)
}

/// Squared gap between the axis-aligned boxes of two segments.
pub fn segment_box_gap_sq(a1: Vec2, a2: Vec2, b1: Vec2, b2: Vec2) -> f32 {
    let dx = (a1.x.min(a2.x) - b1.x.max(b2.x)).max(b1.x.min(b2.x) - a1.x.max(a2.x));
    let dy = (a1.y.min(a2.y) - b1.y.max(b2.y)).max(b1.y.min(b2.y) - a1.y.max(a2.y));
    let dx = dx.max(0.0);
    let dy = dy.max(0.0);
    dx * dx + dy * dy
}
