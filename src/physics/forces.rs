use eframe::egui::Vec2;

use super::geometry::{direction, is_finite};
use super::quadtree::{CellId, Quadtree};
use super::{Body, Link};

const DISTANCE_MIN_SQ: f32 = 1.0;

/// Spring along every link, split between the endpoints by degree like d3's
/// link force. Uses positions extrapolated by the current velocity.
pub(super) fn apply_links(bodies: &mut [Body], links: &[Link], alpha: f32) {
    for link in links {
        let (source, target) = (link.source, link.target);
        if source == target || source >= bodies.len() || target >= bodies.len() {
            continue;
        }

        let delta = (bodies[target].position + bodies[target].velocity)
            - (bodies[source].position + bodies[source].velocity);
        let Some((_, length)) = direction(delta) else {
            continue;
        };

        let k = (length - link.distance) / length * alpha * link.strength;
        let correction = delta * k;
        if !is_finite(correction) {
            continue;
        }
        bodies[target].velocity -= correction * link.bias;
        bodies[source].velocity += correction * (1.0 - link.bias);
    }
}

#[derive(Clone, Copy)]
pub(super) struct ChargeParams {
    pub(super) alpha: f32,
    pub(super) theta: f32,
    pub(super) distance_max_sq: f32,
}

fn charge_between(delta: Vec2, strength: f32, params: ChargeParams) -> Vec2 {
    let mut distance_sq = delta.length_sq();
    if distance_sq <= 0.0 || !distance_sq.is_finite() || distance_sq >= params.distance_max_sq {
        return Vec2::ZERO;
    }
    if distance_sq < DISTANCE_MIN_SQ {
        distance_sq = (DISTANCE_MIN_SQ * distance_sq).sqrt();
    }
    delta * (strength * params.alpha / distance_sq)
}

/// Many-body charge for one body, approximated with Barnes-Hut.
///
/// `delta` points from the body to the other charge, so negative strengths
/// push the body away. `stack` is scratch space for the walk.
pub(super) fn accumulate_charge_for_body(
    tree: &Quadtree,
    index: usize,
    positions: &[Vec2],
    charges: &[f32],
    params: ChargeParams,
    stack: &mut Vec<CellId>,
    velocity: &mut Vec2,
) {
    let point = positions[index];
    stack.clear();
    stack.push(Quadtree::ROOT);

    while let Some(id) = stack.pop() {
        let cell = tree.cell(id);
        if cell.count == 0 {
            continue;
        }

        if cell.is_leaf() {
            for &other in cell.bodies.iter().filter(|&&other| other != index) {
                *velocity += charge_between(positions[other] - point, charges[other], params);
            }
            continue;
        }

        let delta = cell.centroid - point;
        let far_enough = cell.count > 1
            && !cell.square.contains(point)
            && cell.square.side < params.theta * delta.length();
        if far_enough {
            *velocity += charge_between(delta, cell.charge, params);
        } else {
            stack.extend(cell.children());
        }
    }
}

#[derive(Clone, Copy)]
pub(super) struct CollisionParams {
    pub(super) strength: f32,
    pub(super) padding: f32,
    pub(super) max_collision_distance_sq: f32,
}

fn collide_pair(
    from: usize,
    to: usize,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    impulses: &mut [Vec2],
) {
    let delta = positions[from] - positions[to];
    let Some((_, distance)) = direction(delta) else {
        return;
    };

    let min_distance = radii[from] + radii[to] + params.padding;
    if distance >= min_distance {
        return;
    }

    let push = (min_distance - distance) / distance * params.strength;
    let from_sq = radii[from] * radii[from];
    let to_sq = radii[to] * radii[to];
    let share = to_sq / (from_sq + to_sq).max(0.0001);
    impulses[from] += delta * push * share;
    impulses[to] -= delta * push * (1.0 - share);
}

/// Resolves overlaps between bodies in cells that are close enough to touch.
/// Walks pairs of cells so distant parts of the tree are never compared.
pub(super) fn accumulate_collisions(
    tree: &Quadtree,
    positions: &[Vec2],
    radii: &[f32],
    params: CollisionParams,
    impulses: &mut [Vec2],
) {
    let mut pairs = vec![(Quadtree::ROOT, Quadtree::ROOT)];
    while let Some((a, b)) = pairs.pop() {
        let (cell_a, cell_b) = (tree.cell(a), tree.cell(b));
        if cell_a.square.gap_sq(cell_b.square) > params.max_collision_distance_sq {
            continue;
        }

        if a == b {
            if cell_a.is_leaf() {
                for (offset, &from) in cell_a.bodies.iter().enumerate() {
                    for &to in &cell_a.bodies[offset + 1..] {
                        collide_pair(from, to, positions, radii, params, impulses);
                    }
                }
            } else {
                let children = cell_a.children().collect::<Vec<_>>();
                for (offset, &first) in children.iter().enumerate() {
                    pairs.push((first, first));
                    pairs.extend(children[offset + 1..].iter().map(|&second| (first, second)));
                }
            }
            continue;
        }

        match (cell_a.is_leaf(), cell_b.is_leaf()) {
            (true, true) => {
                for &from in &cell_a.bodies {
                    for &to in &cell_b.bodies {
                        collide_pair(from, to, positions, radii, params, impulses);
                    }
                }
            }
            (false, leaf_b) if leaf_b || cell_a.square.side >= cell_b.square.side => {
                pairs.extend(cell_a.children().map(|child| (child, b)));
            }
            _ => pairs.extend(cell_b.children().map(|child| (a, child))),
        }
    }
}

/// Weak spring towards each body's anchor, or `center` when it has none.
pub(super) fn apply_centering(bodies: &mut [Body], center: Vec2, strength: f32, alpha: f32) {
    for body in bodies {
        let target = body.anchor.unwrap_or(center);
        let pull = (target - body.position) * (strength * alpha);
        if is_finite(pull) {
            body.velocity += pull;
        }
    }
}

/// Pulls non-root, non-memo bodies towards the ring `depth * ring_spacing` around `origin`.
pub(super) fn apply_radial(
    bodies: &mut [Body],
    origin: Vec2,
    ring_spacing: f32,
    strength: f32,
    alpha: f32,
) {
    for body in bodies {
        if body.depth == 0 || body.is_memo {
            continue;
        }
        let delta = body.position - origin;
        let Some((_, radius)) = direction(delta) else {
            continue;
        };
        let ring = body.depth as f32 * ring_spacing;
        let k = (ring - radius) / radius * strength * alpha;
        let pull = delta * k;
        if is_finite(pull) {
            body.velocity += pull;
        }
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::graph::EdgeKind;

    fn body(id: &str, position: Vec2) -> Body {
        Body {
            id: id.to_owned(),
            depth: 1,
            radius: 10.0,
            charge: -100.0,
            is_memo: false,
            position,
            velocity: Vec2::ZERO,
            pin: None,
            anchor: None,
        }
    }

    #[test]
    fn stretched_link_pulls_both_ends_inward() {
        let mut bodies = vec![body("a", Vec2::ZERO), body("b", vec2(100.0, 0.0))];
        let links = [Link {
            source: 0,
            target: 1,
            kind: EdgeKind::Hierarchy,
            distance: 10.0,
            strength: 1.0,
            bias: 0.5,
        }];
        apply_links(&mut bodies, &links, 1.0);
        assert!(bodies[0].velocity.x > 0.0);
        assert!(bodies[1].velocity.x < 0.0);
        assert_eq!(bodies[0].velocity.x, -bodies[1].velocity.x);
    }

    #[test]
    fn tree_charge_matches_direct_sum_inside_a_leaf() {
        let positions = vec![Vec2::ZERO, vec2(30.0, 0.0), vec2(0.0, -40.0)];
        let charges = vec![-100.0; 3];
        let params = ChargeParams {
            alpha: 1.0,
            theta: 0.9,
            distance_max_sq: f32::INFINITY,
        };
        let tree = Quadtree::build(&positions, &charges).unwrap();

        let mut stack = Vec::new();
        let mut velocity = Vec2::ZERO;
        accumulate_charge_for_body(&tree, 0, &positions, &charges, params, &mut stack, &mut velocity);

        let expected = charge_between(positions[1], -100.0, params)
            + charge_between(positions[2], -100.0, params);
        assert_eq!(velocity, expected);
        assert!(velocity.x < 0.0 && velocity.y > 0.0);
    }

    #[test]
    fn overlapping_bodies_are_pushed_apart() {
        let positions = vec![Vec2::ZERO, vec2(5.0, 0.0), vec2(500.0, 500.0)];
        let radii = vec![10.0; 3];
        let tree = Quadtree::build(&positions, &[-1.0; 3]).unwrap();
        let mut impulses = vec![Vec2::ZERO; 3];
        accumulate_collisions(
            &tree,
            &positions,
            &radii,
            CollisionParams {
                strength: 1.0,
                padding: 0.0,
                max_collision_distance_sq: 400.0,
            },
            &mut impulses,
        );
        assert!(impulses[0].x < 0.0);
        assert!(impulses[1].x > 0.0);
        assert_eq!(impulses[2], Vec2::ZERO);
    }
}
