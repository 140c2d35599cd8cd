//! Keeps edges clear of unrelated nodes and of each other.
//!
//! Every tick each link is sampled at a few fixed ratios between its endpoints.
//! Nodes that overlap a sample of a link they are not part of are pushed away
//! from it, with a smaller counter push on the link endpoints. Pairs of links
//! repel each other sample by sample; pairs that share an endpoint interact
//! less, pairs whose segments cross interact more.

use eframe::egui::Vec2;

use crate::config::EdgeRepulsionConfig;

use super::geometry::{
    direction, is_finite, lerp, point_on_segment, segment_box_gap_sq, segments_intersect,
};
use super::{Body, Link};

struct Segment {
    source: usize,
    target: usize,
    from: Vec2,
    to: Vec2,
    samples: [Vec2; 3],
}

fn sample_segments(bodies: &[Body], links: &[Link], ratios: [f32; 3]) -> Vec<Segment> {
    links
        .iter()
        .filter_map(|link| {
            let (source, target) = (link.source, link.target);
            if source == target || source >= bodies.len() || target >= bodies.len() {
                return None;
            }
            let from = bodies[source].position;
            let to = bodies[target].position;
            direction(to - from)?;
            Some(Segment {
                source,
                target,
                from,
                to,
                samples: ratios.map(|ratio| lerp(from, to, ratio)),
            })
        })
        .collect()
}

/// Accumulates velocity impulses into `impulses` (one slot per body).
pub(super) fn accumulate(
    bodies: &[Body],
    links: &[Link],
    config: &EdgeRepulsionConfig,
    alpha: f32,
    impulses: &mut [Vec2],
) {
    if !config.enabled || alpha <= 0.0 {
        return;
    }

    let segments = sample_segments(bodies, links, config.sample_ratios);
    push_nodes_off_segments(bodies, &segments, config, alpha, impulses);
    push_segments_apart(&segments, config, alpha, impulses);
}

fn push_nodes_off_segments(
    bodies: &[Body],
    segments: &[Segment],
    config: &EdgeRepulsionConfig,
    alpha: f32,
    impulses: &mut [Vec2],
) {
    for segment in segments {
        let min = segment.from.min(segment.to);
        let max = segment.from.max(segment.to);

        for (index, body) in bodies.iter().enumerate() {
            if index == segment.source || index == segment.target || !is_finite(body.position) {
                continue;
            }

            let reach = body.radius + config.padding;
            let point = body.position;
            if point.x < min.x - reach
                || point.x > max.x + reach
                || point.y < min.y - reach
                || point.y > max.y + reach
            {
                continue;
            }

            for sample in segment.samples {
                let Some((unit, distance)) = direction(point - sample) else {
                    continue;
                };
                if distance >= reach {
                    continue;
                }

                let impulse = unit * ((reach - distance) * config.node_strength * alpha);
                impulses[index] += impulse;
                let counter = impulse * config.endpoint_counter;
                impulses[segment.source] -= counter;
                impulses[segment.target] -= counter;
            }
        }
    }
}

fn shares_endpoint(a: &Segment, b: &Segment) -> bool {
    a.source == b.source || a.source == b.target || a.target == b.source || a.target == b.target
}

/// Links meeting at a shared endpoint always touch there, so for them only an
/// overlap along a common line counts as crossing.
fn segments_cross(a: &Segment, b: &Segment, shared: bool) -> bool {
    if !shared {
        return segments_intersect(a.from, a.to, b.from, b.to);
    }
    let far_end = |segment: &Segment, other: &Segment| {
        if segment.source == other.source || segment.source == other.target {
            segment.to
        } else {
            segment.from
        }
    };
    point_on_segment(a.from, a.to, far_end(b, a)) || point_on_segment(b.from, b.to, far_end(a, b))
}

fn push_segments_apart(
    segments: &[Segment],
    config: &EdgeRepulsionConfig,
    alpha: f32,
    impulses: &mut [Vec2],
) {
    let range = config.edge_range.max(1.0);
    let range_sq = range * range;
    let ratios = config.sample_ratios;

    for (first, a) in segments.iter().enumerate() {
        for b in &segments[(first + 1)..] {
            let shared = shares_endpoint(a, b);
            let crossing = segments_cross(a, b, shared);
            if !crossing && segment_box_gap_sq(a.from, a.to, b.from, b.to) > range_sq {
                continue;
            }

            let mut scale = config.edge_strength * alpha;
            if shared {
                scale *= config.shared_endpoint_damping;
            }
            if crossing {
                scale *= config.intersection_boost;
            }

            // Each sample hands its push to the endpoints in proportion to how
            // close it sits to them.
            for (sample_a, ratio_a) in a.samples.iter().zip(ratios) {
                for (sample_b, ratio_b) in b.samples.iter().zip(ratios) {
                    let Some((unit, distance)) = direction(*sample_a - *sample_b) else {
                        continue;
                    };
                    let falloff = if distance < range {
                        (range - distance) / range
                    } else if crossing {
                        0.25
                    } else {
                        continue;
                    };

                    let impulse = unit * (falloff * scale);
                    if !is_finite(impulse) {
                        continue;
                    }
                    impulses[a.source] += impulse * (1.0 - ratio_a);
                    impulses[a.target] += impulse * ratio_a;
                    impulses[b.source] -= impulse * (1.0 - ratio_b);
                    impulses[b.target] -= impulse * ratio_b;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;

    use super::*;
    use crate::graph::EdgeKind;

    fn body(position: Vec2) -> Body {
        Body {
            id: String::new(),
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

    fn link(source: usize, target: usize) -> Link {
        Link {
            source,
            target,
            kind: EdgeKind::Hierarchy,
            distance: 100.0,
            strength: 0.5,
            bias: 0.5,
        }
    }

    #[test]
    fn node_on_an_edge_is_pushed_off_and_endpoints_recoil() {
        let bodies = vec![
            body(vec2(0.0, 0.0)),
            body(vec2(100.0, 0.0)),
            body(vec2(50.0, 4.0)),
        ];
        let mut impulses = vec![Vec2::ZERO; 3];
        accumulate(
            &bodies,
            &[link(0, 1)],
            &EdgeRepulsionConfig::default(),
            1.0,
            &mut impulses,
        );

        assert!(impulses[2].y > 0.0);
        assert!(impulses[0].y < 0.0);
        assert!(impulses[1].y < 0.0);
        assert!(impulses[0].y.abs() < impulses[2].y.abs());
    }

    fn total(impulses: &[Vec2]) -> f32 {
        impulses.iter().map(|impulse| impulse.length()).sum()
    }

    fn run(bodies: &[Body], links: &[Link], config: &EdgeRepulsionConfig) -> Vec<Vec2> {
        let mut impulses = vec![Vec2::ZERO; bodies.len()];
        accumulate(bodies, links, config, 1.0, &mut impulses);
        impulses
    }

    #[test]
    fn crossing_edges_get_the_intersection_boost() {
        let bodies = vec![
            body(vec2(0.0, 0.0)),
            body(vec2(100.0, 0.0)),
            body(vec2(40.0, -30.0)),
            body(vec2(60.0, 50.0)),
        ];
        let links = [link(0, 1), link(2, 3)];
        let plain = EdgeRepulsionConfig {
            padding: 0.0,
            intersection_boost: 1.0,
            ..EdgeRepulsionConfig::default()
        };
        let boosted = EdgeRepulsionConfig {
            intersection_boost: 3.0,
            ..plain.clone()
        };

        let plain_total = total(&run(&bodies, &links, &plain));
        let boosted_total = total(&run(&bodies, &links, &boosted));
        assert!(plain_total > 0.0);
        assert!((boosted_total / plain_total - 3.0).abs() < 1e-3);
    }

    #[test]
    fn overlapping_edges_from_one_endpoint_count_as_crossing() {
        let bodies = vec![
            body(vec2(0.0, 0.0)),
            body(vec2(100.0, 0.0)),
            body(vec2(50.0, 0.0)),
        ];
        let links = [link(0, 1), link(0, 2)];
        let plain = EdgeRepulsionConfig {
            padding: 0.0,
            intersection_boost: 1.0,
            ..EdgeRepulsionConfig::default()
        };
        let boosted = EdgeRepulsionConfig {
            intersection_boost: 3.0,
            ..plain.clone()
        };

        let plain_total = total(&run(&bodies, &links, &plain));
        let boosted_total = total(&run(&bodies, &links, &boosted));
        assert!(plain_total > 0.0);
        assert!((boosted_total / plain_total - 3.0).abs() < 1e-3);
    }

    #[test]
    fn parallel_edges_drift_apart_and_shared_endpoints_damp() {
        let parallel = vec![
            body(vec2(0.0, 0.0)),
            body(vec2(100.0, 0.0)),
            body(vec2(0.0, 20.0)),
            body(vec2(100.0, 20.0)),
        ];
        let config = EdgeRepulsionConfig {
            padding: 0.0,
            ..EdgeRepulsionConfig::default()
        };
        let impulses = run(&parallel, &[link(0, 1), link(2, 3)], &config);
        assert!(impulses[0].y < 0.0 && impulses[1].y < 0.0);
        assert!(impulses[2].y > 0.0 && impulses[3].y > 0.0);

        let fan = vec![
            body(vec2(0.0, 0.0)),
            body(vec2(100.0, 10.0)),
            body(vec2(100.0, -10.0)),
        ];
        let links = [link(0, 1), link(0, 2)];
        let undamped = EdgeRepulsionConfig {
            shared_endpoint_damping: 1.0,
            ..config.clone()
        };
        let damped = EdgeRepulsionConfig {
            shared_endpoint_damping: 0.3,
            ..config
        };
        let ratio = total(&run(&fan, &links, &damped)) / total(&run(&fan, &links, &undamped));
        assert!((ratio - 0.3).abs() < 1e-3);
    }

    #[test]
    fn degenerate_edges_and_disabled_force_do_nothing() {
        let bodies = vec![body(vec2(5.0, 5.0)), body(vec2(5.0, 5.0)), body(vec2(5.0, 6.0))];
        let mut impulses = vec![Vec2::ZERO; 3];
        accumulate(
            &bodies,
            &[link(0, 1)],
            &EdgeRepulsionConfig::default(),
            1.0,
            &mut impulses,
        );
        assert!(impulses.iter().all(|impulse| *impulse == Vec2::ZERO));

        let bodies = vec![body(vec2(0.0, 0.0)), body(vec2(100.0, 0.0)), body(vec2(50.0, 1.0))];
        accumulate(
            &bodies,
            &[link(0, 1)],
            &EdgeRepulsionConfig {
                enabled: false,
                ..EdgeRepulsionConfig::default()
            },
            1.0,
            &mut impulses,
        );
        assert!(impulses.iter().all(|impulse| *impulse == Vec2::ZERO));
    }
}
