use eframe::egui::{Vec2, vec2};

use super::geometry::is_finite;

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 12;

/// Axis-aligned square given by its minimum corner and side length.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(super) struct Square {
    pub(super) min: Vec2,
    pub(super) side: f32,
}

impl Square {
    /// Smallest padded square around every finite point, or `None` if there is none.
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let (min, max) = points.iter().copied().filter(|point| is_finite(*point)).fold(
            None,
            |bounds: Option<(Vec2, Vec2)>, point| match bounds {
                None => Some((point, point)),
                Some((min, max)) => Some((min.min(point), max.max(point))),
            },
        )?;
        let side = (max.x - min.x).max(max.y - min.y).max(1.0) + 2.0;
        let middle = (min + max) * 0.5;
        Some(Self {
            min: middle - vec2(side, side) * 0.5,
            side,
        })
    }

    pub(super) fn center(self) -> Vec2 {
        self.min + vec2(self.side, self.side) * 0.5
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        let max = self.min + vec2(self.side, self.side);
        (self.min.x..=max.x).contains(&point.x) && (self.min.y..=max.y).contains(&point.y)
    }

    /// Quadrants are numbered row-major: bit 0 is the right half, bit 1 the lower half.
    fn quadrant_of(self, point: Vec2) -> usize {
        let center = self.center();
        usize::from(point.x >= center.x) | (usize::from(point.y >= center.y) << 1)
    }

    fn quadrant(self, quadrant: usize) -> Self {
        let half = self.side * 0.5;
        let step = vec2((quadrant & 1) as f32, (quadrant >> 1) as f32) * half;
        Self {
            min: self.min + step,
            side: half,
        }
    }

    /// Squared distance between the closest points of two squares; zero when they touch.
    pub(super) fn gap_sq(self, other: Self) -> f32 {
        let gap = |a_min: f32, b_min: f32| {
            let (lower, upper, lower_side) = if a_min <= b_min {
                (a_min, b_min, self.side)
            } else {
                (b_min, a_min, other.side)
            };
            (upper - (lower + lower_side)).max(0.0)
        };
        let dx = gap(self.min.x, other.min.x);
        let dy = gap(self.min.y, other.min.y);
        dx * dx + dy * dy
    }
}

pub(super) type CellId = usize;

/// One square of the tree. Leaves list their bodies; inner cells only carry
/// the aggregate used for the Barnes-Hut approximation.
#[derive(Debug)]
pub(super) struct Cell {
    pub(super) square: Square,
    /// Summed strength of every body below the cell.
    pub(super) charge: f32,
    /// Strength-weighted centroid of those bodies.
    pub(super) centroid: Vec2,
    pub(super) count: usize,
    pub(super) bodies: Vec<usize>,
    children: [Option<CellId>; 4],
}

impl Cell {
    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    pub(super) fn children(&self) -> impl Iterator<Item = CellId> + '_ {
        self.children.iter().flatten().copied()
    }
}

/// Arena-backed quadtree over body positions, rebuilt every tick.
#[derive(Debug)]
pub(super) struct Quadtree {
    cells: Vec<Cell>,
}

impl Quadtree {
    pub(super) const ROOT: CellId = 0;

    /// Indexes the finite entries of `positions`; `charges` is indexed alike.
    pub(super) fn build(positions: &[Vec2], charges: &[f32]) -> Option<Self> {
        let square = Square::enclosing(positions)?;
        let bodies = (0..positions.len())
            .filter(|&index| is_finite(positions[index]))
            .collect::<Vec<_>>();

        let mut tree = Self { cells: Vec::new() };
        tree.push_cell(square, bodies, positions, charges);

        let mut pending = vec![(Self::ROOT, 0usize)];
        while let Some((id, depth)) = pending.pop() {
            if depth >= MAX_DEPTH || tree.cells[id].bodies.len() <= LEAF_CAPACITY {
                continue;
            }

            let square = tree.cells[id].square;
            let mut buckets: [Vec<usize>; 4] = Default::default();
            for &body in &tree.cells[id].bodies {
                buckets[square.quadrant_of(positions[body])].push(body);
            }
            // Coincident points cannot be separated by splitting.
            if buckets.iter().filter(|bucket| !bucket.is_empty()).count() < 2 {
                continue;
            }

            for (quadrant, bucket) in buckets.into_iter().enumerate() {
                if bucket.is_empty() {
                    continue;
                }
                let child = tree.push_cell(square.quadrant(quadrant), bucket, positions, charges);
                tree.cells[id].children[quadrant] = Some(child);
                pending.push((child, depth + 1));
            }
            tree.cells[id].bodies.clear();
        }

        Some(tree)
    }

    fn push_cell(
        &mut self,
        square: Square,
        bodies: Vec<usize>,
        positions: &[Vec2],
        charges: &[f32],
    ) -> CellId {
        let mut charge = 0.0_f32;
        let mut weight = 0.0_f32;
        let mut weighted = Vec2::ZERO;
        for &body in &bodies {
            let strength = charges.get(body).copied().unwrap_or(0.0);
            charge += strength;
            weight += strength.abs();
            weighted += positions[body] * strength.abs();
        }
        let centroid = if weight > 0.0 {
            weighted / weight
        } else {
            square.center()
        };

        self.cells.push(Cell {
            square,
            charge,
            centroid,
            count: bodies.len(),
            bodies,
            children: [None; 4],
        });
        self.cells.len() - 1
    }

    pub(super) fn cell(&self, id: CellId) -> &Cell {
        &self.cells[id]
    }
}
