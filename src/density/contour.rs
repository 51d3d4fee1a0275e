//! Marching squares over a `DensityGrid`.
//!
//! The grid is treated as if surrounded by a ring of zero-valued nodes, so
//! with a positive threshold every iso-line closes. Segments are joined
//! through the grid edges they cross: each crossed edge is shared by
//! exactly two cells, which makes every chain a ring.

use hashbrown::{HashMap, HashSet};
use smallvec::SmallVec;

use super::DensityGrid;
use crate::model::CartesianPoint;

/// A closed iso-line. The first vertex is not repeated at the end.
#[derive(Debug, Clone, PartialEq)]
pub struct Ring {
    pub points: Vec<CartesianPoint>,
}

impl Ring {
    pub fn len(&self) -> usize { self.points.len() }
    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    /// Shoelace area, positive for counter-clockwise rings.
    pub fn signed_area(&self) -> f64 {
        let n = self.points.len();
        (0..n)
            .map(|k| {
                let (a, b) = (&self.points[k], &self.points[(k + 1) % n]);
                a.x * b.y - b.x * a.y
            })
            .sum::<f64>()
            / 2.0
    }

    pub fn area(&self) -> f64 {
        self.signed_area().abs()
    }

    /// Even-odd point-in-polygon test.
    pub fn contains(&self, p: &CartesianPoint) -> bool {
        let n = self.points.len();
        let mut inside = false;
        let mut j = n.wrapping_sub(1);
        for i in 0..n {
            let (a, b) = (&self.points[i], &self.points[j]);
            if (a.y > p.y) != (b.y > p.y) && p.x < (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// Distance from `p` to the ring's boundary.
    pub fn distance(&self, p: &CartesianPoint) -> f64 {
        let n = self.points.len();
        (0..n)
            .map(|k| segment_distance(p, &self.points[k], &self.points[(k + 1) % n]))
            .fold(f64::INFINITY, f64::min)
    }

    /// Vertices with the first repeated at the end.
    pub fn closed(&self) -> Vec<CartesianPoint> {
        let mut pts = self.points.clone();
        if let Some(first) = self.points.first() {
            pts.push(*first);
        }
        pts
    }
}

fn segment_distance(p: &CartesianPoint, a: &CartesianPoint, b: &CartesianPoint) -> f64 {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    if len2 == 0.0 {
        return p.distance(a);
    }
    let s = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    p.distance(&CartesianPoint::new(a.x + s * dx, a.y + s * dy))
}

// ============================================================================
// Marching squares
// ============================================================================

/// A grid edge in padded coordinates: node `(i, j)` to `(i+1, j)` when
/// `vertical` is false, to `(i, j+1)` when true.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Edge {
    i: usize,
    j: usize,
    vertical: bool,
}

/// Node values with a one-node zero border; indices are shifted by one.
struct Padded<'g> {
    grid: &'g DensityGrid,
}

impl Padded<'_> {
    fn value(&self, i: usize, j: usize) -> f64 {
        if i == 0 || j == 0 || i > self.grid.nx || j > self.grid.ny {
            0.0
        } else {
            self.grid.value(i - 1, j - 1)
        }
    }

    fn position(&self, i: usize, j: usize) -> CartesianPoint {
        CartesianPoint::new(
            self.grid.x0 + (i as f64 - 1.0) * self.grid.dx,
            self.grid.y0 + (j as f64 - 1.0) * self.grid.dy,
        )
    }

    fn crossing(&self, edge: Edge, threshold: f64) -> CartesianPoint {
        let (i2, j2) = if edge.vertical { (edge.i, edge.j + 1) } else { (edge.i + 1, edge.j) };
        let (va, vb) = (self.value(edge.i, edge.j), self.value(i2, j2));
        let t = if vb != va { ((threshold - va) / (vb - va)).clamp(0.0, 1.0) } else { 0.5 };
        let (a, b) = (self.position(edge.i, edge.j), self.position(i2, j2));
        CartesianPoint::new(a.x + t * (b.x - a.x), a.y + t * (b.y - a.y))
    }
}

/// All closed iso-lines of `grid` at `threshold` (must be positive).
///
/// Ambiguous saddle cells are resolved with the cell-center average.
pub fn rings(grid: &DensityGrid, threshold: f64) -> Vec<Ring> {
    let padded = Padded { grid };
    let (cells_x, cells_y) = (grid.nx + 1, grid.ny + 1);

    let mut segments: Vec<(Edge, Edge)> = Vec::new();
    for j in 0..cells_y {
        for i in 0..cells_x {
            let v = [
                padded.value(i, j),
                padded.value(i + 1, j),
                padded.value(i + 1, j + 1),
                padded.value(i, j + 1),
            ];
            let case = v
                .iter()
                .enumerate()
                .fold(0u8, |acc, (bit, &x)| if x >= threshold { acc | (1 << bit) } else { acc });
            let bottom = Edge { i, j, vertical: false };
            let right = Edge { i: i + 1, j, vertical: true };
            let top = Edge { i, j: j + 1, vertical: false };
            let left = Edge { i, j, vertical: true };
            let center_inside = || v.iter().sum::<f64>() / 4.0 >= threshold;
            match case {
                1 | 14 => segments.push((left, bottom)),
                2 | 13 => segments.push((bottom, right)),
                3 | 12 => segments.push((left, right)),
                4 | 11 => segments.push((right, top)),
                6 | 9 => segments.push((bottom, top)),
                7 | 8 => segments.push((left, top)),
                5 => {
                    if center_inside() {
                        segments.push((bottom, right));
                        segments.push((top, left));
                    } else {
                        segments.push((left, bottom));
                        segments.push((right, top));
                    }
                }
                10 => {
                    if center_inside() {
                        segments.push((left, bottom));
                        segments.push((right, top));
                    } else {
                        segments.push((bottom, right));
                        segments.push((top, left));
                    }
                }
                _ => {}
            }
        }
    }

    let mut links: HashMap<Edge, SmallVec<[Edge; 2]>> = HashMap::with_capacity(segments.len() * 2);
    for &(a, b) in &segments {
        links.entry(a).or_default().push(b);
        links.entry(b).or_default().push(a);
    }

    let mut visited: HashSet<Edge> = HashSet::with_capacity(links.len());
    let mut out = Vec::new();
    for &(start, _) in &segments {
        if visited.contains(&start) {
            continue;
        }
        let mut points = Vec::new();
        let mut prev: Option<Edge> = None;
        let mut current = start;
        loop {
            visited.insert(current);
            points.push(padded.crossing(current, threshold));
            let next = links
                .get(&current)
                .and_then(|ns| ns.iter().copied().find(|n| Some(*n) != prev && !visited.contains(n)));
            match next {
                Some(n) => {
                    prev = Some(current);
                    current = n;
                }
                None => break,
            }
        }
        if points.len() >= 3 {
            out.push(Ring { points });
        }
    }
    tracing::debug!(threshold, rings = out.len(), "iso-lines extracted");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bump(nx: usize, centers: &[(f64, f64)]) -> DensityGrid {
        let d = 1.0 / (nx - 1) as f64;
        let mut values = vec![0.0; nx * nx];
        for j in 0..nx {
            for i in 0..nx {
                let (x, y) = (i as f64 * d, j as f64 * d);
                values[j * nx + i] = centers
                    .iter()
                    .map(|(cx, cy)| (-((x - cx).powi(2) + (y - cy).powi(2)) / 0.005).exp())
                    .sum();
            }
        }
        DensityGrid { x0: 0.0, y0: 0.0, dx: d, dy: d, nx, ny: nx, values }
    }

    #[test]
    fn test_single_bump_gives_one_ring() {
        let grid = bump(101, &[(0.5, 0.5)]);
        let rings = rings(&grid, 0.5);
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        assert!(ring.contains(&CartesianPoint::new(0.5, 0.5)));
        assert!(!ring.contains(&CartesianPoint::new(0.9, 0.9)));
        // exp(-r²/0.005) = 0.5 → r² = 0.005·ln 2
        let expected = std::f64::consts::PI * 0.005 * std::f64::consts::LN_2;
        assert!((ring.area() - expected).abs() / expected < 0.05, "area {}", ring.area());
    }

    #[test]
    fn test_two_bumps_two_rings() {
        let grid = bump(61, &[(0.25, 0.5), (0.75, 0.5)]);
        let rings = rings(&grid, 0.5);
        assert_eq!(rings.len(), 2);
        let near = rings.iter().find(|r| r.contains(&CartesianPoint::new(0.75, 0.5))).unwrap();
        assert!(near.distance(&CartesianPoint::new(0.25, 0.5)) > 0.3);
    }

    #[test]
    fn test_bump_on_border_still_closes() {
        let grid = bump(41, &[(0.0, 0.5)]);
        let rings = rings(&grid, 0.5);
        assert_eq!(rings.len(), 1);
        assert_eq!(rings[0].closed().first(), rings[0].closed().last());
    }

    #[test]
    fn test_ring_geometry() {
        let square = Ring {
            points: vec![
                CartesianPoint::new(0.0, 0.0),
                CartesianPoint::new(1.0, 0.0),
                CartesianPoint::new(1.0, 1.0),
                CartesianPoint::new(0.0, 1.0),
            ],
        };
        assert_eq!(square.signed_area(), 1.0);
        assert!(square.contains(&CartesianPoint::new(0.5, 0.5)));
        assert_eq!(square.distance(&CartesianPoint::new(2.0, 0.5)), 1.0);
        assert_eq!(square.distance(&CartesianPoint::new(0.5, 0.25)), 0.25);
    }
}
