//! Simplex transform between ternary and Cartesian coordinates on a unit-side triangle.
//!
//! ```text
//!              Top (0.5, √3/2)
//!                 /\
//!                /  \
//!               /    \
//!  Left (0, 0) /______\ Right (1, 0)
//! ```
//!
//! Pure functions. Ternary outputs are normalized to sum to 100.

use crate::model::{CartesianPoint, TernaryPoint};
use crate::Result;

/// Height of the unit-side equilateral triangle, √3/2.
pub const HEIGHT: f64 = 0.866_025_403_784_438_6;

pub const LEFT_VERTEX: CartesianPoint = CartesianPoint::new(0.0, 0.0);
pub const RIGHT_VERTEX: CartesianPoint = CartesianPoint::new(1.0, 0.0);
pub const TOP_VERTEX: CartesianPoint = CartesianPoint::new(0.5, HEIGHT);

/// Default tolerance for `contains`, in barycentric fraction units.
pub const EPSILON: f64 = 1e-9;

/// Map a (top, left, right) composition to plotting coordinates.
///
/// The triple is normalized first; a zero-sum, negative or non-finite
/// triple fails with `InvalidPoint`.
pub fn to_cartesian(top: f64, left: f64, right: f64) -> Result<CartesianPoint> {
    project(&TernaryPoint::new(top, left, right))
}

/// `to_cartesian` for a `TernaryPoint`.
pub fn project(point: &TernaryPoint) -> Result<CartesianPoint> {
    point.validate()?;
    let sum = point.sum();
    let t = point.top / sum;
    let r = point.right / sum;
    Ok(CartesianPoint::new(r + t / 2.0, t * HEIGHT))
}

/// Scale a composition to sum 100.
pub fn normalize(point: &TernaryPoint) -> Result<TernaryPoint> {
    point.normalized()
}

/// Inverse of `to_cartesian`. Points outside the triangle come back with
/// negative components; use `to_ternary_clipped` when that matters.
pub fn to_ternary(x: f64, y: f64) -> TernaryPoint {
    let t = y / HEIGHT;
    let r = x - t / 2.0;
    let l = 1.0 - t - r;
    TernaryPoint::new(t * 100.0, l * 100.0, r * 100.0)
}

/// Whether a Cartesian point lies inside or on the triangle.
pub fn contains(point: &CartesianPoint, tol: f64) -> bool {
    let t = to_ternary(point.x, point.y);
    let tol = tol * 100.0;
    t.top >= -tol && t.left >= -tol && t.right >= -tol
}

/// Nearest point of the closed triangle.
pub fn clip_to_simplex(point: &CartesianPoint) -> CartesianPoint {
    if contains(point, 0.0) {
        return *point;
    }
    [
        closest_on_segment(point, &LEFT_VERTEX, &RIGHT_VERTEX),
        closest_on_segment(point, &RIGHT_VERTEX, &TOP_VERTEX),
        closest_on_segment(point, &TOP_VERTEX, &LEFT_VERTEX),
    ]
    .into_iter()
    .min_by(|a, b| point.distance(a).total_cmp(&point.distance(b)))
    .unwrap_or(*point)
}

/// Clip onto the triangle, invert, and scrub rounding noise so every
/// component is non-negative and the triple sums to 100.
pub fn to_ternary_clipped(point: &CartesianPoint) -> TernaryPoint {
    let clipped = clip_to_simplex(point);
    let raw = to_ternary(clipped.x, clipped.y);
    let top = raw.top.max(0.0);
    let left = raw.left.max(0.0);
    let right = raw.right.max(0.0);
    let sum = top + left + right;
    TernaryPoint::new(top * 100.0 / sum, left * 100.0 / sum, right * 100.0 / sum)
}

fn closest_on_segment(p: &CartesianPoint, a: &CartesianPoint, b: &CartesianPoint) -> CartesianPoint {
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let len2 = dx * dx + dy * dy;
    let s = (((p.x - a.x) * dx + (p.y - a.y) * dy) / len2).clamp(0.0, 1.0);
    CartesianPoint::new(a.x + s * dx, a.y + s * dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    #[test]
    fn test_vertices() {
        assert_eq!(to_cartesian(100.0, 0.0, 0.0).unwrap(), TOP_VERTEX);
        assert_eq!(to_cartesian(0.0, 100.0, 0.0).unwrap(), LEFT_VERTEX);
        assert_eq!(to_cartesian(0.0, 0.0, 1.0).unwrap(), RIGHT_VERTEX);
    }

    #[test]
    fn test_round_trip_normalizes() {
        let c = to_cartesian(2.0, 3.0, 5.0).unwrap();
        let t = to_ternary(c.x, c.y);
        assert!(t.approx_eq(&TernaryPoint::new(20.0, 30.0, 50.0), 1e-9));
    }

    #[test]
    fn test_degenerate_input() {
        assert!(matches!(to_cartesian(0.0, 0.0, 0.0), Err(Error::InvalidPoint { .. })));
    }

    #[test]
    fn test_clip_below_base() {
        let p = CartesianPoint::new(0.3, -0.2);
        let clipped = clip_to_simplex(&p);
        assert!((clipped.x - 0.3).abs() < 1e-12);
        assert!(clipped.y.abs() < 1e-12);
        let t = to_ternary_clipped(&p);
        assert_eq!(t.top, 0.0);
        assert!((t.sum() - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_clip_beyond_vertex() {
        let clipped = clip_to_simplex(&CartesianPoint::new(1.5, -0.5));
        assert!(clipped.distance(&RIGHT_VERTEX) < 1e-12);
    }

    #[test]
    fn test_contains() {
        assert!(contains(&CartesianPoint::new(0.5, 0.3), EPSILON));
        assert!(contains(&TOP_VERTEX, EPSILON));
        assert!(!contains(&CartesianPoint::new(0.0, 0.5), EPSILON));
        let inside = CartesianPoint::new(0.4, 0.2);
        assert_eq!(clip_to_simplex(&inside), inside);
    }
}
