//! Property-based tests for the simplex transform.
//!
//! Verifies that:
//! - Every valid composition lands inside the triangle
//! - `to_ternary(to_cartesian(p))` recovers the normalized composition
//! - Clipping always yields a valid composition summing to 100

use proptest::prelude::*;
use ternary_rs::simplex::{self, EPSILON};
use ternary_rs::{CartesianPoint, TernaryPoint};

// =============================================================================
// STRATEGIES
// =============================================================================

/// Non-negative component, including exact zeros.
fn component() -> impl Strategy<Value = f64> {
    prop_oneof![1 => Just(0.0), 9 => 0.0..1000.0f64]
}

/// A composition with a strictly positive sum.
fn composition() -> impl Strategy<Value = TernaryPoint> {
    (component(), component(), component())
        .prop_filter("sum must be positive", |(t, l, r)| t + l + r > 1e-6)
        .prop_map(|(t, l, r)| TernaryPoint::new(t, l, r))
}

fn any_plane_point() -> impl Strategy<Value = CartesianPoint> {
    (-2.0..3.0f64, -2.0..3.0f64).prop_map(|(x, y)| CartesianPoint::new(x, y))
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Property: projection stays inside the closed triangle
    #[test]
    fn prop_projection_inside_triangle(p in composition()) {
        let c = simplex::project(&p).unwrap();
        prop_assert!(simplex::contains(&c, EPSILON), "{:?} -> {:?}", p, c);
    }

    /// Property: the inverse recovers the normalized composition
    #[test]
    fn prop_round_trip(p in composition()) {
        let c = simplex::project(&p).unwrap();
        let back = simplex::to_ternary(c.x, c.y);
        let expected = simplex::normalize(&p).unwrap();
        prop_assert!(back.approx_eq(&expected, 1e-9), "{:?} vs {:?}", back, expected);
    }

    /// Property: scaling a composition does not move its projection
    #[test]
    fn prop_scale_invariant(p in composition(), k in 0.01..100.0f64) {
        let a = simplex::project(&p).unwrap();
        let b = simplex::project(&TernaryPoint::new(p.top * k, p.left * k, p.right * k)).unwrap();
        prop_assert!(a.distance(&b) < 1e-9);
    }

    /// Property: clipped inversion of any plane point is a valid composition
    #[test]
    fn prop_clipped_inverse_valid(q in any_plane_point()) {
        let t = simplex::to_ternary_clipped(&q);
        prop_assert!(t.top >= 0.0 && t.left >= 0.0 && t.right >= 0.0, "{:?}", t);
        prop_assert!((t.sum() - 100.0).abs() < 1e-9);
        prop_assert!(simplex::contains(&simplex::clip_to_simplex(&q), EPSILON));
    }
}
