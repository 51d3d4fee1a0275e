//! Points on and around the ternary simplex.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// One corner of the ternary triangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Apex {
    Top,
    Left,
    Right,
}

impl Apex {
    pub const ALL: [Apex; 3] = [Apex::Top, Apex::Left, Apex::Right];
}

impl std::fmt::Display for Apex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Apex::Top => write!(f, "top"),
            Apex::Left => write!(f, "left"),
            Apex::Right => write!(f, "right"),
        }
    }
}

/// A (top, left, right) composition.
///
/// Raw points carry whatever magnitudes the source columns had; the
/// normalized form sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TernaryPoint {
    pub top: f64,
    pub left: f64,
    pub right: f64,
}

impl TernaryPoint {
    pub const fn new(top: f64, left: f64, right: f64) -> Self {
        Self { top, left, right }
    }

    pub fn sum(&self) -> f64 {
        self.top + self.left + self.right
    }

    pub fn get(&self, apex: Apex) -> f64 {
        match apex {
            Apex::Top => self.top,
            Apex::Left => self.left,
            Apex::Right => self.right,
        }
    }

    pub fn set(&mut self, apex: Apex, value: f64) {
        match apex {
            Apex::Top => self.top = value,
            Apex::Left => self.left = value,
            Apex::Right => self.right = value,
        }
    }

    /// Check the point can be normalized: finite, non-negative, positive sum.
    pub fn validate(&self) -> Result<()> {
        let reason = if !(self.top.is_finite() && self.left.is_finite() && self.right.is_finite()) {
            Some("non-finite component")
        } else if self.top < 0.0 || self.left < 0.0 || self.right < 0.0 {
            Some("negative component")
        } else if self.sum() <= 0.0 {
            Some("components sum to zero")
        } else {
            None
        };
        match reason {
            Some(reason) => Err(Error::InvalidPoint {
                top: self.top,
                left: self.left,
                right: self.right,
                reason: reason.into(),
            }),
            None => Ok(()),
        }
    }

    /// Scale so the components sum to 100.
    pub fn normalized(&self) -> Result<TernaryPoint> {
        self.validate()?;
        let k = 100.0 / self.sum();
        Ok(TernaryPoint::new(self.top * k, self.left * k, self.right * k))
    }

    /// Component-wise closeness, for tests and contour bookkeeping.
    pub fn approx_eq(&self, other: &TernaryPoint, tol: f64) -> bool {
        (self.top - other.top).abs() <= tol
            && (self.left - other.left).abs() <= tol
            && (self.right - other.right).abs() <= tol
    }
}

/// A position in plotting space (unit-side triangle).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CartesianPoint {
    pub x: f64,
    pub y: f64,
}

impl CartesianPoint {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &CartesianPoint) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}
