//! Per-point colors from the composition itself: each RGB channel follows
//! one apex.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{Apex, TernaryPoint};

/// An sRGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
    }
}

/// Channel → apex assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApexColorMapping {
    pub red: Apex,
    pub green: Apex,
    pub blue: Apex,
}

impl Default for ApexColorMapping {
    fn default() -> Self {
        Self { red: Apex::Top, green: Apex::Left, blue: Apex::Right }
    }
}

impl ApexColorMapping {
    /// One color per point: the channel's apex value, min–max normalized
    /// over `points`, scaled to 0–255. A constant apex maps to 0.
    pub fn colors(&self, points: &[TernaryPoint]) -> Vec<Rgb> {
        let bounds = |apex: Apex| {
            points.iter().map(|p| p.get(apex)).fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)))
        };
        let channels = [self.red, self.green, self.blue].map(|apex| (apex, bounds(apex)));
        let level = |p: &TernaryPoint, (apex, (lo, hi)): (Apex, (f64, f64))| -> u8 {
            let span = hi - lo;
            if span > 0.0 {
                (((p.get(apex) - lo) / span) * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        };
        points
            .iter()
            .map(|p| Rgb { r: level(p, channels[0]), g: level(p, channels[1]), b: level(p, channels[2]) })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channels_follow_apices() {
        let points = [TernaryPoint::new(100.0, 0.0, 0.0), TernaryPoint::new(0.0, 50.0, 50.0), TernaryPoint::new(50.0, 50.0, 0.0)];
        let colors = ApexColorMapping::default().colors(&points);
        assert_eq!(colors[0], Rgb { r: 255, g: 0, b: 0 });
        assert_eq!(colors[1], Rgb { r: 0, g: 255, b: 255 });
        assert_eq!(colors[2], Rgb { r: 128, g: 255, b: 0 });
        assert_eq!(colors[2].to_string(), "rgb(128, 255, 0)");
    }

    #[test]
    fn test_constant_apex_is_zero() {
        let points = [TernaryPoint::new(20.0, 40.0, 40.0), TernaryPoint::new(20.0, 30.0, 50.0)];
        let colors = ApexColorMapping::default().colors(&points);
        assert!(colors.iter().all(|c| c.r == 0));
    }
}
