//! # Density Estimation
//!
//! Gaussian KDE on a regular grid, probability-mass thresholds and
//! iso-line extraction. The bootstrap generator uses these for a single
//! point's confidence region; `density_contours` applies them to every
//! point of a trace.

pub mod contour;
pub mod kde;

use serde::{Deserialize, Serialize};

pub use contour::{rings, Ring};
pub use kde::{Bandwidth, DensityGrid, KernelDensity};

use crate::model::{CartesianPoint, TernaryPoint};
use crate::{simplex, Error, Result};

/// Mass levels drawn when a caller asks for "density contours" without
/// choosing any.
pub const DEFAULT_DENSITY_LEVELS: [f64; 3] = [0.60, 0.70, 0.80];

fn default_bandwidth_scale() -> f64 {
    2.0
}

fn default_grid_resolution() -> usize {
    100
}

fn default_padding() -> f64 {
    4.0
}

/// KDE and grid parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DensityConfig {
    #[serde(default)]
    pub bandwidth: Bandwidth,
    /// Multiplier on the rule's factor.
    #[serde(default = "default_bandwidth_scale")]
    pub bandwidth_scale: f64,
    /// Nodes per grid side.
    #[serde(default = "default_grid_resolution")]
    pub grid_resolution: usize,
    /// Grid margin around the samples, in kernel standard deviations
    /// (values below 1 are raised to 1).
    #[serde(default = "default_padding")]
    pub padding: f64,
}

impl Default for DensityConfig {
    fn default() -> Self {
        Self {
            bandwidth: Bandwidth::default(),
            bandwidth_scale: default_bandwidth_scale(),
            grid_resolution: default_grid_resolution(),
            padding: default_padding(),
        }
    }
}

impl DensityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.grid_resolution < 8 {
            return Err(Error::InvalidConfig(format!("grid resolution {} is below 8", self.grid_resolution)));
        }
        if !(self.bandwidth_scale.is_finite() && self.bandwidth_scale > 0.0) {
            return Err(Error::InvalidConfig(format!("bandwidth scale {} must be positive", self.bandwidth_scale)));
        }
        if let Bandwidth::Fixed(f) = self.bandwidth {
            if !(f.is_finite() && f > 0.0) {
                return Err(Error::InvalidConfig(format!("fixed bandwidth {f} must be positive")));
            }
        }
        if !(self.padding.is_finite() && self.padding >= 0.0) {
            return Err(Error::InvalidConfig(format!("grid padding {} must be non-negative", self.padding)));
        }
        Ok(())
    }

    /// Fit a density to `points` and grid it.
    pub fn estimate(&self, points: &[CartesianPoint]) -> Result<DensityGrid> {
        let kde = KernelDensity::fit(points, self.bandwidth, self.bandwidth_scale)?;
        kde.grid(self.grid_resolution, self.padding)
    }
}

/// Check a mass level lies strictly inside (0, 1).
pub fn check_level(level: f64) -> Result<f64> {
    if level.is_finite() && level > 0.0 && level < 1.0 {
        Ok(level)
    } else {
        Err(Error::InvalidConfidenceLevel(level))
    }
}

/// Iso-line threshold for `level`, kept strictly positive so every ring
/// closes inside the zero-padded grid.
pub fn threshold_for(grid: &DensityGrid, level: f64) -> f64 {
    let floor = grid.max() * 1e-12;
    grid.mass_threshold(level).max(floor).max(f64::MIN_POSITIVE)
}

/// All rings enclosing one mass level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DensityContour {
    pub level: f64,
    pub threshold: f64,
    /// Closed rings (first vertex repeated), clipped onto the simplex.
    pub rings: Vec<Vec<TernaryPoint>>,
}

/// Density contours over a point cloud, one entry per level in
/// ascending order.
pub fn density_contours(points: &[CartesianPoint], levels: &[f64], config: &DensityConfig) -> Result<Vec<DensityContour>> {
    config.validate()?;
    let mut levels = levels.iter().map(|&l| check_level(l)).collect::<Result<Vec<_>>>()?;
    levels.sort_by(f64::total_cmp);
    levels.dedup();

    let grid = config.estimate(points)?;
    let out: Vec<DensityContour> = levels
        .into_iter()
        .map(|level| {
            let threshold = threshold_for(&grid, level);
            let rings = rings(&grid, threshold)
                .iter()
                .map(|ring| ring.closed().iter().map(simplex::to_ternary_clipped).collect())
                .collect();
            DensityContour { level, threshold, rings }
        })
        .collect();
    tracing::debug!(points = points.len(), levels = out.len(), "density contours computed");
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cloud() -> Vec<CartesianPoint> {
        // Deterministic lattice around (0.5, 0.3).
        (0..30)
            .flat_map(|i| (0..30).map(move |j| (i, j)))
            .map(|(i, j)| CartesianPoint::new(0.45 + i as f64 * 0.0035, 0.25 + j as f64 * 0.0035))
            .collect()
    }

    #[test]
    fn test_levels_validated() {
        let cfg = DensityConfig::default();
        assert!(matches!(density_contours(&cloud(), &[0.5, 1.0], &cfg), Err(Error::InvalidConfidenceLevel(_))));
        assert!(matches!(density_contours(&cloud(), &[0.0], &cfg), Err(Error::InvalidConfidenceLevel(_))));
    }

    #[test]
    fn test_contours_sorted_and_nested() {
        let cfg = DensityConfig { grid_resolution: 48, ..DensityConfig::default() };
        let out = density_contours(&cloud(), &[0.8, 0.6, 0.7], &cfg).unwrap();
        let levels: Vec<f64> = out.iter().map(|c| c.level).collect();
        assert_eq!(levels, vec![0.6, 0.7, 0.8]);
        assert!(out[0].threshold > out[2].threshold);
        for contour in &out {
            assert_eq!(contour.rings.len(), 1);
            for p in &contour.rings[0] {
                assert!((p.sum() - 100.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn test_config_validation() {
        let bad = DensityConfig { grid_resolution: 4, ..DensityConfig::default() };
        assert!(bad.validate().is_err());
        let bad = DensityConfig { bandwidth: Bandwidth::Fixed(0.0), ..DensityConfig::default() };
        assert!(bad.validate().is_err());
        let json: DensityConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(json, DensityConfig::default());
    }
}
