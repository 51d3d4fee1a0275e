//! Bivariate Gaussian kernel density estimate.
//!
//! The kernel covariance is `(factor · scale)² · Σ`, where `Σ` is the
//! sample covariance and `factor` comes from the bandwidth rule. Grid
//! evaluation bins the samples to the nearest node and scatters a
//! truncated kernel stencil from every occupied bin, which keeps the cost
//! proportional to grid size rather than sample count.

use serde::{Deserialize, Serialize};

use crate::model::CartesianPoint;
use crate::{Error, Result};

/// Kernel stencil cut-off, in Mahalanobis units.
const KERNEL_RADIUS: f64 = 4.0;

/// Smallest grid margin, in kernel standard deviations.
const MIN_PADDING: f64 = 1.0;

/// Bandwidth rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    /// `n^(-1/6)` in two dimensions.
    #[default]
    Scott,
    /// `(n·(d+2)/4)^(-1/(d+4))`; identical to Scott's rule for d = 2.
    Silverman,
    /// Fixed factor.
    Fixed(f64),
}

impl Bandwidth {
    pub fn factor(&self, n: usize) -> f64 {
        let n = n as f64;
        match *self {
            Bandwidth::Scott => n.powf(-1.0 / 6.0),
            Bandwidth::Silverman => (n * (2.0 + 2.0) / 4.0).powf(-1.0 / 6.0),
            Bandwidth::Fixed(f) => f,
        }
    }
}

/// A fitted density.
#[derive(Debug, Clone)]
pub struct KernelDensity {
    points: Vec<CartesianPoint>,
    /// Kernel covariance `[sxx, sxy, syy]`.
    cov: [f64; 3],
    /// Inverse kernel covariance `[ixx, ixy, iyy]`.
    inv: [f64; 3],
    /// `1 / (n · 2π · sqrt(det))`.
    norm: f64,
    factor: f64,
}

impl KernelDensity {
    /// Fit to `points`. Needs at least two points with spread in some
    /// direction; a covariance singular along one axis gets a small ridge.
    pub fn fit(points: &[CartesianPoint], bandwidth: Bandwidth, scale: f64) -> Result<Self> {
        let n = points.len();
        if n < 2 {
            return Err(Error::DegenerateUncertainty(format!("{n} samples cannot support a density estimate")));
        }
        let factor = bandwidth.factor(n) * scale;
        if !(factor.is_finite() && factor > 0.0) {
            return Err(Error::InvalidConfig(format!("bandwidth factor {factor} must be positive")));
        }

        let nf = n as f64;
        let (mx, my) = points.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        let (mx, my) = (mx / nf, my / nf);
        let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
        for p in points {
            let (dx, dy) = (p.x - mx, p.y - my);
            sxx += dx * dx;
            sxy += dx * dy;
            syy += dy * dy;
        }
        let (mut sxx, sxy, mut syy) = (sxx / (nf - 1.0), sxy / (nf - 1.0), syy / (nf - 1.0));

        let spread = sxx.max(syy);
        if spread <= f64::EPSILON * f64::EPSILON {
            return Err(Error::DegenerateUncertainty("samples have no spread".into()));
        }
        if sxx * syy - sxy * sxy <= spread * spread * 1e-9 {
            let ridge = spread * 1e-3;
            tracing::debug!(ridge, "near-singular sample covariance regularized");
            sxx += ridge;
            syy += ridge;
        }

        let f2 = factor * factor;
        let cov = [sxx * f2, sxy * f2, syy * f2];
        let det = cov[0] * cov[2] - cov[1] * cov[1];
        let inv = [cov[2] / det, -cov[1] / det, cov[0] / det];
        let norm = 1.0 / (nf * 2.0 * std::f64::consts::PI * det.sqrt());
        tracing::debug!(samples = n, factor, "kernel density fitted");

        Ok(Self { points: points.to_vec(), cov, inv, norm, factor })
    }

    pub fn len(&self) -> usize { self.points.len() }
    pub fn is_empty(&self) -> bool { self.points.is_empty() }
    pub fn factor(&self) -> f64 { self.factor }

    /// Kernel standard deviation along x and y.
    pub fn kernel_std(&self) -> (f64, f64) {
        (self.cov[0].sqrt(), self.cov[2].sqrt())
    }

    fn mahalanobis2(&self, dx: f64, dy: f64) -> f64 {
        self.inv[0] * dx * dx + 2.0 * self.inv[1] * dx * dy + self.inv[2] * dy * dy
    }

    /// Exact density at `p` (sums over every sample).
    pub fn evaluate(&self, p: &CartesianPoint) -> f64 {
        self.points
            .iter()
            .map(|s| (-0.5 * self.mahalanobis2(p.x - s.x, p.y - s.y)).exp())
            .sum::<f64>()
            * self.norm
    }

    /// Evaluate on a `resolution × resolution` grid over the sample
    /// bounding box padded by `padding` kernel standard deviations
    /// (never less than one).
    pub fn grid(&self, resolution: usize, padding: f64) -> Result<DensityGrid> {
        if resolution < 8 {
            return Err(Error::InvalidConfig(format!("grid resolution {resolution} is below 8")));
        }
        let (sx, sy) = self.kernel_std();
        let (mut x0, mut x1, mut y0, mut y1) = (f64::INFINITY, f64::NEG_INFINITY, f64::INFINITY, f64::NEG_INFINITY);
        for p in &self.points {
            x0 = x0.min(p.x);
            x1 = x1.max(p.x);
            y0 = y0.min(p.y);
            y1 = y1.max(p.y);
        }
        // At least one kernel std of margin, so a flat cloud still spans
        // a non-empty extent on both axes.
        let margin = padding.max(MIN_PADDING);
        let (x0, x1) = (x0 - margin * sx, x1 + margin * sx);
        let (y0, y1) = (y0 - margin * sy, y1 + margin * sy);
        let steps = (resolution - 1) as f64;
        let (dx, dy) = ((x1 - x0) / steps, (y1 - y0) / steps);
        if !(dx.is_finite() && dx > 0.0 && dy.is_finite() && dy > 0.0) {
            return Err(Error::DegenerateUncertainty(format!("density grid has zero extent (dx = {dx}, dy = {dy})")));
        }

        let mut counts = vec![0.0_f64; resolution * resolution];
        for p in &self.points {
            let i = (((p.x - x0) / dx).round() as usize).min(resolution - 1);
            let j = (((p.y - y0) / dy).round() as usize).min(resolution - 1);
            counts[j * resolution + i] += 1.0;
        }

        let rx = ((KERNEL_RADIUS * sx / dx).ceil() as isize).max(1);
        let ry = ((KERNEL_RADIUS * sy / dy).ceil() as isize).max(1);
        let width = (2 * rx + 1) as usize;
        let mut stencil = Vec::with_capacity(width * (2 * ry + 1) as usize);
        for sj in -ry..=ry {
            for si in -rx..=rx {
                let q = self.mahalanobis2(si as f64 * dx, sj as f64 * dy);
                stencil.push(if q <= KERNEL_RADIUS * KERNEL_RADIUS { (-0.5 * q).exp() } else { 0.0 });
            }
        }

        let res = resolution as isize;
        let mut values = vec![0.0_f64; resolution * resolution];
        for (cell, &count) in counts.iter().enumerate() {
            if count == 0.0 {
                continue;
            }
            let (ci, cj) = ((cell % resolution) as isize, (cell / resolution) as isize);
            for sj in -ry..=ry {
                let j = cj + sj;
                if !(0..res).contains(&j) {
                    continue;
                }
                let row = ((sj + ry) as usize) * width;
                for si in -rx..=rx {
                    let i = ci + si;
                    if !(0..res).contains(&i) {
                        continue;
                    }
                    let w = stencil[row + (si + rx) as usize];
                    if w > 0.0 {
                        values[(j * res + i) as usize] += count * w;
                    }
                }
            }
        }
        for v in &mut values {
            *v *= self.norm;
        }

        Ok(DensityGrid { x0, y0, dx, dy, nx: resolution, ny: resolution, values })
    }
}

/// Density sampled on a regular grid, row-major (`j * nx + i`).
#[derive(Debug, Clone, PartialEq)]
pub struct DensityGrid {
    pub x0: f64,
    pub y0: f64,
    pub dx: f64,
    pub dy: f64,
    pub nx: usize,
    pub ny: usize,
    pub values: Vec<f64>,
}

impl DensityGrid {
    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[j * self.nx + i]
    }

    pub fn node(&self, i: usize, j: usize) -> CartesianPoint {
        CartesianPoint::new(self.x0 + i as f64 * self.dx, self.y0 + j as f64 * self.dy)
    }

    pub fn max(&self) -> f64 {
        self.values.iter().copied().fold(0.0, f64::max)
    }

    /// Density of the node nearest `p`, zero outside the grid.
    pub fn nearest(&self, p: &CartesianPoint) -> f64 {
        let fi = ((p.x - self.x0) / self.dx).round();
        let fj = ((p.y - self.y0) / self.dy).round();
        if fi < 0.0 || fj < 0.0 || fi >= self.nx as f64 || fj >= self.ny as f64 {
            return 0.0;
        }
        self.value(fi as usize, fj as usize)
    }

    /// Density level enclosing `level` of the grid's total mass: node
    /// densities sorted descending, the first whose running sum reaches
    /// `level · total`.
    pub fn mass_threshold(&self, level: f64) -> f64 {
        let mut sorted = self.values.clone();
        sorted.sort_unstable_by(|a, b| b.total_cmp(a));
        let total: f64 = sorted.iter().sum();
        let target = level * total;
        let mut cumulative = 0.0;
        for &v in &sorted {
            cumulative += v;
            if cumulative >= target {
                return v;
            }
        }
        sorted.last().copied().unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn gaussian_cloud(n: usize, seed: u64) -> Vec<CartesianPoint> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| {
                let x: f64 = rng.sample(StandardNormal);
                let y: f64 = rng.sample(StandardNormal);
                CartesianPoint::new(0.5 + 0.02 * x, 0.3 + 0.01 * y)
            })
            .collect()
    }

    #[test]
    fn test_bandwidth_rules() {
        assert!((Bandwidth::Scott.factor(64) - 0.5).abs() < 1e-12);
        assert_eq!(Bandwidth::Scott.factor(1000), Bandwidth::Silverman.factor(1000));
        assert_eq!(Bandwidth::Fixed(0.3).factor(10), 0.3);
    }

    #[test]
    fn test_too_few_or_flat_samples() {
        let one = [CartesianPoint::new(0.1, 0.1)];
        assert!(matches!(KernelDensity::fit(&one, Bandwidth::Scott, 1.0), Err(Error::DegenerateUncertainty(_))));
        let flat = vec![CartesianPoint::new(0.1, 0.1); 20];
        assert!(matches!(KernelDensity::fit(&flat, Bandwidth::Scott, 1.0), Err(Error::DegenerateUncertainty(_))));
    }

    #[test]
    fn test_collinear_samples_are_regularized() {
        let line: Vec<_> = (0..50).map(|i| CartesianPoint::new(i as f64 * 0.01, 0.2)).collect();
        let kde = KernelDensity::fit(&line, Bandwidth::Scott, 1.0).unwrap();
        let (_, sy) = kde.kernel_std();
        assert!(sy > 0.0);
    }

    #[test]
    fn test_flat_cloud_without_padding() {
        let line: Vec<_> = (0..50).map(|i| CartesianPoint::new(0.2 + i as f64 * 0.01, 0.0)).collect();
        let kde = KernelDensity::fit(&line, Bandwidth::Scott, 2.0).unwrap();
        let grid = kde.grid(20, 0.0).unwrap();
        assert!(grid.dx > 0.0 && grid.dy > 0.0);
        assert!(grid.max().is_finite() && grid.max() > 0.0);
        let (_, sy) = kde.kernel_std();
        assert!(grid.y0 <= -sy * 0.999);
    }

    #[test]
    fn test_grid_peaks_near_mean() {
        let kde = KernelDensity::fit(&gaussian_cloud(2000, 1), Bandwidth::Scott, 1.0).unwrap();
        let grid = kde.grid(64, 4.0).unwrap();
        let center = grid.nearest(&CartesianPoint::new(0.5, 0.3));
        assert!((center - grid.max()).abs() / grid.max() < 0.2);
        assert_eq!(grid.nearest(&CartesianPoint::new(5.0, 5.0)), 0.0);
        // Grid mass approximates a unit integral.
        let mass: f64 = grid.values.iter().sum::<f64>() * grid.dx * grid.dy;
        assert!((mass - 1.0).abs() < 0.05, "mass {mass}");
        let exact = kde.evaluate(&CartesianPoint::new(0.5, 0.3));
        assert!((exact - center).abs() / exact < 0.2);
    }

    #[test]
    fn test_mass_threshold_monotone() {
        let kde = KernelDensity::fit(&gaussian_cloud(1000, 2), Bandwidth::Scott, 2.0).unwrap();
        let grid = kde.grid(48, 4.0).unwrap();
        let t68 = grid.mass_threshold(0.68);
        let t95 = grid.mass_threshold(0.95);
        assert!(t95 < t68);
        assert!(t68 < grid.max());
    }
}
