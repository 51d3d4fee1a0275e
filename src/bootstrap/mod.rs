//! # Bootstrap Confidence Generator
//!
//! One anchor composition plus per-apex uncertainty → a closed contour
//! enclosing the requested probability mass of resampled variants.
//!
//! ```text
//! validate ─▶ perturb (seeded) ─▶ normalize + project ─▶ KDE grid
//!          ─▶ mass threshold ─▶ marching squares ─▶ pick ring ─▶ clip
//! ```
//!
//! Configuration is checked before any sampling. Each run is fully
//! determined by its seed.

pub mod sampling;
#[cfg(feature = "async")]
pub mod task;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

#[cfg(feature = "async")]
pub use task::{spawn, ContourTask};

use crate::density::{self, DensityConfig, Ring};
use crate::model::{Apex, CartesianPoint, TernaryPoint};
use crate::{simplex, Error, Result};

// ============================================================================
// Uncertainty
// ============================================================================

/// Standard deviation of one apex component.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Uncertainty {
    /// σ in component units.
    Absolute(f64),
    /// σ as a percentage of the component's raw value.
    Relative(f64),
}

impl Uncertainty {
    pub fn sigma(&self, component: f64) -> f64 {
        match *self {
            Uncertainty::Absolute(s) => s,
            Uncertainty::Relative(pct) => component.abs() * pct / 100.0,
        }
    }

    fn amount(&self) -> f64 {
        match *self {
            Uncertainty::Absolute(v) | Uncertainty::Relative(v) => v,
        }
    }
}

/// Distribution of the perturbations, scaled to the requested σ.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum NoiseShape {
    #[default]
    Gaussian,
    Uniform,
    /// Heavy-tailed; `dof` must exceed 2 for the variance to exist.
    StudentT { dof: f64 },
}

/// Per-apex uncertainty plus noise shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UncertaintyModel {
    pub top: Uncertainty,
    pub left: Uncertainty,
    pub right: Uncertainty,
    #[serde(default)]
    pub shape: NoiseShape,
}

impl UncertaintyModel {
    pub fn per_apex(top: Uncertainty, left: Uncertainty, right: Uncertainty) -> Self {
        Self { top, left, right, shape: NoiseShape::Gaussian }
    }

    /// Same relative uncertainty (percent) on every apex.
    pub fn relative(percent: f64) -> Self {
        let u = Uncertainty::Relative(percent);
        Self::per_apex(u, u, u)
    }

    /// Same absolute σ on every apex.
    pub fn absolute(sigma: f64) -> Self {
        let u = Uncertainty::Absolute(sigma);
        Self::per_apex(u, u, u)
    }

    pub fn with_shape(mut self, shape: NoiseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn get(&self, apex: Apex) -> Uncertainty {
        match apex {
            Apex::Top => self.top,
            Apex::Left => self.left,
            Apex::Right => self.right,
        }
    }

    /// σ for `apex` given its raw component value.
    pub fn sigma(&self, apex: Apex, component: f64) -> f64 {
        self.get(apex).sigma(component)
    }

    pub fn validate(&self) -> Result<()> {
        for apex in Apex::ALL {
            let amount = self.get(apex).amount();
            if !(amount.is_finite() && amount >= 0.0) {
                return Err(Error::InvalidConfig(format!("{apex} uncertainty {amount} must be finite and non-negative")));
            }
        }
        if let NoiseShape::StudentT { dof } = self.shape {
            if !(dof.is_finite() && dof > 2.0) {
                return Err(Error::InvalidConfig(format!("Student-t noise needs dof > 2, got {dof}")));
            }
        }
        Ok(())
    }
}

/// The composition under analysis, as raw (un-normalized) components.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPoint {
    pub point: TernaryPoint,
    /// Dataset row it came from, if any.
    #[serde(default)]
    pub row: Option<usize>,
}

impl AnchorPoint {
    pub fn new(point: TernaryPoint) -> Self {
        Self { point, row: None }
    }

    pub fn from_row(point: TernaryPoint, row: usize) -> Self {
        Self { point, row: Some(row) }
    }
}

// ============================================================================
// Confidence level
// ============================================================================

/// Probability mass a contour encloses, strictly inside (0, 1).
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ConfidenceLevel(f64);

/// Mass within one standard deviation of a normal distribution.
pub const ONE_SIGMA: ConfidenceLevel = ConfidenceLevel(0.6827);
/// Mass within two standard deviations.
pub const TWO_SIGMA: ConfidenceLevel = ConfidenceLevel(0.9545);

impl ConfidenceLevel {
    pub fn new(level: f64) -> Result<Self> {
        density::check_level(level).map(ConfidenceLevel)
    }

    /// Accepts either a fraction or a percentage: values above 1 are
    /// divided by 100, so `95.0` and `0.95` agree.
    pub fn from_percent(value: f64) -> Result<Self> {
        Self::new(if value > 1.0 { value / 100.0 } else { value })
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Legend text: `1-sigma (68.27%)`, `2-sigma (95.45%)` or `90%`.
    pub fn label(&self) -> String {
        let pct = crate::trace::format_decimal(self.0 * 100.0, 2);
        if *self == ONE_SIGMA {
            format!("1-sigma ({pct}%)")
        } else if *self == TWO_SIGMA {
            format!("2-sigma ({pct}%)")
        } else {
            format!("{pct}%")
        }
    }
}

impl TryFrom<f64> for ConfidenceLevel {
    type Error = Error;
    fn try_from(v: f64) -> Result<Self> { ConfidenceLevel::new(v) }
}

impl From<ConfidenceLevel> for f64 {
    fn from(v: ConfidenceLevel) -> f64 { v.0 }
}

// ============================================================================
// Configuration
// ============================================================================

fn default_level() -> f64 {
    ONE_SIGMA.value()
}

fn default_samples() -> usize {
    5000
}

fn default_min_samples() -> usize {
    100
}

/// Bootstrap parameters. The level is kept as a plain number so a bad
/// value can be reported as `InvalidConfidenceLevel` before any work.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BootstrapConfig {
    #[serde(default = "default_level")]
    pub level: f64,
    #[serde(default = "default_samples")]
    pub samples: usize,
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default)]
    pub seed: u64,
    #[serde(flatten)]
    pub density: DensityConfig,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            samples: default_samples(),
            min_samples: default_min_samples(),
            seed: 0,
            density: DensityConfig::default(),
        }
    }
}

impl BootstrapConfig {
    pub fn new(level: f64, seed: u64) -> Self {
        Self { level, seed, ..Self::default() }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_level(mut self, level: impl Into<f64>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_samples(mut self, samples: usize) -> Self {
        self.samples = samples;
        self
    }

    pub fn with_density(mut self, density: DensityConfig) -> Self {
        self.density = density;
        self
    }

    pub fn validate(&self) -> Result<ConfidenceLevel> {
        let level = ConfidenceLevel::new(self.level)?;
        if self.min_samples == 0 {
            return Err(Error::InvalidConfig("min_samples must be at least 1".into()));
        }
        if self.samples < self.min_samples {
            return Err(Error::InvalidConfig(format!(
                "samples ({}) must be at least min_samples ({})",
                self.samples, self.min_samples
            )));
        }
        self.density.validate()?;
        Ok(level)
    }
}

// ============================================================================
// Cancellation
// ============================================================================

/// Shared flag checked between phases and periodically while sampling.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn check(&self) -> Result<()> {
        if self.is_cancelled() { Err(Error::Cancelled) } else { Ok(()) }
    }
}

// ============================================================================
// Output
// ============================================================================

/// A closed confidence region around one anchor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceContour {
    /// Ternary vertices, normalized, first vertex repeated at the end.
    pub vertices: Vec<TernaryPoint>,
    /// The same polygon in plotting coordinates.
    pub cartesian: Vec<CartesianPoint>,
    pub level: ConfidenceLevel,
    pub seed: u64,
    /// Density value of the iso-line.
    pub threshold: f64,
    pub samples_used: usize,
    /// False when no ring enclosed the anchor and the nearest was taken.
    pub contains_anchor: bool,
}

impl ConfidenceContour {
    pub fn area(&self) -> f64 {
        self.ring().area()
    }

    pub fn contains(&self, p: &CartesianPoint) -> bool {
        self.ring().contains(p)
    }

    pub fn legend_label(&self) -> String {
        self.level.label()
    }

    fn ring(&self) -> Ring {
        let mut points = self.cartesian.clone();
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Ring { points }
    }
}

/// Pick the ring for `anchor`: the largest one containing it, else the
/// nearest. The flag reports which case applied.
fn select_ring(rings: Vec<Ring>, anchor: &CartesianPoint) -> Option<(Ring, bool)> {
    let (containing, others): (Vec<Ring>, Vec<Ring>) = rings.into_iter().partition(|r| r.contains(anchor));
    if let Some(best) = containing.into_iter().max_by(|a, b| a.area().total_cmp(&b.area())) {
        return Some((best, true));
    }
    others
        .into_iter()
        .min_by(|a, b| a.distance(anchor).total_cmp(&b.distance(anchor)))
        .map(|r| (r, false))
}

/// Run the bootstrap to completion.
pub fn generate(anchor: &AnchorPoint, uncertainty: &UncertaintyModel, config: &BootstrapConfig) -> Result<ConfidenceContour> {
    generate_cancellable(anchor, uncertainty, config, &CancelToken::new())
}

/// `generate`, returning `Cancelled` as soon as `cancel` is observed.
pub fn generate_cancellable(
    anchor: &AnchorPoint,
    uncertainty: &UncertaintyModel,
    config: &BootstrapConfig,
    cancel: &CancelToken,
) -> Result<ConfidenceContour> {
    // Phase 0: configuration
    let level = config.validate()?;
    uncertainty.validate()?;
    let anchor_xy = simplex::project(&anchor.point)?;

    // Phase 1: perturb
    let draws = sampling::draw(&anchor.point, uncertainty, config.samples, config.seed, cancel)?;
    if draws.collapsed > 0 {
        tracing::debug!(collapsed = draws.collapsed, "bootstrap draws collapsed to zero");
    }
    let usable = draws.samples.len();
    if usable < config.min_samples {
        return Err(Error::DegenerateUncertainty(format!(
            "only {usable} of {} draws usable, need {}",
            config.samples, config.min_samples
        )));
    }
    cancel.check()?;

    // Phase 2: normalize + project
    let cartesian = draws.samples.iter().map(simplex::project).collect::<Result<Vec<_>>>()?;

    // Phase 3: density
    let grid = config.density.estimate(&cartesian)?;
    cancel.check()?;

    // Phase 4: threshold
    let threshold = density::threshold_for(&grid, level.value());
    tracing::debug!(samples = usable, threshold, level = level.value(), "bootstrap density thresholded");

    // Phase 5: contour
    let rings = density::rings(&grid, threshold);
    let ring_count = rings.len();
    let (ring, contains_anchor) = select_ring(rings, &anchor_xy).ok_or(Error::ContourNotFound)?;
    if !contains_anchor {
        tracing::warn!(rings = ring_count, "no contour encloses the anchor; using the nearest");
    }
    cancel.check()?;

    // Phase 6: back to the simplex
    let closed = ring.closed();
    let cartesian: Vec<CartesianPoint> = closed.iter().map(simplex::clip_to_simplex).collect();
    let vertices: Vec<TernaryPoint> = closed.iter().map(simplex::to_ternary_clipped).collect();

    Ok(ConfidenceContour {
        vertices,
        cartesian,
        level,
        seed: config.seed,
        threshold,
        samples_used: usable,
        contains_anchor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::Bandwidth;

    fn quick(level: f64, seed: u64) -> BootstrapConfig {
        BootstrapConfig::new(level, seed)
            .with_samples(1500)
            .with_density(DensityConfig { grid_resolution: 60, ..DensityConfig::default() })
    }

    fn center() -> AnchorPoint {
        AnchorPoint::new(TernaryPoint::new(33.3, 33.3, 33.4))
    }

    #[test]
    fn test_level_checked_before_sampling() {
        for bad in [0.0, 1.0, -0.2, f64::NAN] {
            let err = generate(&center(), &UncertaintyModel::relative(5.0), &quick(bad, 1)).unwrap_err();
            assert!(matches!(err, Error::InvalidConfidenceLevel(_)), "{bad}: {err}");
        }
    }

    #[test]
    fn test_invalid_configs() {
        let model = UncertaintyModel::relative(5.0);
        let cfg = quick(0.68, 1).with_samples(10);
        assert!(matches!(generate(&center(), &model, &cfg), Err(Error::InvalidConfig(_))));
        let zero = AnchorPoint::new(TernaryPoint::new(0.0, 0.0, 0.0));
        assert!(matches!(generate(&zero, &model, &quick(0.68, 1)), Err(Error::InvalidPoint { .. })));
        let neg = UncertaintyModel::absolute(-1.0);
        assert!(matches!(generate(&center(), &neg, &quick(0.68, 1)), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_uncertainty_is_degenerate() {
        let err = generate(&center(), &UncertaintyModel::relative(0.0), &quick(0.68, 1)).unwrap_err();
        assert!(matches!(err, Error::DegenerateUncertainty(_)));
    }

    #[test]
    fn test_contour_encloses_anchor() {
        let contour = generate(&center(), &UncertaintyModel::relative(5.0), &quick(0.68, 11)).unwrap();
        assert!(contour.contains_anchor);
        assert!(contour.contains(&simplex::project(&center().point).unwrap()));
        assert_eq!(contour.vertices.first(), contour.vertices.last());
        assert_eq!(contour.vertices.len(), contour.cartesian.len());
        assert!(contour.vertices.iter().all(|v| (v.sum() - 100.0).abs() < 1e-6));
        assert_eq!(contour.seed, 11);
        assert_eq!(contour.samples_used, 1500);
    }

    #[test]
    fn test_corner_anchor_is_clipped() {
        let anchor = AnchorPoint::new(TernaryPoint::new(98.0, 1.0, 1.0));
        let cfg = quick(0.95, 4).with_density(DensityConfig {
            grid_resolution: 60,
            bandwidth: Bandwidth::Scott,
            ..DensityConfig::default()
        });
        let contour = generate(&anchor, &UncertaintyModel::absolute(2.0), &cfg).unwrap();
        for v in &contour.vertices {
            assert!(v.top >= 0.0 && v.left >= 0.0 && v.right >= 0.0);
        }
        for p in &contour.cartesian {
            assert!(simplex::contains(p, 1e-9));
        }
    }

    #[test]
    fn test_edge_anchor_without_grid_padding() {
        let anchor = AnchorPoint::new(TernaryPoint::new(0.0, 50.0, 50.0));
        let cfg = BootstrapConfig::new(0.68, 1).with_samples(1500).with_density(DensityConfig {
            padding: 0.0,
            grid_resolution: 20,
            ..DensityConfig::default()
        });
        let contour = generate(&anchor, &UncertaintyModel::relative(5.0), &cfg).unwrap();
        assert!(!contour.vertices.is_empty());
        assert!(contour.vertices.iter().all(|v| v.top >= 0.0 && (v.sum() - 100.0).abs() < 1e-6));
    }

    #[test]
    fn test_default_level_is_one_sigma() {
        let cfg = BootstrapConfig::default();
        assert_eq!(cfg.validate().unwrap(), ONE_SIGMA);
        assert_eq!(cfg.validate().unwrap().label(), "1-sigma (68.27%)");
    }

    #[test]
    fn test_cancelled_token() {
        let token = CancelToken::new();
        token.cancel();
        let res = generate_cancellable(&center(), &UncertaintyModel::relative(5.0), &quick(0.68, 1), &token);
        assert!(matches!(res, Err(Error::Cancelled)));
    }

    #[test]
    fn test_confidence_levels() {
        assert_eq!(ConfidenceLevel::from_percent(95.0).unwrap().value(), 0.95);
        assert_eq!(ConfidenceLevel::from_percent(0.9).unwrap().value(), 0.9);
        assert!(ConfidenceLevel::from_percent(100.0).is_err());
        assert_eq!(ONE_SIGMA.label(), "1-sigma (68.27%)");
        assert_eq!(TWO_SIGMA.label(), "2-sigma (95.45%)");
        assert_eq!(ConfidenceLevel::new(0.9).unwrap().label(), "90%");
    }

    #[test]
    fn test_config_json() {
        let cfg = BootstrapConfig::from_json(r#"{"level": 0.95, "seed": 7, "grid_resolution": 64}"#).unwrap();
        assert_eq!(cfg.level, 0.95);
        assert_eq!(cfg.samples, 5000);
        assert_eq!(cfg.density.grid_resolution, 64);
        assert_eq!(cfg.density.bandwidth_scale, 2.0);
        assert_eq!(BootstrapConfig::from_json("{}").unwrap(), BootstrapConfig::default());
    }
}
