//! # ternary-rs: compositional data on ternary diagrams
//!
//! Turns tabular compositional data into renderable ternary geometry and
//! estimates bootstrap confidence regions around single compositions.
//!
//! ## Design Principles
//!
//! 1. **Pure pipeline**: dataset + configuration in, arrays out; no I/O, no hidden state
//! 2. **Clean DTOs**: `Dataset`, `TernaryPoint`, `Trace`, `ConfidenceContour` cross all boundaries
//! 3. **Explicit seeds**: shuffles and resampling are reproducible by construction
//! 4. **Renderer-agnostic**: output is points, scalars and strings, never plotting objects
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ternary_rs::{
//!     AxisSpec, BootstrapConfig, Dataset, Diagram, FilterOp, FilterRule,
//!     TraceConfig, UncertaintyModel, Value,
//! };
//!
//! # fn example() -> ternary_rs::Result<()> {
//! let data = Dataset::from_records(
//!     &["A", "B", "C"],
//!     vec![
//!         vec![Value::from(10.0), Value::from(30.0), Value::from(60.0)],
//!         vec![Value::from(20.0), Value::from(30.0), Value::from(50.0)],
//!     ],
//! )?;
//! let diagram = Diagram::new(data, AxisSpec::custom(["A"], ["B"], ["C"])?)?;
//!
//! let trace = diagram.trace(
//!     &TraceConfig::new("samples").with_filter(FilterRule::new("A", FilterOp::Gt { value: 15.0 })),
//! )?;
//! assert_eq!(trace.len(), 1);
//!
//! let anchor = diagram.anchor(1, None)?;
//! let contour = diagram.confidence_contour(
//!     &anchor,
//!     &UncertaintyModel::relative(5.0),
//!     &BootstrapConfig::new(0.95, 42),
//! )?;
//! println!("{} vertices, {}", contour.vertices.len(), contour.legend_label());
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! | Feature | Description |
//! |---------|-------------|
//! | (default) | Synchronous pipeline, cancellable bootstrap |
//! | `async` | `bootstrap::spawn` on tokio's blocking pool |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod simplex;
pub mod filter;
pub mod mapping;
pub mod molar;
pub mod trace;
pub mod density;
pub mod bootstrap;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Apex, ApexMember, AxisSpec, CartesianPoint, Column, ColumnType,
    Dataset, TernaryPoint, TernaryPreset, Value,
};

// ============================================================================
// Re-exports: Pipeline
// ============================================================================

pub use filter::{Bounds, FilterMask, FilterOp, FilterRule};
pub use mapping::{
    ApexColorMapping, ContinuousMapping, MappedScalars, MappingMode,
    Rgb, ScalarRange, SizeScale, SortMode,
};
pub use molar::MolarConversion;
pub use trace::{Trace, TraceConfig, TraceStats};

// ============================================================================
// Re-exports: Density & Bootstrap
// ============================================================================

pub use density::{Bandwidth, DensityConfig, DensityContour};
pub use bootstrap::{
    AnchorPoint, BootstrapConfig, CancelToken, ConfidenceContour, ConfidenceLevel,
    NoiseShape, Uncertainty, UncertaintyModel, ONE_SIGMA, TWO_SIGMA,
};

// ============================================================================
// Top-level Diagram handle
// ============================================================================

/// The primary entry point. A `Diagram` owns a dataset and the apex
/// assignment, and runs the pipeline against them.
#[derive(Debug, Clone)]
pub struct Diagram {
    dataset: Dataset,
    axes: AxisSpec,
}

impl Diagram {
    /// Create a diagram; the axes must name numeric columns of `dataset`.
    pub fn new(dataset: Dataset, axes: AxisSpec) -> Result<Self> {
        axes.validate(&dataset)?;
        Ok(Self { dataset, axes })
    }

    pub fn from_preset(dataset: Dataset, preset: TernaryPreset) -> Result<Self> {
        Self::new(dataset, AxisSpec::from_preset(preset))
    }

    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn axes(&self) -> &AxisSpec {
        &self.axes
    }

    /// Change an apex column's scale factor.
    pub fn set_scale(&mut self, apex: Apex, column: &str, factor: f64) -> Result<()> {
        self.axes.set_scale(apex, column, factor)
    }

    /// Axis title for `apex`, including scale factors.
    pub fn apex_label(&self, apex: Apex) -> String {
        trace::apex_label(&self.axes, apex)
    }

    /// Assemble one trace.
    pub fn trace(&self, config: &TraceConfig) -> Result<Trace> {
        trace::assemble(&self.dataset, &self.axes, config)
    }

    /// Raw components of `row`, ready for bootstrap analysis.
    pub fn anchor(&self, row: usize, molar: Option<&MolarConversion>) -> Result<AnchorPoint> {
        if row >= self.dataset.len() {
            return Err(Error::InvalidConfig(format!("row {row} out of range ({} rows)", self.dataset.len())));
        }
        let resolver = trace::ComponentResolver::new(&self.dataset, &self.axes, molar)?;
        let (point, _) = resolver.resolve(&self.dataset, row);
        point.validate()?;
        Ok(AnchorPoint::from_row(point, row))
    }

    /// Bootstrap confidence region around `anchor`.
    pub fn confidence_contour(
        &self,
        anchor: &AnchorPoint,
        uncertainty: &UncertaintyModel,
        config: &BootstrapConfig,
    ) -> Result<ConfidenceContour> {
        bootstrap::generate(anchor, uncertainty, config)
    }

    /// Density contours over every point of `trace`. An empty `levels`
    /// slice selects the default 60/70/80 % set.
    pub fn density_contours(&self, trace: &Trace, levels: &[f64], config: &DensityConfig) -> Result<Vec<DensityContour>> {
        let levels = if levels.is_empty() { &density::DEFAULT_DENSITY_LEVELS[..] } else { levels };
        density::density_contours(&trace.positions, levels, config)
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid point ({top}, {left}, {right}): {reason}")]
    InvalidPoint { top: f64, left: f64, right: f64, reason: String },

    #[error("Filter rule {rule}: {message}")]
    FilterTypeError { rule: String, message: String },

    #[error("Filter on '{column}': bad operand '{operand}': {message}")]
    FilterOperandError { column: String, operand: String, message: String },

    #[error("Log transform of '{column}' needs positive values, row {row} has {value}")]
    NonPositiveLogInput { column: String, row: usize, value: f64 },

    #[error("Degenerate uncertainty: {0}")]
    DegenerateUncertainty(String),

    #[error("Confidence level {0} must lie strictly between 0 and 1")]
    InvalidConfidenceLevel(f64),

    #[error("Missing column: {0}")]
    MissingColumn(String),

    #[error("Type error in column '{column}': expected {expected}, got {got}")]
    TypeError { column: String, expected: String, got: String },

    #[error("Invalid formula '{formula}' at position {position}: {message}")]
    InvalidFormula { formula: String, position: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No contour found at the requested level")]
    ContourNotFound,

    #[error("Cancelled")]
    Cancelled,

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn diagram() -> Diagram {
        let data = Dataset::from_records(
            &["A", "B", "C", "label"],
            vec![
                vec![Value::from(10.0), Value::from(30.0), Value::from(60.0), Value::from("x")],
                vec![Value::from(0.0), Value::from(0.0), Value::from(0.0), Value::from("y")],
            ],
        )
        .unwrap();
        Diagram::new(data, AxisSpec::custom(["A"], ["B"], ["C"]).unwrap()).unwrap()
    }

    #[test]
    fn test_axes_validated_on_construction() {
        let d = diagram();
        let bad = AxisSpec::custom(["A"], ["B"], ["label"]).unwrap();
        assert!(matches!(Diagram::new(d.dataset().clone(), bad), Err(Error::TypeError { .. })));
        let preset = Diagram::from_preset(d.dataset().clone(), TernaryPreset::AcnK);
        assert!(matches!(preset, Err(Error::MissingColumn(_))));
    }

    #[test]
    fn test_anchor_from_row() {
        let d = diagram();
        let anchor = d.anchor(0, None).unwrap();
        assert_eq!(anchor.point, TernaryPoint::new(10.0, 30.0, 60.0));
        assert_eq!(anchor.row, Some(0));
        assert!(matches!(d.anchor(1, None), Err(Error::InvalidPoint { .. })));
        assert!(d.anchor(5, None).is_err());
    }

    #[test]
    fn test_apex_label_tracks_scale() {
        let mut d = diagram();
        d.set_scale(Apex::Top, "A", 3.0).unwrap();
        assert_eq!(d.apex_label(Apex::Top), "3×A");
        assert_eq!(d.apex_label(Apex::Left), "B");
    }
}
