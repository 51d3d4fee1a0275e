//! Continuous mapping: one numeric column → one scalar per row, for
//! color (heatmap) or size (sizemap) encodings.
//!
//! Pipeline per call:
//! 1. extract the column (missing → NaN, excluded from the range)
//! 2. optional natural-log transform (non-positive input is an error)
//! 3. clip to the explicit bounds, else take the data extrema
//! 4. build the display-order permutation (sort or seeded shuffle)
//!
//! Step 4 never re-associates values with rows: `values[i]` always
//! belongs to `rows[i]`, `order` only says in which sequence to draw them.

pub mod rgb;
pub mod size;

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

pub use rgb::{ApexColorMapping, Rgb};
pub use size::SizeScale;

use crate::model::Dataset;
use crate::{Error, Result};

/// How the consumer renders the scalar.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingMode {
    #[default]
    Heatmap,
    Sizemap,
}

/// Draw order of the mapped rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMode {
    /// Dataset order.
    #[default]
    None,
    /// Low values drawn first, so high values end up on top.
    Ascending,
    /// High values drawn first, so low values end up on top.
    Descending,
    /// Seeded Fisher–Yates permutation.
    Shuffle,
}

/// Encoding configuration for one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousMapping {
    pub column: String,
    #[serde(default)]
    pub mode: MappingMode,
    #[serde(default)]
    pub sort: SortMode,
    #[serde(default)]
    pub log_transform: bool,
    /// Lower clip bound, in transformed space when `log_transform` is set.
    #[serde(default)]
    pub range_min: Option<f64>,
    #[serde(default)]
    pub range_max: Option<f64>,
    #[serde(default)]
    pub seed: u64,
    /// Marker size range for sizemaps.
    #[serde(default)]
    pub size_scale: Option<SizeScale>,
}

impl ContinuousMapping {
    pub fn new(column: impl Into<String>, mode: MappingMode) -> Self {
        Self {
            column: column.into(),
            mode,
            sort: SortMode::None,
            log_transform: false,
            range_min: None,
            range_max: None,
            seed: 0,
            size_scale: None,
        }
    }

    pub fn heatmap(column: impl Into<String>) -> Self {
        Self::new(column, MappingMode::Heatmap)
    }

    pub fn sizemap(column: impl Into<String>) -> Self {
        Self::new(column, MappingMode::Sizemap)
    }

    pub fn with_sort(mut self, sort: SortMode) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_log_transform(mut self, on: bool) -> Self {
        self.log_transform = on;
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.range_min = min;
        self.range_max = max;
        self
    }

    pub fn with_size_scale(mut self, scale: SizeScale) -> Self {
        self.size_scale = Some(scale);
        self
    }

    /// Check the configuration against a dataset; returns the column index.
    pub fn validate(&self, dataset: &Dataset) -> Result<usize> {
        let col = dataset.require_numeric(&self.column)?;
        for bound in [self.range_min, self.range_max].into_iter().flatten() {
            if !bound.is_finite() {
                return Err(Error::InvalidConfig(format!("range bound {bound} for '{}' is not finite", self.column)));
            }
        }
        if let (Some(lo), Some(hi)) = (self.range_min, self.range_max) {
            if lo >= hi {
                return Err(Error::InvalidConfig(format!(
                    "range_min ({lo}) must be below range_max ({hi}) for '{}'",
                    self.column
                )));
            }
        }
        if let Some(scale) = &self.size_scale {
            scale.validate()?;
        }
        Ok(col)
    }
}

/// Closed interval the scalars are mapped against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalarRange {
    pub min: f64,
    pub max: f64,
}

impl ScalarRange {
    /// Position of `v` inside the range, in [0, 1]. A collapsed range maps
    /// everything to 0; NaN stays NaN.
    pub fn position(&self, v: f64) -> f64 {
        let span = self.max - self.min;
        if v.is_nan() {
            f64::NAN
        } else if span > 0.0 {
            ((v - self.min) / span).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Output of `compute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedScalars {
    /// One scalar per input row, same order as the input. NaN marks a
    /// missing source value.
    pub values: Vec<f64>,
    /// Display-order permutation of `0..values.len()`.
    pub order: Vec<usize>,
    /// `None` when no row had a usable value and no bounds were given.
    pub range: Option<ScalarRange>,
}

impl MappedScalars {
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    /// Color-scale positions in [0, 1], aligned with `values`.
    pub fn normalized(&self) -> Vec<f64> {
        match self.range {
            Some(range) => self.values.iter().map(|&v| range.position(v)).collect(),
            None => vec![f64::NAN; self.values.len()],
        }
    }
}

/// Map `rows` of `dataset` through `mapping`.
pub fn compute(dataset: &Dataset, rows: &[usize], mapping: &ContinuousMapping) -> Result<MappedScalars> {
    let col = mapping.validate(dataset)?;

    let mut values: Vec<f64> = rows.iter().map(|&r| dataset.numeric(r, col).unwrap_or(f64::NAN)).collect();

    if mapping.log_transform {
        for (v, &row) in values.iter_mut().zip(rows) {
            if v.is_nan() {
                continue;
            }
            if *v <= 0.0 {
                return Err(Error::NonPositiveLogInput { column: mapping.column.clone(), row, value: *v });
            }
            *v = v.ln();
        }
    }

    let mut data_range: Option<(f64, f64)> = None;
    for &v in values.iter().filter(|v| !v.is_nan()) {
        data_range = Some(match data_range {
            Some((lo, hi)) => (lo.min(v), hi.max(v)),
            None => (v, v),
        });
    }

    if mapping.range_min.is_some() || mapping.range_max.is_some() {
        for v in values.iter_mut().filter(|v| !v.is_nan()) {
            if let Some(lo) = mapping.range_min {
                *v = v.max(lo);
            }
            if let Some(hi) = mapping.range_max {
                *v = v.min(hi);
            }
        }
    }

    let range = match (mapping.range_min, mapping.range_max, data_range) {
        (Some(min), Some(max), _) => Some(ScalarRange { min, max }),
        // The derived side never crosses the given bound.
        (Some(min), None, Some((_, hi))) => Some(ScalarRange { min, max: hi.max(min) }),
        (None, Some(max), Some((lo, _))) => Some(ScalarRange { min: lo.min(max), max }),
        (None, None, Some((lo, hi))) => Some(ScalarRange { min: lo, max: hi }),
        (_, _, None) => None,
    };

    let missing = values.iter().filter(|v| v.is_nan()).count();
    if missing > 0 {
        tracing::debug!(column = %mapping.column, missing, "mapping column has missing values");
    }

    let order = display_order(&values, mapping.sort, mapping.seed);
    tracing::debug!(column = %mapping.column, rows = values.len(), sort = ?mapping.sort, "continuous mapping computed");
    Ok(MappedScalars { values, order, range })
}

/// Permutation of `0..values.len()` for the given sort mode. Missing
/// values sort first so they are drawn underneath.
pub fn display_order(values: &[f64], sort: SortMode, seed: u64) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    let by_value = |descending: bool| {
        move |a: &usize, b: &usize| {
            let (x, y) = (values[*a], values[*b]);
            match (x.is_nan(), y.is_nan()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Less,
                (false, true) => Ordering::Greater,
                _ if descending => y.total_cmp(&x),
                _ => x.total_cmp(&y),
            }
        }
    };
    match sort {
        SortMode::None => {}
        SortMode::Ascending => order.sort_by(by_value(false)),
        SortMode::Descending => order.sort_by(by_value(true)),
        SortMode::Shuffle => {
            let mut rng = StdRng::seed_from_u64(seed);
            order.shuffle(&mut rng);
        }
    }
    order
}
