//! Marker sizes for sizemap encodings.

use serde::{Deserialize, Serialize};

use super::MappedScalars;
use crate::{Error, Result};

fn default_min_size() -> f64 {
    4.0
}

fn default_max_size() -> f64 {
    20.0
}

/// Marker diameter range a sizemap is stretched over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizeScale {
    #[serde(default = "default_min_size")]
    pub min_size: f64,
    #[serde(default = "default_max_size")]
    pub max_size: f64,
}

impl Default for SizeScale {
    fn default() -> Self {
        Self { min_size: default_min_size(), max_size: default_max_size() }
    }
}

impl SizeScale {
    pub fn new(min_size: f64, max_size: f64) -> Self {
        Self { min_size, max_size }
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_size.is_finite() && self.max_size.is_finite() && 0.0 <= self.min_size && self.min_size <= self.max_size && self.max_size > 0.0 {
            Ok(())
        } else {
            Err(Error::InvalidConfig(format!(
                "marker size range [{}, {}] must satisfy 0 <= min <= max, max > 0",
                self.min_size, self.max_size
            )))
        }
    }

    /// One marker size per mapped value. Missing values get `min_size`.
    pub fn sizes(&self, scalars: &MappedScalars) -> Vec<f64> {
        scalars
            .normalized()
            .into_iter()
            .map(|p| if p.is_nan() { self.min_size } else { self.min_size + p * (self.max_size - self.min_size) })
            .collect()
    }

    /// Plotly-style `sizeref` for area-scaled markers: `2·max(size)/max_size²`.
    pub fn sizeref(&self, sizes: &[f64]) -> f64 {
        let largest = sizes.iter().copied().filter(|s| s.is_finite()).fold(0.0, f64::max);
        if largest == 0.0 {
            1.0
        } else {
            2.0 * largest / (self.max_size * self.max_size)
        }
    }
}
