//! # Molar Conversion
//!
//! Weight-percent oxide columns become molar proportions by dividing each
//! value by the molar mass of the column's formula. Formula parsing is a
//! pure function, like the rest of the pipeline.

pub mod elements;
pub mod formula;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

pub use formula::{parse, Composition};

use crate::Result;

/// Molar mass (g/mol) of `formula`. Total-iron `FeOT` is treated as `FeO`.
pub fn molar_mass(formula: &str) -> Result<f64> {
    let formula = formula.trim();
    let formula = if formula.eq_ignore_ascii_case("feot") { "FeO" } else { formula };
    Ok(parse(formula)?.mass())
}

/// Per-column formula assignment for a molar conversion.
///
/// Columns without an explicit entry use their own name as the formula,
/// which is what the oxide presets rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MolarConversion {
    #[serde(default)]
    pub formulas: HashMap<String, String>,
}

impl MolarConversion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_formula(mut self, column: impl Into<String>, formula: impl Into<String>) -> Self {
        self.formulas.insert(column.into(), formula.into());
        self
    }

    pub fn formula_for<'a>(&'a self, column: &'a str) -> &'a str {
        self.formulas.get(column).map(String::as_str).unwrap_or(column)
    }

    /// Multiplier turning a wt% value of `column` into a molar proportion.
    pub fn factor(&self, column: &str) -> Result<f64> {
        Ok(1.0 / molar_mass(self.formula_for(column))?)
    }
}
