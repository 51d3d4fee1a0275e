//! Apex assignment: which source columns feed which corner.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use super::{Apex, ColumnType, Dataset};
use crate::{Error, Result};

fn unit_scale() -> f64 {
    1.0
}

/// One source column contributing to an apex, with its scale factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApexMember {
    pub column: String,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

impl ApexMember {
    pub fn new(column: impl Into<String>) -> Self {
        Self { column: column.into(), scale: 1.0 }
    }
}

/// Columns assigned to a single apex. Rarely more than a handful.
pub type ApexMembers = SmallVec<[ApexMember; 4]>;

/// Built-in oxide ternaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TernaryPreset {
    /// Al2O3 | CaO+Na2O+K2O | FeOT+MgO
    #[serde(rename = "Al2O3 | CaO+Na2O+K2O | FeOT+MgO")]
    AcnkFm,
    /// Al2O3 | CaO+Na2O | K2O
    #[serde(rename = "Al2O3 | CaO+Na2O | K2O")]
    AcnK,
    /// SiO2+Al2O3 | CaO+Na2O+K2O | FeOT+MgO
    #[serde(rename = "SiO2+Al2O3 | CaO+Na2O+K2O | FeOT+MgO")]
    SaCnkFm,
}

impl TernaryPreset {
    pub const ALL: [TernaryPreset; 3] = [TernaryPreset::AcnkFm, TernaryPreset::AcnK, TernaryPreset::SaCnkFm];

    pub fn name(&self) -> &'static str {
        match self {
            TernaryPreset::AcnkFm => "Al2O3 | CaO+Na2O+K2O | FeOT+MgO",
            TernaryPreset::AcnK => "Al2O3 | CaO+Na2O | K2O",
            TernaryPreset::SaCnkFm => "SiO2+Al2O3 | CaO+Na2O+K2O | FeOT+MgO",
        }
    }

    pub fn columns(&self, apex: Apex) -> &'static [&'static str] {
        match (self, apex) {
            (TernaryPreset::AcnkFm, Apex::Top) => &["Al2O3"],
            (TernaryPreset::AcnkFm, Apex::Left) => &["CaO", "Na2O", "K2O"],
            (TernaryPreset::AcnkFm, Apex::Right) => &["FeOT", "MgO"],
            (TernaryPreset::AcnK, Apex::Top) => &["Al2O3"],
            (TernaryPreset::AcnK, Apex::Left) => &["CaO", "Na2O"],
            (TernaryPreset::AcnK, Apex::Right) => &["K2O"],
            (TernaryPreset::SaCnkFm, Apex::Top) => &["SiO2", "Al2O3"],
            (TernaryPreset::SaCnkFm, Apex::Left) => &["CaO", "Na2O", "K2O"],
            (TernaryPreset::SaCnkFm, Apex::Right) => &["FeOT", "MgO"],
        }
    }
}

/// Assignment of source columns to the three apices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    /// The preset this spec came from; `None` for custom specs.
    #[serde(default)]
    pub preset: Option<TernaryPreset>,
    pub top: ApexMembers,
    pub left: ApexMembers,
    pub right: ApexMembers,
}

impl AxisSpec {
    pub fn from_preset(preset: TernaryPreset) -> Self {
        let members = |apex: Apex| -> ApexMembers {
            preset.columns(apex).iter().map(|c| ApexMember::new(*c)).collect()
        };
        Self {
            preset: Some(preset),
            top: members(Apex::Top),
            left: members(Apex::Left),
            right: members(Apex::Right),
        }
    }

    /// A custom spec. Individual apices may be empty (they contribute zero),
    /// but not all three.
    pub fn custom<T, L, R, S>(top: T, left: L, right: R) -> Result<Self>
    where
        T: IntoIterator<Item = S>,
        L: IntoIterator<Item = S>,
        R: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let spec = Self {
            preset: None,
            top: top.into_iter().map(ApexMember::new).collect(),
            left: left.into_iter().map(ApexMember::new).collect(),
            right: right.into_iter().map(ApexMember::new).collect(),
        };
        if spec.top.is_empty() && spec.left.is_empty() && spec.right.is_empty() {
            return Err(Error::InvalidConfig("axis spec has no columns on any apex".into()));
        }
        Ok(spec)
    }

    pub fn members(&self, apex: Apex) -> &[ApexMember] {
        match apex {
            Apex::Top => &self.top,
            Apex::Left => &self.left,
            Apex::Right => &self.right,
        }
    }

    fn members_mut(&mut self, apex: Apex) -> &mut ApexMembers {
        match apex {
            Apex::Top => &mut self.top,
            Apex::Left => &mut self.left,
            Apex::Right => &mut self.right,
        }
    }

    /// Set the scale factor of `column` on `apex`.
    pub fn set_scale(&mut self, apex: Apex, column: &str, factor: f64) -> Result<()> {
        check_scale(column, factor)?;
        let member = self
            .members_mut(apex)
            .iter_mut()
            .find(|m| m.column == column)
            .ok_or_else(|| Error::MissingColumn(format!("{column} (not assigned to the {apex} apex)")))?;
        member.scale = factor;
        Ok(())
    }

    pub fn with_scale(mut self, apex: Apex, column: &str, factor: f64) -> Result<Self> {
        self.set_scale(apex, column, factor)?;
        Ok(self)
    }

    /// All apex columns in top, left, right order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        Apex::ALL.into_iter().flat_map(move |a| self.members(a).iter().map(|m| m.column.as_str()))
    }

    /// Scale factor shown next to a column name, if any member scales it.
    pub fn scale_of(&self, column: &str) -> Option<f64> {
        Apex::ALL
            .into_iter()
            .flat_map(|a| self.members(a))
            .find(|m| m.column == column && m.scale != 1.0)
            .map(|m| m.scale)
    }

    /// Check every column exists and is numeric, and every factor is usable.
    pub fn validate(&self, dataset: &Dataset) -> Result<()> {
        if self.columns().next().is_none() {
            return Err(Error::InvalidConfig("axis spec has no columns on any apex".into()));
        }
        for apex in Apex::ALL {
            for member in self.members(apex) {
                check_scale(&member.column, member.scale)?;
                let col = dataset
                    .column(&member.column)
                    .ok_or_else(|| Error::MissingColumn(member.column.clone()))?;
                if col.kind != ColumnType::Numeric {
                    return Err(Error::TypeError {
                        column: member.column.clone(),
                        expected: ColumnType::Numeric.to_string(),
                        got: col.kind.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

fn check_scale(column: &str, factor: f64) -> Result<()> {
    if factor.is_finite() && factor >= 0.0 {
        Ok(())
    } else {
        Err(Error::InvalidConfig(format!("scale factor {factor} for column '{column}' must be finite and non-negative")))
    }
}
