//! Hover text and axis labels.

use crate::model::{Apex, AxisSpec, Dataset, Value};
use crate::{Error, Result};

/// Line separator understood by HTML-ish renderers.
pub const LINE_BREAK: &str = "<br>";

/// Round to `places` decimals and drop trailing zeros: `12.30000` → `12.3`.
pub fn format_decimal(value: f64, places: usize) -> String {
    if !value.is_finite() {
        return "NaN".into();
    }
    let mut s = format!("{value:.places$}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" { "0".into() } else { s }
}

/// Scale prefix shown before a column name, e.g. `2.5×`.
pub fn format_scale_factor(factor: f64) -> String {
    format!("{}×", format_decimal(factor, 4))
}

/// Plain-text apex label: `Al2O3`, `CaO+Na2O`, `2×(CaO+Na2O)` when all
/// members share a factor, `2×CaO+Na2O` when they differ.
pub fn apex_label(axes: &AxisSpec, apex: Apex) -> String {
    let members = axes.members(apex);
    let Some(first) = members.first() else { return String::new() };
    let names: Vec<&str> = members.iter().map(|m| m.column.as_str()).collect();
    if members.iter().all(|m| m.scale == first.scale) {
        if first.scale == 1.0 {
            names.join("+")
        } else if names.len() == 1 {
            format!("{}{}", format_scale_factor(first.scale), names[0])
        } else {
            format!("{}({})", format_scale_factor(first.scale), names.join("+"))
        }
    } else {
        members
            .iter()
            .map(|m| if m.scale == 1.0 { m.column.clone() } else { format!("{}{}", format_scale_factor(m.scale), m.column) })
            .collect::<Vec<_>>()
            .join("+")
    }
}

/// Resolved hover columns for one trace.
#[derive(Debug, Clone)]
pub struct HoverFormatter {
    columns: Vec<HoverColumn>,
}

#[derive(Debug, Clone)]
struct HoverColumn {
    index: usize,
    label: String,
    scale: f64,
}

impl HoverFormatter {
    /// Resolve `names` against the dataset. Apex columns carrying a scale
    /// factor are shown scaled, with the factor in the label.
    pub fn new(dataset: &Dataset, axes: &AxisSpec, names: &[String]) -> Result<Self> {
        let columns = names
            .iter()
            .map(|name| {
                let index = dataset.column_index(name).ok_or_else(|| Error::MissingColumn(name.clone()))?;
                let (label, scale) = match axes.scale_of(name) {
                    Some(k) => (format!("{}{name}", format_scale_factor(k)), k),
                    None => (name.clone(), 1.0),
                };
                Ok(HoverColumn { index, label, scale })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { columns })
    }

    pub fn line(&self, dataset: &Dataset, row: usize) -> String {
        self.columns
            .iter()
            .map(|c| {
                let value = match dataset.value(row, c.index) {
                    v if v.is_missing() => "NaN".to_string(),
                    Value::String(s) => s.clone(),
                    v => match v.as_float() {
                        Some(x) => format_decimal(x * c.scale, 4),
                        None => v.to_string(),
                    },
                };
                format!("{}: {value}", c.label)
            })
            .collect::<Vec<_>>()
            .join(LINE_BREAK)
    }
}
