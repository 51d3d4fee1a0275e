//! # Trace Assembler
//!
//! Dataset + axes + trace configuration → one renderable layer.
//!
//! Every output array is aligned: the i-th point, position, encoding
//! value, hover string and source row all describe the same dataset row,
//! and all are emitted in display order.

pub mod components;
pub mod hover;

use serde::{Deserialize, Serialize};

pub use components::ComponentResolver;
pub use hover::{apex_label, format_decimal, format_scale_factor, HoverFormatter};

use crate::filter::{self, FilterRule};
use crate::mapping::{self, ApexColorMapping, ContinuousMapping, MappingMode, Rgb, ScalarRange};
use crate::model::{AxisSpec, CartesianPoint, Dataset, TernaryPoint};
use crate::molar::MolarConversion;
use crate::{simplex, Error, Result};

fn default_name() -> String {
    "Trace".into()
}

fn default_encoding() -> f64 {
    1.0
}

/// Everything that shapes one trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default)]
    pub filters: Vec<FilterRule>,
    #[serde(default)]
    pub mapping: Option<ContinuousMapping>,
    #[serde(default)]
    pub apex_colors: Option<ApexColorMapping>,
    #[serde(default)]
    pub molar: Option<MolarConversion>,
    /// `None` selects the default set: apex columns, then the mapping
    /// column, then filtered columns.
    #[serde(default)]
    pub hover_columns: Option<Vec<String>>,
    /// Encoding value used for every row when no mapping is configured.
    #[serde(default = "default_encoding")]
    pub constant_encoding: f64,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self::new(default_name())
    }
}

impl TraceConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filters: Vec::new(),
            mapping: None,
            apex_colors: None,
            molar: None,
            hover_columns: None,
            constant_encoding: default_encoding(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_filter(mut self, rule: FilterRule) -> Self {
        self.filters.push(rule);
        self
    }

    pub fn with_mapping(mut self, mapping: ContinuousMapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn with_apex_colors(mut self, colors: ApexColorMapping) -> Self {
        self.apex_colors = Some(colors);
        self
    }

    pub fn with_molar(mut self, molar: MolarConversion) -> Self {
        self.molar = Some(molar);
        self
    }

    pub fn with_hover_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.hover_columns = Some(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Hover columns to show, resolving the default set when none is configured.
    pub fn hover_columns(&self, axes: &AxisSpec) -> Vec<String> {
        if let Some(cols) = &self.hover_columns {
            return cols.clone();
        }
        let mut cols: Vec<String> = Vec::new();
        let candidates = axes
            .columns()
            .chain(self.mapping.iter().map(|m| m.column.as_str()))
            .chain(self.filters.iter().map(|r| r.column.as_str()));
        for name in candidates {
            if !cols.iter().any(|c| c == name) {
                cols.push(name.to_string());
            }
        }
        cols
    }

    fn validate(&self, dataset: &Dataset) -> Result<()> {
        if let Some(mapping) = &self.mapping {
            mapping.validate(dataset)?;
            if mapping.mode == MappingMode::Heatmap && self.apex_colors.is_some() {
                return Err(Error::InvalidConfig(format!(
                    "trace '{}' cannot combine a heatmap with apex colors",
                    self.name
                )));
            }
        }
        if !self.constant_encoding.is_finite() {
            return Err(Error::InvalidConfig("constant encoding must be finite".into()));
        }
        Ok(())
    }
}

/// Row accounting for one assembled trace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceStats {
    pub total_rows: usize,
    /// Rows removed by the filter rules (including missing filter values).
    pub filtered_out: usize,
    /// Of `filtered_out`, rows removed because a filtered column was empty.
    pub missing_filter_values: usize,
    /// Kept rows where at least one apex column was empty (treated as 0).
    pub missing_components: usize,
    /// Surviving rows whose composition could not be normalized.
    pub dropped_degenerate: usize,
}

/// One renderable layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    /// Normalized compositions (sum 100).
    pub points: Vec<TernaryPoint>,
    pub positions: Vec<CartesianPoint>,
    /// Mapped scalar per point, or the constant encoding.
    pub encoding: Vec<f64>,
    pub encoding_mode: Option<MappingMode>,
    pub encoding_range: Option<ScalarRange>,
    /// Marker sizes, for sizemaps.
    pub sizes: Option<Vec<f64>>,
    pub sizeref: Option<f64>,
    /// Per-point colors, for apex color mappings.
    pub colors: Option<Vec<Rgb>>,
    pub hover: Vec<String>,
    /// Dataset row behind each point.
    pub source_rows: Vec<usize>,
    pub stats: TraceStats,
}

impl Trace {
    pub fn len(&self) -> usize { self.points.len() }
    pub fn is_empty(&self) -> bool { self.points.is_empty() }

    /// Position in the trace of a dataset row, if it was kept.
    pub fn index_of_row(&self, row: usize) -> Option<usize> {
        self.source_rows.iter().position(|&r| r == row)
    }
}

fn permute<T: Clone>(items: &[T], order: &[usize]) -> Vec<T> {
    order.iter().map(|&i| items[i].clone()).collect()
}

/// Build a trace. Configuration errors surface before any row is read;
/// row-level problems are dropped and counted in `Trace::stats`.
pub fn assemble(dataset: &Dataset, axes: &AxisSpec, config: &TraceConfig) -> Result<Trace> {
    config.validate(dataset)?;
    let resolver = ComponentResolver::new(dataset, axes, config.molar.as_ref())?;
    let hover_fmt = HoverFormatter::new(dataset, axes, &config.hover_columns(axes))?;
    let mask = filter::apply(dataset, &config.filters)?;

    let mut stats = TraceStats {
        total_rows: dataset.len(),
        filtered_out: dataset.len() - mask.count(),
        missing_filter_values: mask.missing,
        ..TraceStats::default()
    };

    let mut rows = Vec::with_capacity(mask.count());
    let mut points = Vec::with_capacity(mask.count());
    for row in mask.survivors() {
        let (raw, missing) = resolver.resolve(dataset, row);
        match raw.normalized() {
            Ok(point) => {
                if missing {
                    stats.missing_components += 1;
                }
                rows.push(row);
                points.push(point);
            }
            Err(_) => stats.dropped_degenerate += 1,
        }
    }
    if stats.dropped_degenerate > 0 {
        tracing::warn!(trace = %config.name, dropped = stats.dropped_degenerate, "rows with degenerate compositions dropped");
    }

    let positions = points.iter().map(simplex::project).collect::<Result<Vec<_>>>()?;
    let hover: Vec<String> = rows.iter().map(|&r| hover_fmt.line(dataset, r)).collect();
    let colors = config.apex_colors.map(|c| c.colors(&points));

    let (encoding, order, encoding_mode, encoding_range, sizes, sizeref) = match &config.mapping {
        Some(m) => {
            let scalars = mapping::compute(dataset, &rows, m)?;
            let (sizes, sizeref) = match m.mode {
                MappingMode::Sizemap => {
                    let scale = m.size_scale.unwrap_or_default();
                    let sizes = scale.sizes(&scalars);
                    let sizeref = scale.sizeref(&sizes);
                    (Some(permute(&sizes, &scalars.order)), Some(sizeref))
                }
                MappingMode::Heatmap => (None, None),
            };
            (scalars.values, scalars.order, Some(m.mode), scalars.range, sizes, sizeref)
        }
        None => (vec![config.constant_encoding; rows.len()], (0..rows.len()).collect(), None, None, None, None),
    };

    tracing::debug!(
        trace = %config.name,
        rows = rows.len(),
        filtered_out = stats.filtered_out,
        missing_components = stats.missing_components,
        "trace assembled"
    );

    Ok(Trace {
        name: config.name.clone(),
        points: permute(&points, &order),
        positions: permute(&positions, &order),
        encoding: permute(&encoding, &order),
        encoding_mode,
        encoding_range,
        sizes,
        sizeref,
        colors: colors.map(|c| permute(&c, &order)),
        hover: permute(&hover, &order),
        source_rows: permute(&rows, &order),
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::FilterOp;
    use crate::mapping::SortMode;
    use crate::model::Value;
    use pretty_assertions::assert_eq;

    fn abc() -> Dataset {
        Dataset::from_records(
            &["A", "B", "C", "site"],
            vec![
                vec![Value::from(10.0), Value::from(30.0), Value::from(60.0), Value::from("north")],
                vec![Value::from(0.0), Value::from(0.0), Value::from(0.0), Value::from("north")],
                vec![Value::from(30.0), Value::Null, Value::from(40.0), Value::from("south")],
                vec![Value::from(50.0), Value::from(30.0), Value::from(20.0), Value::from("south")],
            ],
        )
        .unwrap()
    }

    fn axes() -> AxisSpec {
        AxisSpec::custom(["A"], ["B"], ["C"]).unwrap()
    }

    #[test]
    fn test_drops_degenerate_and_counts() {
        let trace = assemble(&abc(), &axes(), &TraceConfig::new("all")).unwrap();
        assert_eq!(trace.source_rows, vec![0, 2, 3]);
        assert_eq!(trace.stats.dropped_degenerate, 1);
        assert_eq!(trace.stats.missing_components, 1);
        assert_eq!(trace.encoding, vec![1.0; 3]);
        assert_eq!(trace.hover.len(), 3);
        assert_eq!(trace.hover[0], "A: 10<br>B: 30<br>C: 60");
    }

    #[test]
    fn test_default_hover_columns_dedup() {
        let config = TraceConfig::new("t")
            .with_mapping(ContinuousMapping::heatmap("A"))
            .with_filter(FilterRule::new("site", FilterOp::Equals { value: "south".into() }));
        assert_eq!(config.hover_columns(&axes()), vec!["A", "B", "C", "site"]);
    }

    #[test]
    fn test_sorted_mapping_permutes_all_arrays() {
        let config = TraceConfig::new("t").with_mapping(ContinuousMapping::heatmap("C").with_sort(SortMode::Ascending));
        let trace = assemble(&abc(), &axes(), &config).unwrap();
        assert_eq!(trace.source_rows, vec![3, 2, 0]);
        assert_eq!(trace.encoding, vec![20.0, 40.0, 60.0]);
        assert!(trace.hover[0].starts_with("A: 50"));
        assert_eq!(trace.points[0], TernaryPoint::new(50.0, 30.0, 20.0));
    }

    #[test]
    fn test_sizemap_sizes() {
        let config = TraceConfig::new("t").with_mapping(ContinuousMapping::sizemap("A"));
        let trace = assemble(&abc(), &axes(), &config).unwrap();
        assert_eq!(trace.sizes, Some(vec![4.0, 12.0, 20.0]));
        assert!(trace.sizeref.is_some());
    }

    #[test]
    fn test_heatmap_and_apex_colors_conflict() {
        let config = TraceConfig::new("t")
            .with_mapping(ContinuousMapping::heatmap("A"))
            .with_apex_colors(ApexColorMapping::default());
        assert!(matches!(assemble(&abc(), &axes(), &config), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_config_json_defaults() {
        let config = TraceConfig::from_json("{}").unwrap();
        assert_eq!(config, TraceConfig::default());
        assert!(matches!(TraceConfig::from_json("{"), Err(Error::Config(_))));
    }
}
