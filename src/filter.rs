//! Filter pipeline: ordered column predicates to a row mask.
//!
//! Every rule narrows the surviving rowset; the result is the logical AND
//! of all rules, so rule order only affects how much work later rules do.
//! Rules are type-checked against the dataset before any row is touched.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{ColumnType, Dataset, Value};
use crate::{Error, Result};

/// Which ends of a numeric range are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bounds {
    /// a < x < b
    OpenOpen,
    /// a <= x < b
    ClosedOpen,
    /// a < x <= b
    OpenClosed,
    /// a <= x <= b
    ClosedClosed,
}

/// Operator plus operands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FilterOp {
    // Categorical
    Equals { value: Value },
    OneOf { values: Vec<Value> },
    ExcludeOne { value: Value },
    ExcludeMany { values: Vec<Value> },

    // Numeric
    Lt { value: f64 },
    Gt { value: f64 },
    Le { value: f64 },
    Ge { value: f64 },
    Range { low: f64, high: f64, bounds: Bounds },
}

impl FilterOp {
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            FilterOp::Equals { .. } | FilterOp::OneOf { .. } | FilterOp::ExcludeOne { .. } | FilterOp::ExcludeMany { .. }
        )
    }

    /// Operand type this operator requires of its column.
    pub fn column_type(&self) -> ColumnType {
        if self.is_numeric() { ColumnType::Numeric } else { ColumnType::Categorical }
    }

    /// Evaluate against a present (non-missing) cell.
    fn matches(&self, cell: &Value) -> bool {
        match self {
            FilterOp::Equals { value } => same_category(cell, value),
            FilterOp::OneOf { values } => values.iter().any(|v| same_category(cell, v)),
            FilterOp::ExcludeOne { value } => !same_category(cell, value),
            FilterOp::ExcludeMany { values } => !values.iter().any(|v| same_category(cell, v)),
            numeric => {
                let Some(x) = cell.as_float() else { return false };
                match *numeric {
                    FilterOp::Lt { value } => x < value,
                    FilterOp::Gt { value } => x > value,
                    FilterOp::Le { value } => x <= value,
                    FilterOp::Ge { value } => x >= value,
                    FilterOp::Range { low, high, bounds } => match bounds {
                        Bounds::OpenOpen => low < x && x < high,
                        Bounds::ClosedOpen => low <= x && x < high,
                        Bounds::OpenClosed => low < x && x <= high,
                        Bounds::ClosedClosed => low <= x && x <= high,
                    },
                    _ => false,
                }
            }
        }
    }
}

fn same_category(cell: &Value, operand: &Value) -> bool {
    match (cell.category_key(), operand.category_key()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// A column-scoped predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    pub column: String,
    #[serde(flatten)]
    pub op: FilterOp,
}

impl FilterRule {
    pub fn new(column: impl Into<String>, op: FilterOp) -> Self {
        Self { column: column.into(), op }
    }

    /// Build a rule from an operator symbol and text operands, typing the
    /// operands after the column.
    ///
    /// Symbols: `is`, `==`, `is one of`, `is not`, `is not one of`, `<`,
    /// `>`, `<=`, `>=`, `a < x < b`, `a <= x <= b`, `a <= x < b`,
    /// `a < x <= b`. Multi-value operands may also be comma-separated.
    /// On a numeric column `is`/`==` become a closed range `[v, v]`.
    pub fn parse(dataset: &Dataset, column: &str, symbol: &str, operands: &[&str]) -> Result<Self> {
        let kind = dataset
            .column(column)
            .ok_or_else(|| Error::MissingColumn(column.to_string()))?
            .kind;
        let numeric = kind == ColumnType::Numeric;

        let number = |i: usize| -> Result<f64> {
            let raw = operands.get(i).map(|s| s.trim()).unwrap_or("");
            raw.parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| Error::FilterOperandError {
                    column: column.to_string(),
                    operand: raw.to_string(),
                    message: "expected a number".into(),
                })
        };
        let text = |i: usize| -> Value { Value::from(operands.get(i).map(|s| s.trim()).unwrap_or("")) };
        let list = || -> Vec<Value> {
            operands
                .iter()
                .flat_map(|s| s.split(','))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(Value::from)
                .collect()
        };
        let range = |bounds: Bounds| -> Result<FilterOp> { Ok(FilterOp::Range { low: number(0)?, high: number(1)?, bounds }) };

        let op = match symbol.trim() {
            "is" | "==" if numeric => {
                let v = number(0)?;
                FilterOp::Range { low: v, high: v, bounds: Bounds::ClosedClosed }
            }
            "is" | "==" => FilterOp::Equals { value: text(0) },
            "is one of" => FilterOp::OneOf { values: list() },
            "is not" => FilterOp::ExcludeOne { value: text(0) },
            "is not one of" => FilterOp::ExcludeMany { values: list() },
            "<" => FilterOp::Lt { value: number(0)? },
            ">" => FilterOp::Gt { value: number(0)? },
            "<=" => FilterOp::Le { value: number(0)? },
            ">=" => FilterOp::Ge { value: number(0)? },
            "a < x < b" => range(Bounds::OpenOpen)?,
            "a <= x < b" => range(Bounds::ClosedOpen)?,
            "a < x <= b" => range(Bounds::OpenClosed)?,
            "a <= x <= b" => range(Bounds::ClosedClosed)?,
            other => {
                return Err(Error::FilterOperandError {
                    column: column.to_string(),
                    operand: other.to_string(),
                    message: "unsupported filter operation".into(),
                });
            }
        };
        let rule = FilterRule::new(column, op);
        check_rule(dataset, 0, &rule)?;
        Ok(rule)
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let col = &self.column;
        let join = |vs: &[Value]| vs.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(", ");
        match &self.op {
            FilterOp::Equals { value } => write!(f, "{col} is {value}"),
            FilterOp::OneOf { values } => write!(f, "{col} is one of [{}]", join(values)),
            FilterOp::ExcludeOne { value } => write!(f, "{col} is not {value}"),
            FilterOp::ExcludeMany { values } => write!(f, "{col} is not one of [{}]", join(values)),
            FilterOp::Lt { value } => write!(f, "{col} < {value}"),
            FilterOp::Gt { value } => write!(f, "{col} > {value}"),
            FilterOp::Le { value } => write!(f, "{col} <= {value}"),
            FilterOp::Ge { value } => write!(f, "{col} >= {value}"),
            FilterOp::Range { low, high, bounds } => {
                let (lo, hi) = match bounds {
                    Bounds::OpenOpen => ("<", "<"),
                    Bounds::ClosedOpen => ("<=", "<"),
                    Bounds::OpenClosed => ("<", "<="),
                    Bounds::ClosedClosed => ("<=", "<="),
                };
                write!(f, "{low} {lo} {col} {hi} {high}")
            }
        }
    }
}

// ============================================================================
// Mask
// ============================================================================

/// Result of applying a rule list: one flag per dataset row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterMask {
    mask: Vec<bool>,
    /// Rows excluded because a filtered column had no value.
    pub missing: usize,
}

impl FilterMask {
    /// Mask that keeps every row.
    pub fn all(len: usize) -> Self {
        Self { mask: vec![true; len], missing: 0 }
    }

    pub fn as_slice(&self) -> &[bool] { &self.mask }
    pub fn into_inner(self) -> Vec<bool> { self.mask }
    pub fn len(&self) -> usize { self.mask.len() }
    pub fn is_empty(&self) -> bool { self.mask.is_empty() }

    /// Number of surviving rows.
    pub fn count(&self) -> usize {
        self.mask.iter().filter(|&&keep| keep).count()
    }

    /// Indices of surviving rows, ascending.
    pub fn survivors(&self) -> Vec<usize> {
        self.mask.iter().enumerate().filter_map(|(i, &keep)| keep.then_some(i)).collect()
    }
}

fn check_rule(dataset: &Dataset, index: usize, rule: &FilterRule) -> Result<usize> {
    let col = dataset.require_column(&rule.column)?;
    let kind = dataset.columns()[col].kind;
    let wanted = rule.op.column_type();
    if kind != wanted {
        return Err(Error::FilterTypeError {
            rule: format!("#{index} `{rule}`"),
            message: format!("{wanted} operator applied to {kind} column '{}'", rule.column),
        });
    }
    if let FilterOp::Lt { value } | FilterOp::Gt { value } | FilterOp::Le { value } | FilterOp::Ge { value } = rule.op {
        if !value.is_finite() {
            return Err(Error::FilterTypeError {
                rule: format!("#{index} `{rule}`"),
                message: "numeric operand must be finite".into(),
            });
        }
    }
    if let FilterOp::Range { low, high, .. } = rule.op {
        if !low.is_finite() || !high.is_finite() {
            return Err(Error::FilterTypeError {
                rule: format!("#{index} `{rule}`"),
                message: "range bounds must be finite".into(),
            });
        }
    }
    Ok(col)
}

/// Apply `rules` in order and return the surviving-row mask.
///
/// A row whose filtered column is missing is excluded, never an error.
pub fn apply(dataset: &Dataset, rules: &[FilterRule]) -> Result<FilterMask> {
    let columns = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| check_rule(dataset, i, rule))
        .collect::<Result<Vec<_>>>()?;

    let mut mask = FilterMask::all(dataset.len());
    let mut active = mask.count();
    for (rule, col) in rules.iter().zip(columns) {
        for (row, keep) in mask.mask.iter_mut().enumerate() {
            if !*keep {
                continue;
            }
            let cell = dataset.value(row, col);
            if cell.is_missing() {
                mask.missing += 1;
                *keep = false;
            } else if !rule.op.matches(cell) {
                *keep = false;
            }
        }
        let surviving = mask.count();
        tracing::debug!(rule = %rule, before = active, after = surviving, "filter rule applied");
        if surviving == 0 && active > 0 {
            tracing::warn!(rule = %rule, "filter rule removed every remaining row");
        }
        active = surviving;
    }
    Ok(mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Column;

    fn samples() -> Dataset {
        Dataset::from_records(
            &["SiO2", "rock"],
            vec![
                vec![Value::from(45.0), Value::from("basalt")],
                vec![Value::from(52.0), Value::from("andesite")],
                vec![Value::from(63.0), Value::from("dacite")],
                vec![Value::from(72.0), Value::from("rhyolite")],
                vec![Value::Null, Value::from("unknown")],
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_no_rules_keeps_everything() {
        let ds = samples();
        let mask = apply(&ds, &[]).unwrap();
        assert_eq!(mask.as_slice(), &[true; 5]);
        assert_eq!(mask.missing, 0);
    }

    #[test]
    fn test_numeric_rules() {
        let ds = samples();
        let mask = apply(&ds, &[FilterRule::new("SiO2", FilterOp::Gt { value: 50.0 })]).unwrap();
        assert_eq!(mask.as_slice(), &[false, true, true, true, false]);
        assert_eq!(mask.missing, 1);

        let rule = FilterRule::new("SiO2", FilterOp::Range { low: 52.0, high: 72.0, bounds: Bounds::ClosedOpen });
        assert_eq!(apply(&ds, &[rule]).unwrap().survivors(), vec![1, 2]);
        let rule = FilterRule::new("SiO2", FilterOp::Range { low: 52.0, high: 72.0, bounds: Bounds::OpenClosed });
        assert_eq!(apply(&ds, &[rule]).unwrap().survivors(), vec![2, 3]);
    }

    #[test]
    fn test_categorical_rules() {
        let ds = samples();
        let one_of = FilterRule::new("rock", FilterOp::OneOf { values: vec!["basalt".into(), "dacite".into()] });
        assert_eq!(apply(&ds, &[one_of]).unwrap().survivors(), vec![0, 2]);
        let exclude = FilterRule::new("rock", FilterOp::ExcludeMany { values: vec!["basalt".into(), "dacite".into()] });
        assert_eq!(apply(&ds, &[exclude]).unwrap().survivors(), vec![1, 3, 4]);
    }

    #[test]
    fn test_rules_compose_with_and() {
        let ds = samples();
        let rules = [
            FilterRule::new("SiO2", FilterOp::Ge { value: 52.0 }),
            FilterRule::new("rock", FilterOp::ExcludeOne { value: "rhyolite".into() }),
        ];
        assert_eq!(apply(&ds, &rules).unwrap().survivors(), vec![1, 2]);
    }

    #[test]
    fn test_type_mismatch_names_rule() {
        let ds = samples();
        let rules = [
            FilterRule::new("SiO2", FilterOp::Gt { value: 1.0 }),
            FilterRule::new("rock", FilterOp::Lt { value: 3.0 }),
        ];
        match apply(&ds, &rules).unwrap_err() {
            Error::FilterTypeError { rule, .. } => assert!(rule.starts_with("#1"), "{rule}"),
            other => panic!("unexpected error: {other}"),
        }
        let rules = [FilterRule::new("SiO2", FilterOp::Equals { value: Value::from(45) })];
        assert!(matches!(apply(&ds, &rules), Err(Error::FilterTypeError { .. })));
    }

    #[test]
    fn test_unknown_column() {
        let ds = Dataset::new(vec![Column::numeric("a")]).unwrap();
        let rules = [FilterRule::new("b", FilterOp::Gt { value: 1.0 })];
        assert!(matches!(apply(&ds, &rules), Err(Error::MissingColumn(_))));
    }

    #[test]
    fn test_parse_symbols() {
        let ds = samples();
        let rule = FilterRule::parse(&ds, "SiO2", "a <= x < b", &["52", "72"]).unwrap();
        assert_eq!(rule.op, FilterOp::Range { low: 52.0, high: 72.0, bounds: Bounds::ClosedOpen });
        let rule = FilterRule::parse(&ds, "rock", "is one of", &["basalt, dacite"]).unwrap();
        assert_eq!(apply(&ds, &[rule]).unwrap().survivors(), vec![0, 2]);
        let rule = FilterRule::parse(&ds, "SiO2", "==", &["63"]).unwrap();
        assert_eq!(apply(&ds, &[rule]).unwrap().survivors(), vec![2]);
    }

    #[test]
    fn test_parse_errors() {
        let ds = samples();
        assert!(matches!(
            FilterRule::parse(&ds, "SiO2", ">", &["lots"]),
            Err(Error::FilterOperandError { .. })
        ));
        assert!(matches!(
            FilterRule::parse(&ds, "rock", "<", &["3"]),
            Err(Error::FilterTypeError { .. })
        ));
        assert!(FilterRule::parse(&ds, "rock", "~=", &["x"]).is_err());
    }

    #[test]
    fn test_rule_display() {
        let rule = FilterRule::new("SiO2", FilterOp::Range { low: 1.0, high: 2.0, bounds: Bounds::OpenClosed });
        assert_eq!(rule.to_string(), "1 < SiO2 <= 2");
    }

    #[test]
    fn test_rule_json() {
        let rule: FilterRule = serde_json::from_str(r#"{"column":"SiO2","op":"gt","value":15.0}"#).unwrap();
        assert_eq!(rule, FilterRule::new("SiO2", FilterOp::Gt { value: 15.0 }));
    }
}
