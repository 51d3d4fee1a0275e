//! Dataset: typed columns over ordered rows.
//!
//! Loading (`.csv`, `.xlsx`, header detection) is the caller's job. The
//! dataset only enforces the shape invariants the pipeline relies on:
//! every row has one value per column, and numeric columns hold numbers
//! (or missing values).

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::Value;
use crate::{Error, Result};

/// Column type, fixed at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Categorical,
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnType::Numeric => write!(f, "numeric"),
            ColumnType::Categorical => write!(f, "categorical"),
        }
    }
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnType,
}

impl Column {
    pub fn numeric(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnType::Numeric }
    }

    pub fn categorical(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnType::Categorical }
    }
}

/// Row-major table of values.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl Dataset {
    /// Create an empty dataset with the given columns.
    pub fn new(columns: Vec<Column>) -> Result<Self> {
        let mut index = HashMap::with_capacity(columns.len());
        for (i, col) in columns.iter().enumerate() {
            if index.insert(col.name.clone(), i).is_some() {
                return Err(Error::InvalidConfig(format!("duplicate column '{}'", col.name)));
            }
        }
        Ok(Self { columns, index, rows: Vec::new() })
    }

    /// Build a dataset from raw records, inferring column types.
    ///
    /// A column is numeric when every non-missing value is `Int` or `Float`
    /// and at least one such value exists; everything else is categorical.
    pub fn from_records<S: AsRef<str>>(headers: &[S], records: Vec<Vec<Value>>) -> Result<Self> {
        let columns = headers
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let mut saw_number = false;
                let mut numeric = true;
                for record in &records {
                    match record.get(i) {
                        Some(v) if v.is_missing() => {}
                        Some(v) if v.is_numeric() => saw_number = true,
                        Some(_) => numeric = false,
                        None => {}
                    }
                }
                let kind = if numeric && saw_number { ColumnType::Numeric } else { ColumnType::Categorical };
                Column { name: name.as_ref().to_string(), kind }
            })
            .collect();

        let mut dataset = Self::new(columns)?;
        for record in records {
            dataset.push_row(record)?;
        }
        Ok(dataset)
    }

    /// Append a row. Fails on arity mismatch or a non-numeric value in a
    /// numeric column.
    pub fn push_row(&mut self, values: Vec<Value>) -> Result<()> {
        if values.len() != self.columns.len() {
            return Err(Error::InvalidConfig(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                values.len(),
                self.columns.len()
            )));
        }
        for (col, v) in self.columns.iter().zip(&values) {
            if col.kind == ColumnType::Numeric && !v.is_missing() && !v.is_numeric() {
                return Err(Error::TypeError {
                    column: col.name.clone(),
                    expected: ColumnType::Numeric.to_string(),
                    got: v.type_name().into(),
                });
            }
        }
        self.rows.push(values);
        Ok(())
    }

    pub fn len(&self) -> usize { self.rows.len() }
    pub fn is_empty(&self) -> bool { self.rows.is_empty() }
    pub fn columns(&self) -> &[Column] { &self.columns }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.index.get(name).map(|&i| &self.columns[i])
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Column index, or `MissingColumn`.
    pub fn require_column(&self, name: &str) -> Result<usize> {
        self.column_index(name).ok_or_else(|| Error::MissingColumn(name.to_string()))
    }

    /// Column index of a numeric column, or `MissingColumn` / `TypeError`.
    pub fn require_numeric(&self, name: &str) -> Result<usize> {
        let idx = self.require_column(name)?;
        match self.columns[idx].kind {
            ColumnType::Numeric => Ok(idx),
            kind => Err(Error::TypeError {
                column: name.to_string(),
                expected: ColumnType::Numeric.to_string(),
                got: kind.to_string(),
            }),
        }
    }

    pub fn row(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// Value at (row, column index). Out-of-range rows read as `Null`.
    pub fn value(&self, row: usize, col: usize) -> &Value {
        static NULL: Value = Value::Null;
        self.rows.get(row).and_then(|r| r.get(col)).unwrap_or(&NULL)
    }

    pub fn get(&self, row: usize, name: &str) -> Option<&Value> {
        let col = self.column_index(name)?;
        self.rows.get(row).map(|r| &r[col])
    }

    /// Finite numeric value at (row, column index).
    pub fn numeric(&self, row: usize, col: usize) -> Option<f64> {
        self.value(row, col).as_float()
    }
}
