//! Row-oriented tabular results returned by datasources and passed between
//! operators.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::properties::Properties;

/// A single cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Long(i64),
    Double(f64),
    String(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            Value::Double(v) if v.fract() == 0.0 => Some(*v as i64),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Long(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Long(v) => Some(*v != 0),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Long,
    Double,
    String,
    Boolean,
}

/// Deserialized tables are checked: one type per column, one cell per column
/// in every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataTable")]
pub struct DataTable {
    pub columns: Vec<String>,
    pub column_types: Vec<ColumnType>,
    #[serde(default)]
    pub rows: Vec<Vec<Value>>,
    /// Properties resolved while building the query (time column, bounds, granularity).
    #[serde(default)]
    pub properties: Properties,
}

#[derive(Deserialize)]
struct RawDataTable {
    columns: Vec<String>,
    column_types: Vec<ColumnType>,
    #[serde(default)]
    rows: Vec<Vec<Value>>,
    #[serde(default)]
    properties: Properties,
}

impl TryFrom<RawDataTable> for DataTable {
    type Error = CoreError;

    fn try_from(raw: RawDataTable) -> CoreResult<Self> {
        let table = Self {
            columns: raw.columns,
            column_types: raw.column_types,
            rows: raw.rows,
            properties: raw.properties,
        };
        table.validate()?;
        Ok(table)
    }
}

impl DataTable {
    pub fn new(columns: Vec<(String, ColumnType)>) -> Self {
        let (columns, column_types) = columns.into_iter().unzip();
        Self {
            columns,
            column_types,
            rows: Vec::new(),
            properties: Properties::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> CoreResult<()> {
        if row.len() != self.columns.len() {
            return Err(CoreError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Check that every column has a type and every row has one cell per column.
    pub fn validate(&self) -> CoreResult<()> {
        if self.column_types.len() != self.columns.len() {
            return Err(CoreError::ColumnTypes {
                columns: self.columns.len(),
                types: self.column_types.len(),
            });
        }
        match self.rows.iter().find(|row| row.len() != self.columns.len()) {
            Some(row) => Err(CoreError::RowWidth {
                expected: self.columns.len(),
                actual: row.len(),
            }),
            None => Ok(()),
        }
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> CoreResult<Self> {
        for row in rows {
            self.push_row(row)?;
        }
        Ok(self)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> CoreResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| CoreError::ColumnNotFound(name.to_string()))
    }

    pub fn column_type(&self, name: &str) -> CoreResult<ColumnType> {
        let idx = self.column_index(name)?;
        Ok(self.column_types[idx])
    }

    pub fn value(&self, row: usize, column: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Value::Null)
    }

    /// Non-null long at `(row, column)`.
    pub fn long_at(&self, row: usize, column: &str) -> CoreResult<i64> {
        let idx = self.column_index(column)?;
        self.value(row, idx)
            .as_long()
            .ok_or_else(|| CoreError::TypeMismatch {
                column: column.to_string(),
                row,
                expected: "long",
            })
    }

    /// Double at `(row, column)`, `None` when the cell is null.
    pub fn double_at(&self, row: usize, column: &str) -> CoreResult<Option<f64>> {
        let idx = self.column_index(column)?;
        let value = self.value(row, idx);
        if value.is_null() {
            return Ok(None);
        }
        value
            .as_double()
            .map(Some)
            .ok_or_else(|| CoreError::TypeMismatch {
                column: column.to_string(),
                row,
                expected: "double",
            })
    }

    pub fn longs(&self, column: &str) -> CoreResult<Vec<i64>> {
        (0..self.row_count()).map(|r| self.long_at(r, column)).collect()
    }

    pub fn doubles(&self, column: &str) -> CoreResult<Vec<Option<f64>>> {
        (0..self.row_count()).map(|r| self.double_at(r, column)).collect()
    }

    /// Sort rows ascending by a long column; nulls last.
    pub fn sort_by_long(&mut self, column: &str) -> CoreResult<()> {
        let idx = self.column_index(column)?;
        self.rows.sort_by_key(|row| {
            let v = row.get(idx).and_then(Value::as_long);
            (v.is_none(), v.unwrap_or_default())
        });
        Ok(())
    }
}
