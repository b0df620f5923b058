//! Typed cell values and column metadata.

use crate::error::{PlannerError, PlannerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A value stored in a channel table cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// Integer value.
    Int(i64),
    /// Floating-point value.
    Float(f64),
    /// Text (STRING and ENUM columns).
    Text(String),
}

impl CellValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(v) => Some(*v as f64),
            CellValue::Float(v) => Some(*v),
            CellValue::Text(_) => None,
        }
    }

    /// Text view of the value, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Int(v) => write!(f, "{v}"),
            CellValue::Float(v) => write!(f, "{v}"),
            CellValue::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for CellValue {
    fn from(value: i64) -> Self {
        CellValue::Int(value)
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Float(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::Text(value.to_string())
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::Text(value)
    }
}

/// Declared type of a property column.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Integer with optional inclusive bounds.
    Int {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Float with optional inclusive bounds.
    Float {
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// Free text.
    String,
    /// One of a fixed set of options.
    Enum(Vec<String>),
    /// Stored and emitted nowhere; the property has no setter.
    Opaque,
}

impl ColumnType {
    /// Whether cells of this column can be written.
    pub fn is_settable(&self) -> bool {
        !matches!(self, ColumnType::Opaque)
    }

    /// Zero value of the column type.
    pub fn default_value(&self) -> CellValue {
        match self {
            ColumnType::Int { min, .. } => {
                CellValue::Int(min.map(|m| m.max(0.0)).unwrap_or(0.0) as i64)
            }
            ColumnType::Float { min, .. } => {
                CellValue::Float(min.map(|m| m.max(0.0)).unwrap_or(0.0))
            }
            ColumnType::String | ColumnType::Opaque => CellValue::Text(String::new()),
            ColumnType::Enum(options) => {
                CellValue::Text(options.first().cloned().unwrap_or_default())
            }
        }
    }

    /// Convert `value` into this column's type and check bounds and options.
    ///
    /// Integers widen to floats; floats narrow to integers only when they are
    /// whole. Numeric strings are parsed for numeric columns.
    pub fn coerce(&self, column: &str, value: CellValue) -> PlannerResult<CellValue> {
        match self {
            ColumnType::Int { min, max } => {
                let v = match value {
                    CellValue::Int(v) => v,
                    CellValue::Float(f) if f.is_finite() && f.fract() == 0.0 => f as i64,
                    CellValue::Text(ref s) => s.trim().parse::<i64>().map_err(|_| {
                        PlannerError::type_mismatch(column, format!("'{s}' is not an integer"))
                    })?,
                    other => {
                        return Err(PlannerError::type_mismatch(
                            column,
                            format!("{other} is not an integer"),
                        ))
                    }
                };
                check_bounds(column, v as f64, *min, *max)?;
                Ok(CellValue::Int(v))
            }
            ColumnType::Float { min, max } => {
                let v = match value {
                    CellValue::Float(f) => f,
                    CellValue::Int(i) => i as f64,
                    CellValue::Text(ref s) => s.trim().parse::<f64>().map_err(|_| {
                        PlannerError::type_mismatch(column, format!("'{s}' is not a number"))
                    })?,
                };
                if !v.is_finite() {
                    return Err(PlannerError::type_mismatch(column, format!("{v} is not finite")));
                }
                check_bounds(column, v, *min, *max)?;
                Ok(CellValue::Float(v))
            }
            ColumnType::String => Ok(CellValue::Text(value.to_string())),
            ColumnType::Enum(options) => {
                let text = value.to_string();
                if options.iter().any(|o| *o == text) {
                    Ok(CellValue::Text(text))
                } else {
                    Err(PlannerError::type_mismatch(
                        column,
                        format!("'{text}' is not one of {options:?}"),
                    ))
                }
            }
            ColumnType::Opaque => Err(PlannerError::PropertyNotSettable(column.to_string())),
        }
    }
}

fn check_bounds(column: &str, v: f64, min: Option<f64>, max: Option<f64>) -> PlannerResult<()> {
    if let Some(min) = min {
        if v < min {
            return Err(PlannerError::type_mismatch(column, format!("{v} is below minimum {min}")));
        }
    }
    if let Some(max) = max {
        if v > max {
            return Err(PlannerError::type_mismatch(column, format!("{v} is above maximum {max}")));
        }
    }
    Ok(())
}
