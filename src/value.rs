/// PlanTable Cell Values
///
/// A `CellValue` is what a single cell of a planning table holds once it has
/// crossed the import boundary: a finite number, a piece of text, or nothing.
///
/// # Numeric Coercion
///
/// Spreadsheet cells arrive loosely typed. Every place that needs a number
/// goes through [`coerce_number`], which applies one policy:
///
/// - numbers pass through (non-finite numbers become `0`)
/// - strings are trimmed and thousands-separator commas stripped before
///   parsing; an empty string is `0`
/// - booleans are `1` / `0`
/// - blank / null is `0`
/// - anything unparseable is `0`
///
/// A NaN never reaches table state or the optimizer payload.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Declared value type of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    Number,
    String,
}

/// Cell value enum covering everything a planning table stores
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    #[default]
    Blank,
}

impl CellValue {
    /// Build a number cell, folding non-finite input to `0`.
    pub fn number(value: f64) -> Self {
        if value.is_finite() {
            CellValue::Number(value)
        } else {
            CellValue::Number(0.0)
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    /// Numeric view of the cell under the coercion policy.
    pub fn to_number(&self) -> f64 {
        match self {
            CellValue::Number(v) if v.is_finite() => *v,
            CellValue::Number(_) => 0.0,
            CellValue::Text(s) => parse_number(s).unwrap_or(0.0),
            CellValue::Blank => 0.0,
        }
    }

    /// Text view of the cell; numbers use their shortest display form.
    pub fn to_text(&self) -> String {
        match self {
            CellValue::Number(v) => format_number(*v),
            CellValue::Text(s) => s.clone(),
            CellValue::Blank => String::new(),
        }
    }

    /// Coerce the cell to the given column type.
    ///
    /// Blank stays blank; everything else is converted.
    pub fn coerce_to(&self, value_type: ValueType) -> CellValue {
        match (self, value_type) {
            (CellValue::Blank, _) => CellValue::Blank,
            (_, ValueType::Number) => CellValue::number(self.to_number()),
            (CellValue::Text(_), ValueType::String) => self.clone(),
            (_, ValueType::String) => CellValue::Text(self.to_text()),
        }
    }

    /// Convert a raw JSON value (a spreadsheet cell or a client edit).
    pub fn from_json(value: &JsonValue) -> CellValue {
        match value {
            JsonValue::Null => CellValue::Blank,
            JsonValue::Bool(b) => CellValue::Text(b.to_string()),
            JsonValue::Number(n) => n.as_f64().map(CellValue::number).unwrap_or(CellValue::Blank),
            JsonValue::String(s) => CellValue::Text(s.clone()),
            other => CellValue::Text(other.to_string()),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::number(value)
    }
}

impl From<i32> for CellValue {
    fn from(value: i32) -> Self {
        CellValue::Number(value as f64)
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

/// Parse a spreadsheet string as a number.
///
/// Returns `None` when the text is not numeric. Empty text parses as `0`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Apply the numeric coercion policy to a raw JSON cell.
pub fn coerce_number(value: &JsonValue) -> f64 {
    match value {
        JsonValue::Null => 0.0,
        JsonValue::Bool(true) => 1.0,
        JsonValue::Bool(false) => 0.0,
        JsonValue::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        JsonValue::String(s) => parse_number(s).unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}
