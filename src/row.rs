/// Rows and table state.
///
/// A `Row` is a field map plus a string id that is unique within its table.
/// `TableState` maps table ids to their ordered rows and is what gets shown,
/// persisted, and sent to the optimizer.

use crate::value::CellValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Row {
    pub id: String,
    #[serde(flatten)]
    pub fields: BTreeMap<String, CellValue>,
}

impl Row {
    pub fn new(id: impl Into<String>) -> Self {
        Row {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Row with a zero-based sequence id.
    pub fn at(index: usize) -> Self {
        Row::new(index.to_string())
    }

    /// Builder-style setter.
    pub fn with(mut self, field: &str, value: impl Into<CellValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<CellValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&CellValue> {
        self.fields.get(field)
    }

    /// Numeric view of a field; missing fields count as `0`.
    pub fn number(&self, field: &str) -> f64 {
        self.get(field).map(CellValue::to_number).unwrap_or(0.0)
    }

    /// Text view of a field; missing fields are empty.
    pub fn text(&self, field: &str) -> String {
        self.get(field).map(CellValue::to_text).unwrap_or_default()
    }
}

/// Table id to ordered rows.
pub type TableState = BTreeMap<String, Vec<Row>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_accessors() {
        let row = Row::at(3).with("item", "275D").with("demand_12m", 5.0);
        assert_eq!(row.id, "3");
        assert_eq!(row.text("item"), "275D");
        assert_eq!(row.number("demand_12m"), 5.0);
        assert_eq!(row.number("missing"), 0.0);
        assert_eq!(row.text("missing"), "");
    }

    #[test]
    fn test_row_serde_flattens_fields() {
        let row = Row::at(0).with("a", 1.0).with("b", "x").with("c", CellValue::Blank);
        let json = serde_json::to_string(&row).unwrap();
        assert_eq!(json, r#"{"id":"0","a":1.0,"b":"x","c":null}"#);
        let back: Row = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }
}
