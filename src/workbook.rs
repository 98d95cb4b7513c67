/// Parsed workbook input.
///
/// A workbook is a mapping of sheet name to an ordered list of loosely typed
/// records, as produced by any spreadsheet-to-records reader. Record key order
/// is preserved because the demand mapper falls back to column positions.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;

/// One spreadsheet row: header -> cell, in column order.
pub type RawRecord = Map<String, JsonValue>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Workbook {
    sheets: BTreeMap<String, Vec<RawRecord>>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON document `{ "Sheet": [ { "Header": value } ] }`.
    ///
    /// Header keys are trimmed; non-object records are skipped.
    pub fn from_json(value: &JsonValue) -> Result<Self, String> {
        let sheets = value
            .as_object()
            .ok_or_else(|| "Workbook must be a JSON object of sheets".to_string())?;

        let mut workbook = Workbook::new();
        for (name, records) in sheets {
            let records = records
                .as_array()
                .ok_or_else(|| format!("Sheet '{}' must be an array of records", name))?;
            let rows = records
                .iter()
                .filter_map(|r| r.as_object())
                .map(normalize_keys)
                .collect();
            workbook.sheets.insert(name.clone(), rows);
        }
        Ok(workbook)
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.keys().map(|s| s.as_str()).collect()
    }

    /// Look a sheet up by exact name, then case-insensitively.
    pub fn sheet(&self, name: &str) -> Option<&[RawRecord]> {
        if let Some(rows) = self.sheets.get(name) {
            return Some(rows.as_slice());
        }
        let wanted = name.to_lowercase();
        self.sheets
            .iter()
            .find(|(k, _)| k.to_lowercase() == wanted)
            .map(|(_, rows)| rows.as_slice())
    }

    /// Like [`Workbook::sheet`], also trying the name without surrounding
    /// whitespace. Missing sheets read as empty.
    pub fn sheet_lenient(&self, name: &str) -> &[RawRecord] {
        self.sheet(name)
            .or_else(|| self.sheet(name.trim()))
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.sheets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty()
    }
}

fn normalize_keys(record: &RawRecord) -> RawRecord {
    record
        .iter()
        .map(|(k, v)| (k.trim().to_string(), v.clone()))
        .collect()
}

/// True when a raw cell carries nothing (`null` or an empty string).
pub fn is_blank(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Lowercased, trimmed text of a raw cell.
pub fn label_of(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.trim().to_lowercase(),
        Some(other) => other.to_string().trim().to_lowercase(),
    }
}

/// Display text of a raw cell.
pub fn text_of(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
