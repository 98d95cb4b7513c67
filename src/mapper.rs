/// Sheet-to-row mapping.
///
/// Turns raw workbook records into typed rows for one table. Which sheets are
/// read and how is decided by the schema's [`SourceShape`]:
///
/// - `Generic`: each source column is looked up by field, then by label.
/// - `Demand`: item plus four demand / inventory figures, located by
///   case-insensitive key patterns with a positional fallback.
/// - `Recommendation`, `Buyback`, `ProfitSummary`, `ConversionMatrix`:
///   hand-written extraction for sheets with their own layout.
///
/// Every produced row passes through the deriver. Lookups that find nothing
/// fall back to a default; mapping never fails.

use crate::derive::derive_rows;
use crate::row::Row;
use crate::schema::{ColumnRole, SourceShape, TableSchema};
use crate::value::{coerce_number, round2, CellValue};
use crate::workbook::{is_blank, label_of, text_of, RawRecord, Workbook};
use regex::Regex;
use serde_json::Value as JsonValue;
use std::sync::OnceLock;

const CORE_INVENTORY_SHEET: &str = "CoreQInventory";
const OUT_BASE_SHEET: &str = "OutBase";

/// Initial required margin (%) for freshly imported rows.
const DEFAULT_REQUIRED_MARGIN: f64 = 40.0;

/// Ordered key matchers for one demand figure plus the key position used
/// when none of them match.
struct FigureLookup {
    patterns: Vec<Regex>,
    position: usize,
}

struct DemandLookups {
    demand_12m: FigureLookup,
    demand_24m: FigureLookup,
    finished_12m: FigureLookup,
    finished_24m: FigureLookup,
}

fn lookup(patterns: &[&str], position: usize) -> FigureLookup {
    FigureLookup {
        patterns: patterns
            .iter()
            .filter_map(|p| Regex::new(&format!("(?i){}", p)).ok())
            .collect(),
        position,
    }
}

fn demand_lookups() -> &'static DemandLookups {
    static LOOKUPS: OnceLock<DemandLookups> = OnceLock::new();
    LOOKUPS.get_or_init(|| DemandLookups {
        demand_12m: lookup(&[r"demand\s*12", r"12\s*m", r"demand.*12", r"12.*demand"], 1),
        demand_24m: lookup(&[r"demand\s*24", r"24\s*m", r"demand.*24", r"24.*demand"], 2),
        finished_12m: lookup(&[r"qinventory.*12", r"finished.*12", r"inventory.*12"], 3),
        finished_24m: lookup(&[r"qinventory.*24", r"finished.*24", r"inventory.*24"], 4),
    })
}

impl FigureLookup {
    /// First key matched by the earliest pattern, else the positional key.
    fn find_key<'a>(&self, keys: &[&'a String]) -> Option<&'a String> {
        self.patterns
            .iter()
            .find_map(|p| keys.iter().find(|k| p.is_match(k)).copied())
            .or_else(|| keys.get(self.position).copied())
    }

    fn read(&self, record: &RawRecord, keys: &[&String]) -> f64 {
        self.find_key(keys)
            .and_then(|k| record.get(k))
            .map(coerce_number)
            .unwrap_or(0.0)
    }
}

/// Map the workbook data for `schema` into derived rows.
pub fn map_sheet_to_rows(workbook: &Workbook, schema: &TableSchema) -> Vec<Row> {
    let rows = match &schema.shape {
        SourceShape::Generic => map_generic(workbook.sheet_lenient(&schema.source_sheet), schema),
        SourceShape::Demand { header } => {
            map_demand(workbook.sheet_lenient(&schema.source_sheet), header)
        }
        SourceShape::Recommendation => map_recommendation(
            workbook.sheet_lenient(CORE_INVENTORY_SHEET),
            workbook.sheet_lenient(OUT_BASE_SHEET),
        ),
        SourceShape::Buyback => map_buyback(workbook.sheet_lenient(&schema.source_sheet)),
        SourceShape::ProfitSummary => {
            map_profit_summary(workbook.sheet_lenient(&schema.source_sheet))
        }
        SourceShape::ConversionMatrix => {
            map_conversion_matrix(workbook.sheet_lenient(&schema.source_sheet), schema)
        }
    };
    log::debug!("mapped {} rows for table {}", rows.len(), schema.id);
    derive_rows(&rows, schema)
}

/// Source columns by field, then label; everything else starts blank.
pub fn map_generic(records: &[RawRecord], schema: &TableSchema) -> Vec<Row> {
    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let mut row = Row::at(i);
            for col in &schema.columns {
                let value = if col.role == ColumnRole::Source {
                    record
                        .get(&col.field)
                        .or_else(|| record.get(&col.label))
                        .map(|v| CellValue::from_json(v).coerce_to(col.value_type))
                        .unwrap_or(CellValue::Blank)
                } else {
                    CellValue::Blank
                };
                row.fields.insert(col.field.clone(), value);
            }
            row
        })
        .collect()
}

/// Demand-style tables: `item` plus 12/24 month demand and finished stock.
///
/// Records whose first cell is empty, null, or the header literal are skipped.
pub fn map_demand(records: &[RawRecord], header: &str) -> Vec<Row> {
    let lookups = demand_lookups();
    records
        .iter()
        .filter(|record| match record.values().next() {
            None | Some(JsonValue::Null) => false,
            Some(first) => {
                let label = label_of(Some(first));
                !label.is_empty() && label != header
            }
        })
        .enumerate()
        .map(|(i, record)| {
            let keys: Vec<&String> = record.keys().collect();
            let item = record
                .values()
                .next()
                .map(|v| text_of(v).trim().to_string())
                .unwrap_or_default();
            Row::at(i)
                .with("item", item)
                .with("demand_12m", lookups.demand_12m.read(record, &keys))
                .with("demand_24m", lookups.demand_24m.read(record, &keys))
                .with("finished_12m", lookups.finished_12m.read(record, &keys))
                .with("finished_24m", lookups.finished_24m.read(record, &keys))
                .with("required_12m", 0.0)
                .with("required_24m", 0.0)
        })
        .collect()
}

fn non_blank<'a>(records: &'a [RawRecord], key: &'a str) -> impl Iterator<Item = &'a JsonValue> {
    records
        .iter()
        .filter_map(move |r| r.get(key))
        .filter(|v| !is_blank(v))
}

fn at(values: &[CellValue], i: usize) -> CellValue {
    values.get(i).cloned().unwrap_or(CellValue::Blank)
}

/// Machine recommendation rows from the core inventory and base-result sheets.
///
/// Each source column is filtered on its own and the i-th entries are paired;
/// the row count is the longest of them.
pub fn map_recommendation(core_q: &[RawRecord], out_base: &[RawRecord]) -> Vec<Row> {
    let machine_types: Vec<CellValue> = core_q
        .iter()
        .filter_map(|r| r.get("System"))
        .filter(|v| is_truthy(v) && label_of(Some(*v)) != "system")
        .map(|v| CellValue::Text(text_of(v)))
        .collect();

    let qtc_prices: Vec<CellValue> = non_blank(out_base, "QTC average BB price")
        .map(|v| CellValue::number(coerce_number(v)))
        .collect();

    let recommended_buy: Vec<CellValue> = non_blank(out_base, "Recommended Buy for 12 M")
        .map(|v| CellValue::number(round2(coerce_number(v))))
        .collect();

    let qualified_units: Vec<CellValue> = core_q
        .iter()
        .filter_map(|r| {
            r.get("CoreInventory")
                .filter(|v| is_truthy(v))
                .or_else(|| r.get("coreinventory"))
        })
        .filter(|v| !is_blank(v) && label_of(Some(*v)) != "coreinventory")
        .map(|v| CellValue::number(round2(coerce_number(v))))
        .collect();

    let bundle_prices: Vec<CellValue> = non_blank(out_base, "Recommended BB Price on Bundle")
        .map(|v| CellValue::number(coerce_number(v)))
        .collect();

    let row_count = [
        machine_types.len(),
        qtc_prices.len(),
        recommended_buy.len(),
        qualified_units.len(),
        bundle_prices.len(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0);

    (0..row_count)
        .map(|i| {
            // Qualified units only size the table; the user captures them.
            Row::at(i)
                .with("machine_type", at(&machine_types, i))
                .with("offered_bundle", 0.0)
                .with("units_in_sales_pipeline", 0.0)
                .with("units_in_qualified_inventory", 0.0)
                .with("recommended_from_other_inventory", at(&recommended_buy, i))
                .with("spacer1", CellValue::Blank)
                .with("recommended_buy_12m", at(&recommended_buy, i))
                .with("required_margin", DEFAULT_REQUIRED_MARGIN)
                .with("qtc_avg_bb_price", at(&qtc_prices, i))
                .with("recommended_bb_price_on_bundle", at(&bundle_prices, i))
        })
        .collect()
}

/// Buy-back valuation rows: `type` contains "buy back", metric is not the total.
pub fn map_buyback(out_profit: &[RawRecord]) -> Vec<Row> {
    out_profit
        .iter()
        .filter(|r| {
            label_of(r.get("type")).contains("buy back") && label_of(r.get("Metric")) != "total"
        })
        .enumerate()
        .map(|(i, r)| {
            Row::at(i)
                .with("metric", metric_of(r))
                .with("valuation", r.get("Valuation").map(coerce_number).unwrap_or(0.0))
                .with("required_margin", DEFAULT_REQUIRED_MARGIN)
        })
        .collect()
}

/// Profit rows: `type` equals "profit". The sheet's `Margin` column feeds
/// the profit figure and its `Valuation` column the margin percentage.
pub fn map_profit_summary(out_profit: &[RawRecord]) -> Vec<Row> {
    out_profit
        .iter()
        .filter(|r| label_of(r.get("type")) == "profit")
        .enumerate()
        .map(|(i, r)| {
            Row::at(i)
                .with("metric", metric_of(r))
                .with("valuation", null_tolerant_number(r.get("Margin")))
                .with("margin", null_tolerant_number(r.get("Valuation")))
        })
        .collect()
}

/// Conversion matrix rows; numeric cells stay blank when the sheet lacks them.
pub fn map_conversion_matrix(records: &[RawRecord], schema: &TableSchema) -> Vec<Row> {
    records
        .iter()
        .enumerate()
        .map(|(i, r)| {
            let delta = ["Delta_{i,j}", "Delta"]
                .iter()
                .filter_map(|k| r.get(*k))
                .find(|v| is_truthy(v))
                .map(text_of)
                .unwrap_or_default();
            let mut row = Row::at(i).with("delta", delta);
            for col in schema.columns.iter().filter(|c| c.is_numeric()) {
                let value = match r.get(&col.label) {
                    None | Some(JsonValue::Null) => CellValue::Blank,
                    Some(v) => CellValue::number(coerce_number(v)),
                };
                row.fields.insert(col.field.clone(), value);
            }
            row
        })
        .collect()
}

fn metric_of(record: &RawRecord) -> String {
    record
        .get("Metric")
        .filter(|v| is_truthy(v))
        .map(text_of)
        .unwrap_or_default()
}

/// Spreadsheet exports sometimes spell an empty cell as `null` or `mnull`.
fn null_tolerant_number(value: Option<&JsonValue>) -> f64 {
    match value {
        None | Some(JsonValue::Null) => 0.0,
        Some(JsonValue::String(s)) if s == "null" || s == "mnull" || s.is_empty() => 0.0,
        Some(v) => coerce_number(v),
    }
}

fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        JsonValue::String(s) => !s.is_empty(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use serde_json::json;

    fn workbook(value: JsonValue) -> Workbook {
        Workbook::from_json(&value).unwrap()
    }

    #[test]
    fn test_demand_import_scenario() {
        let wb = workbook(json!({
            "Systems": [
                {"System": "275D", "Demand_12M": 5, "Demand_24M": 12, "Qinventory_12M": 1, "Qinventory_24M": 3}
            ]
        }));
        let rows = map_sheet_to_rows(&wb, &catalog::systems());
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.id, "0");
        assert_eq!(row.text("item"), "275D");
        assert_eq!(row.number("demand_12m"), 5.0);
        assert_eq!(row.number("demand_24m"), 12.0);
        assert_eq!(row.number("finished_12m"), 1.0);
        assert_eq!(row.number("finished_24m"), 3.0);
        assert_eq!(row.number("required_12m"), 4.0);
        assert_eq!(row.number("required_24m"), 9.0);
    }

    #[test]
    fn test_demand_filters_headers_and_blanks() {
        let wb = workbook(json!({
            "modules": [
                {"Module": "Module", "a": "Demand", "b": "", "c": "", "d": ""},
                {"Module": "", "a": 1, "b": 1, "c": 1, "d": 1},
                {"Module": null, "a": 1, "b": 1, "c": 1, "d": 1},
                {"Module": " M-1 ", "a": "1,500", "b": 20, "c": 100, "d": "x"}
            ]
        }));
        let rows = map_sheet_to_rows(&wb, &catalog::modules());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "0");
        assert_eq!(rows[0].text("item"), "M-1");
        // positional fallback: keys 2..5
        assert_eq!(rows[0].number("demand_12m"), 1500.0);
        assert_eq!(rows[0].number("demand_24m"), 20.0);
        assert_eq!(rows[0].number("finished_12m"), 100.0);
        assert_eq!(rows[0].number("finished_24m"), 0.0);
        assert_eq!(rows[0].number("required_12m"), 1400.0);
        assert_eq!(rows[0].number("required_24m"), 20.0);
    }

    #[test]
    fn test_demand_pattern_order_and_spelling() {
        let wb = workbook(json!({
            "Parts": [
                {"Part": "P1", "Finished Inventory 24": 2, "12 month demand": 9, "Demand 24": 4, "Finished 12": 10}
            ]
        }));
        let rows = map_sheet_to_rows(&wb, &catalog::parts());
        let r = &rows[0];
        assert_eq!(r.number("demand_12m"), 9.0);
        assert_eq!(r.number("demand_24m"), 4.0);
        assert_eq!(r.number("finished_12m"), 10.0);
        assert_eq!(r.number("finished_24m"), 2.0);
        assert_eq!(r.number("required_12m"), 0.0);
        assert_eq!(r.number("required_24m"), 2.0);
    }

    #[test]
    fn test_recommendation_pairs_columns_by_position() {
        let wb = workbook(json!({
            "CoreQInventory": [
                {"System": "System", "CoreInventory": "CoreInventory"},
                {"System": "275D", "CoreInventory": 3.456},
                {"System": "350C", "CoreInventory": 1},
                {"System": "", "CoreInventory": 2}
            ],
            "OutBase": [
                {"QTC average BB price": "1,000", "Recommended Buy for 12 M": 2.346, "Recommended BB Price on Bundle": 50},
                {"QTC average BB price": 900, "Recommended Buy for 12 M": "", "Recommended BB Price on Bundle": ""}
            ]
        }));
        let rows = map_sheet_to_rows(&wb, &catalog::machine_recommendation());
        // three qualified-unit entries size the table
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].text("machine_type"), "275D");
        assert_eq!(rows[0].number("qtc_avg_bb_price"), 1000.0);
        assert_eq!(rows[0].number("recommended_buy_12m"), 2.35);
        assert_eq!(rows[0].number("recommended_from_other_inventory"), 2.35);
        assert_eq!(rows[0].number("recommended_bb_price_on_bundle"), 50.0);
        assert_eq!(rows[0].number("required_margin"), 40.0);
        assert_eq!(rows[0].number("units_in_qualified_inventory"), 0.0);
        assert_eq!(rows[1].text("machine_type"), "350C");
        assert_eq!(rows[1].number("qtc_avg_bb_price"), 900.0);
        assert_eq!(rows[1].get("recommended_buy_12m"), Some(&CellValue::Blank));
        assert_eq!(rows[2].get("machine_type"), Some(&CellValue::Blank));
        assert_eq!(rows[2].get("qtc_avg_bb_price"), Some(&CellValue::Blank));
    }

    #[test]
    fn test_buyback_and_profit_from_out_profit() {
        let wb = workbook(json!({
            "OutProfit": [
                {"type": "Buy Back", "Metric": "Refurbishment", "Valuation": "1,250", "Margin": 1},
                {"type": "buy back ", "Metric": "Total", "Valuation": 9999, "Margin": 1},
                {"type": "Buy Back", "Metric": "Scrap", "Valuation": "n/a", "Margin": 1},
                {"type": "Profit", "Metric": "Refurbishment", "Valuation": 22.5, "Margin": "8,448"},
                {"type": "profit", "Metric": "Total", "Valuation": "null", "Margin": "mnull"}
            ]
        }));

        let buyback = map_sheet_to_rows(&wb, &catalog::max_buyback());
        assert_eq!(buyback.len(), 2);
        assert_eq!(buyback[0].text("metric"), "Refurbishment");
        assert_eq!(buyback[0].number("valuation"), 1250.0);
        assert_eq!(buyback[0].number("required_margin"), 40.0);
        assert_eq!(buyback[1].number("valuation"), 0.0);
        assert!(buyback.iter().all(|r| r.text("metric").to_lowercase() != "total"));

        let profit = map_sheet_to_rows(&wb, &catalog::expected_profit());
        assert_eq!(profit.len(), 2);
        assert_eq!(profit[0].number("valuation"), 8448.0);
        assert_eq!(profit[0].number("margin"), 22.5);
        assert_eq!(profit[1].text("metric"), "Total");
        assert_eq!(profit[1].number("valuation"), 0.0);
        assert_eq!(profit[1].number("margin"), 0.0);
    }

    #[test]
    fn test_conversion_matrix_trailing_space_sheet() {
        let wb = workbook(json!({
            "Conversion matrix": [
                {"Delta_{i,j}": "275D", "275D": 1, "350C": "0.5", "450F": null}
            ]
        }));
        let rows = map_sheet_to_rows(&wb, &catalog::conversion_matrix());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].text("delta"), "275D");
        assert_eq!(rows[0].number("275d"), 1.0);
        assert_eq!(rows[0].number("350c"), 0.5);
        assert_eq!(rows[0].get("450f"), Some(&CellValue::Blank));
        assert_eq!(rows[0].get("1150f"), Some(&CellValue::Blank));
    }

    #[test]
    fn test_generic_falls_back_to_label() {
        use crate::schema::ColumnSpec;
        use crate::value::ValueType;

        let schema = TableSchema::new("sales", "Sales", "Sales")
            .column(ColumnSpec::source("product", "Product", ValueType::String))
            .column(ColumnSpec::source("year", "Year", ValueType::Number))
            .column(ColumnSpec::editable("qty", "Qty", ValueType::Number));
        let wb = workbook(json!({
            "Sales": [{"Product": "Widget", "year": "2024", "qty": 9}, {"other": 1}]
        }));
        let rows = map_sheet_to_rows(&wb, &schema);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].text("product"), "Widget");
        assert_eq!(rows[0].get("year"), Some(&CellValue::Number(2024.0)));
        assert_eq!(rows[0].get("qty"), Some(&CellValue::Blank));
        assert_eq!(rows[1].get("product"), Some(&CellValue::Blank));
    }

    #[test]
    fn test_missing_sheets_give_empty_tables() {
        let wb = Workbook::new();
        for schema in catalog::all_schemas() {
            assert!(map_sheet_to_rows(&wb, &schema).is_empty(), "{}", schema.id);
        }
    }
}
