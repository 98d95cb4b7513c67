/// Result Merge
///
/// Splices an optimizer response into the current table state. Planning is
/// pure: [`plan_merge`] reads the state and the response and returns the new
/// rows per table; [`crate::store::TableStore::apply_merge`] swaps them in.
///
/// # Correlation
///
/// Response records carry no row ids. They are matched to rows by position,
/// the i-th record to the i-th row. A length mismatch is logged and the
/// extra side is ignored.
///
/// # Tables
///
/// - machine recommendation: editable fields overlaid from the first input
///   echo, outputs from the base result set; all other fields kept
/// - buy-back valuation: rebuilt from the profit result set without its
///   total rows, margins paired from the second input echo
/// - expected profit: rebuilt from the profit result set, one total row kept

use crate::catalog;
use crate::optimizer::OptimizerResponse;
use crate::row::{Row, TableState};
use crate::value::{coerce_number, CellValue};
use crate::workbook::{label_of, text_of, RawRecord};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

/// Response key -> row field, for values the user entered.
const INPUT_ECHO_FIELDS: [(&str, &str); 4] = [
    ("Offered Bundle", "offered_bundle"),
    ("Units in sales pipeline", "units_in_sales_pipeline"),
    ("Deal outcome probability", "deal_outcome_probability"),
    ("Required margin (%)", "required_margin"),
];

/// Response key -> row field, for optimizer outputs.
const OUTBASE_FIELDS: [(&str, &str); 3] = [
    ("recommended from inventory", "recommended_from_other_inventory"),
    ("Recommended Buy", "recommended_buy_12m"),
    ("Recommended BB Price", "recommended_bb_price_on_bundle"),
];

/// New rows for every table a response touches.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
    pub tables: BTreeMap<String, Vec<Row>>,
}

impl MergePlan {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table_ids(&self) -> Vec<&str> {
        self.tables.keys().map(|k| k.as_str()).collect()
    }
}

/// Plan the merge of `response` into `state`.
pub fn plan_merge(state: &TableState, response: &OptimizerResponse) -> MergePlan {
    let mut plan = MergePlan::default();

    let current = state
        .get(catalog::MACHINE_RECOMMENDATION)
        .map(|rows| rows.as_slice())
        .unwrap_or(&[]);
    plan.tables.insert(
        catalog::MACHINE_RECOMMENDATION.to_string(),
        merge_recommendation(
            current,
            response.user_input1_data.as_deref(),
            response.outbase_data.as_deref(),
        ),
    );

    let profit = response.outprofit_data.as_deref();
    // Without the margin echo the user's margins would be lost.
    if let (Some(profit), Some(echo)) = (profit, response.user_input2_data.as_deref()) {
        plan.tables.insert(
            catalog::MAX_BUYBACK.to_string(),
            merge_valuation(profit, echo),
        );
    }
    if let Some(profit) = profit {
        plan.tables.insert(
            catalog::EXPECTED_PROFIT.to_string(),
            merge_profit(profit),
        );
    }

    plan
}

fn warn_on_mismatch(what: &str, rows: usize, records: Option<&[RawRecord]>) {
    if let Some(records) = records {
        if records.len() != rows {
            log::warn!(
                "{}: {} rows but {} response records; pairing by position",
                what,
                rows,
                records.len()
            );
        }
    }
}

fn present(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| !v.is_null())
}

/// Overlay response values onto the current recommendation rows.
pub fn merge_recommendation(
    current: &[Row],
    input_echo: Option<&[RawRecord]>,
    outbase: Option<&[RawRecord]>,
) -> Vec<Row> {
    warn_on_mismatch("user input echo", current.len(), input_echo);
    warn_on_mismatch("base results", current.len(), outbase);

    current
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let mut merged = row.clone();
            if let Some(echo) = input_echo.and_then(|records| records.get(i)) {
                for (key, field) in INPUT_ECHO_FIELDS {
                    if let Some(value) = present(echo.get(key)) {
                        merged.set(field, CellValue::number(coerce_number(value)));
                    }
                }
            }
            if let Some(out) = outbase.and_then(|records| records.get(i)) {
                for (key, field) in OUTBASE_FIELDS {
                    let value = echo_number(out.get(key));
                    merged.set(field, value);
                }
            }
            merged
        })
        .collect()
}

/// Missing, null, or unparseable counts as 0.
fn echo_number(value: Option<&JsonValue>) -> f64 {
    value.map(coerce_number).unwrap_or(0.0)
}

fn metric_text(record: &RawRecord) -> String {
    record.get("Metric").map(text_of).unwrap_or_default()
}

/// Buy-back valuation rows; total rows are dropped.
///
/// A record keeps its response position when pairing with the input echo,
/// so dropping a total does not shift the margins of later rows.
pub fn merge_valuation(profit: &[RawRecord], input_echo: &[RawRecord]) -> Vec<Row> {
    warn_on_mismatch("user input echo #2", profit.len(), Some(input_echo));

    profit
        .iter()
        .enumerate()
        .filter(|(_, record)| label_of(record.get("Metric")) != "total")
        .enumerate()
        .map(|(i, (position, record))| {
            let margin = input_echo
                .get(position)
                .map(|echo| echo_number(echo.get("Required Margin")))
                .unwrap_or(0.0);
            Row::at(i)
                .with("metric", metric_text(record))
                .with("valuation", echo_number(record.get("Max_BBB_Valuation")))
                .with("required_margin", margin)
        })
        .collect()
}

/// Expected profit rows. Records without a usable metric are dropped and only
/// the first total row survives.
pub fn merge_profit(profit: &[RawRecord]) -> Vec<Row> {
    let mut seen_total = false;
    profit
        .iter()
        .filter(|record| {
            let metric = metric_text(record);
            !metric.is_empty() && metric != "null"
        })
        .filter(|record| {
            if label_of(record.get("Metric")) != "total" {
                return true;
            }
            let first = !seen_total;
            seen_total = true;
            first
        })
        .enumerate()
        .map(|(i, record)| {
            Row::at(i)
                .with("metric", metric_text(record))
                .with("valuation", echo_number(record.get("Profit")))
                .with("margin", echo_number(record.get("Margin_toGet")))
        })
        .collect()
}
