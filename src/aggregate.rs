/// Total rows.
///
/// The total row is synthesized for display and export only; it is never
/// stored. How it is computed is the schema's [`AggregatePolicy`].

use crate::row::Row;
use crate::schema::{AggregatePolicy, ColumnRole, TableSchema};
use crate::value::CellValue;

/// Id of the synthetic total row.
pub const TOTAL_ROW_ID: &str = "total";

const TOTAL_LABEL: &str = "Total";

/// True for rows that are themselves totals, either our synthetic row or a
/// total row carried over from the source sheet.
pub fn is_total_row(row: &Row, schema: &TableSchema) -> bool {
    if row.id == TOTAL_ROW_ID {
        return true;
    }
    let first = schema.columns.first().map(|c| c.field.as_str());
    [first, Some("metric")]
        .into_iter()
        .flatten()
        .any(|field| row.text(field).trim().eq_ignore_ascii_case(TOTAL_ROW_ID))
}

/// Compute the total row for `rows`, or `None` when the policy suppresses it
/// or the table is empty.
///
/// Numeric editable and derived columns are summed under the coercion policy
/// and floored, unless the column opts out with [`not_summed`](crate::schema::ColumnSpec::not_summed). Everything else is blank, except the first column, which
/// reads `Total`.
pub fn aggregate_row(rows: &[Row], schema: &TableSchema) -> Option<Row> {
    if schema.aggregate == AggregatePolicy::Suppressed {
        return None;
    }
    let data: Vec<&Row> = rows.iter().filter(|r| !is_total_row(r, schema)).collect();
    if data.is_empty() {
        return None;
    }

    let mut total = Row::new(TOTAL_ROW_ID);
    for (i, col) in schema.columns.iter().enumerate() {
        let summable = col.summed
            && col.is_numeric()
            && matches!(col.role, ColumnRole::Editable | ColumnRole::Derived);
        let value = if summable {
            let sum: f64 = data.iter().map(|r| r.number(&col.field)).sum();
            CellValue::number(sum.floor())
        } else if i == 0 {
            CellValue::text(TOTAL_LABEL)
        } else {
            CellValue::Blank
        };
        total.fields.insert(col.field.clone(), value);
    }

    if let AggregatePolicy::SumWithOverride { field, value } = &schema.aggregate {
        total.set(field, *value);
    }
    Some(total)
}

/// Data rows and total row for display.
///
/// Totals carried over from the source sheet are dropped in favour of the
/// computed one. A table whose policy suppresses the total keeps its rows
/// as they are.
pub fn display_rows(rows: &[Row], schema: &TableSchema) -> (Vec<Row>, Option<Row>) {
    if schema.aggregate == AggregatePolicy::Suppressed {
        return (rows.to_vec(), None);
    }
    let data = rows
        .iter()
        .filter(|r| !is_total_row(r, schema))
        .cloned()
        .collect();
    (data, aggregate_row(rows, schema))
}

/// Rows for display with the total row appended.
pub fn rows_with_aggregate(rows: &[Row], schema: &TableSchema) -> Vec<Row> {
    let (mut out, total) = display_rows(rows, schema);
    out.extend(total);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;

    #[test]
    fn test_sum_floors_numeric_columns() {
        let schema = catalog::systems();
        let rows = vec![
            Row::at(0).with("item", "275D").with("demand_12m", 5.5).with("required_12m", 4.5),
            Row::at(1).with("item", "350C").with("demand_12m", "2,000").with("required_12m", 0.75),
        ];
        let total = aggregate_row(&rows, &schema).unwrap();
        assert_eq!(total.id, "total");
        assert_eq!(total.text("item"), "Total");
        assert_eq!(total.number("demand_12m"), 2005.0);
        assert_eq!(total.number("required_12m"), 5.0);
        assert_eq!(total.number("finished_24m"), 0.0);
    }

    #[test]
    fn test_override_pins_margin() {
        let schema = catalog::max_buyback();
        let rows = vec![
            Row::at(0).with("metric", "Refurbishment").with("valuation", 100.9).with("required_margin", 20.0),
            Row::at(1).with("metric", "Modules").with("valuation", 50.0).with("required_margin", 25.0),
            Row::at(2).with("metric", "Total").with("valuation", 999.0).with("required_margin", 22.0),
        ];
        let total = aggregate_row(&rows, &schema).unwrap();
        assert_eq!(total.text("metric"), "Total");
        assert_eq!(total.number("valuation"), 150.0);
        assert_eq!(total.number("required_margin"), 40.0);
    }

    #[test]
    fn test_suppressed_and_empty() {
        let rows = vec![Row::at(0).with("metric", "A").with("valuation", 1.0)];
        assert!(aggregate_row(&rows, &catalog::expected_profit()).is_none());
        assert!(aggregate_row(&[], &catalog::systems()).is_none());
        assert_eq!(rows_with_aggregate(&rows, &catalog::expected_profit()), rows);
    }

    #[test]
    fn test_suppressed_table_keeps_source_total() {
        let schema = catalog::expected_profit();
        let rows = vec![
            Row::at(0).with("metric", "Refurbishment").with("valuation", 10.0),
            Row::at(1).with("metric", "Total").with("valuation", 10.0),
        ];
        let (shown, total) = display_rows(&rows, &schema);
        assert_eq!(shown, rows);
        assert!(total.is_none());
    }

    #[test]
    fn test_source_columns_not_summed() {
        let schema = catalog::machine_recommendation();
        let rows = vec![
            Row::at(0).with("machine_type", "275D").with("qtc_avg_bb_price", 10.0).with("offered_bundle", 3.0),
            Row::at(1).with("machine_type", "350C").with("qtc_avg_bb_price", 20.0).with("offered_bundle", 4.0),
        ];
        let total = aggregate_row(&rows, &schema).unwrap();
        assert_eq!(total.get("qtc_avg_bb_price"), Some(&CellValue::Blank));
        assert_eq!(total.number("offered_bundle"), 7.0);
        assert_eq!(total.text("machine_type"), "Total");
    }

    #[test]
    fn test_margin_percentages_not_summed() {
        let schema = catalog::machine_recommendation();
        let rows = vec![
            Row::at(0).with("machine_type", "275D").with("required_margin", 40.0).with("recommended_buy_12m", 2.0),
            Row::at(1).with("machine_type", "350C").with("required_margin", 40.0).with("recommended_buy_12m", 3.0),
        ];
        let total = aggregate_row(&rows, &schema).unwrap();
        assert_eq!(total.get("required_margin"), Some(&CellValue::Blank));
        assert_eq!(total.number("recommended_buy_12m"), 5.0);
    }

    #[test]
    fn test_rows_with_aggregate_replaces_stale_total() {
        let schema = catalog::parts();
        let rows = vec![
            Row::at(0).with("item", "P1").with("demand_12m", 1.0),
            Row::new("total").with("item", "Total").with("demand_12m", 50.0),
        ];
        let (data, total) = display_rows(&rows, &schema);
        assert_eq!(data.len(), 1);
        assert_eq!(total.map(|t| t.number("demand_12m")), Some(1.0));

        let shown = rows_with_aggregate(&rows, &schema);
        assert_eq!(shown.len(), 2);
        assert_eq!(shown[1].id, "total");
        assert_eq!(shown[1].number("demand_12m"), 1.0);
    }
}
