/// Row derivation.
///
/// Recomputes every derived column of a row from its other fields, walking
/// the schema in column order so a derivation may read a derived value that
/// precedes it. A failing derivation blanks its own column and nothing else.

use crate::row::Row;
use crate::schema::{Derivation, TableSchema};
use crate::value::{round2, CellValue};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeriveError {
    #[error("derivation reads field '{0}' which the schema does not declare")]
    UnknownField(String),

    #[error("derivation produced a non-finite value")]
    NonFinite,
}

/// Evaluate one rule against a row.
pub fn evaluate(
    derivation: &Derivation,
    row: &Row,
    schema: &TableSchema,
) -> Result<CellValue, DeriveError> {
    let read = |field: &str| -> Result<f64, DeriveError> {
        if schema.get_column(field).is_none() {
            return Err(DeriveError::UnknownField(field.to_string()));
        }
        Ok(row.number(field))
    };

    let value = match derivation {
        Derivation::Shortfall { demand, finished } => {
            let delta = round2(read(demand)? - read(finished)?);
            delta.max(0.0)
        }
        Derivation::Product { left, right } => round2(read(left)? * read(right)?),
        Derivation::Ratio { numerator, denominator } => {
            let den = read(denominator)?;
            if den == 0.0 {
                0.0
            } else {
                round2(read(numerator)? / den * 100.0)
            }
        }
    };

    if value.is_finite() {
        Ok(CellValue::Number(value))
    } else {
        Err(DeriveError::NonFinite)
    }
}

/// Recompute every derived column of `row`.
pub fn derive_row(row: &Row, schema: &TableSchema) -> Row {
    let mut out = row.clone();
    for column in &schema.columns {
        let Some(derivation) = &column.derivation else {
            continue;
        };
        let value = match evaluate(derivation, &out, schema) {
            Ok(v) => v,
            Err(e) => {
                log::warn!(
                    "derive failed for {}.{} (row {}): {}",
                    schema.id,
                    column.field,
                    row.id,
                    e
                );
                CellValue::Blank
            }
        };
        out.fields.insert(column.field.clone(), value);
    }
    out
}

pub fn derive_rows(rows: &[Row], schema: &TableSchema) -> Vec<Row> {
    rows.iter().map(|r| derive_row(r, schema)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnSpec;
    use crate::value::ValueType;

    fn schema() -> TableSchema {
        TableSchema::new("systems", "System Demand", "Systems")
            .column(ColumnSpec::source("item", "Item", ValueType::String))
            .column(ColumnSpec::editable("demand_12m", "Demand 12M", ValueType::Number))
            .column(ColumnSpec::editable("finished_12m", "Finished 12M", ValueType::Number))
            .column(ColumnSpec::derived(
                "required_12m",
                "Required 12M",
                Derivation::Shortfall {
                    demand: "demand_12m".into(),
                    finished: "finished_12m".into(),
                },
            ))
    }

    #[test]
    fn test_shortfall() {
        let row = Row::at(0).with("item", "275D").with("demand_12m", 5.0).with("finished_12m", 1.0);
        let out = derive_row(&row, &schema());
        assert_eq!(out.get("required_12m"), Some(&CellValue::Number(4.0)));
        assert_eq!(out.text("item"), "275D");
    }

    #[test]
    fn test_shortfall_never_negative_and_rounded() {
        let over = Row::at(0).with("demand_12m", 1.0).with("finished_12m", 3.0);
        assert_eq!(derive_row(&over, &schema()).number("required_12m"), 0.0);

        let frac = Row::at(0).with("demand_12m", 2.555).with("finished_12m", 0.001);
        assert_eq!(derive_row(&frac, &schema()).number("required_12m"), 2.55);
    }

    #[test]
    fn test_text_inputs_use_number_policy() {
        let row = Row::at(0).with("demand_12m", "1,000").with("finished_12m", "junk");
        assert_eq!(derive_row(&row, &schema()).number("required_12m"), 1000.0);
    }

    #[test]
    fn test_failure_blanks_only_that_column() {
        let schema = schema()
            .column(ColumnSpec::derived(
                "broken",
                "Broken",
                Derivation::Product { left: "demand_12m".into(), right: "ghost".into() },
            ))
            .column(ColumnSpec::derived(
                "rate",
                "Rate",
                Derivation::Ratio {
                    numerator: "finished_12m".into(),
                    denominator: "demand_12m".into(),
                },
            ));
        let row = Row::at(0).with("demand_12m", 4.0).with("finished_12m", 1.0);
        let out = derive_row(&row, &schema);
        assert_eq!(out.get("broken"), Some(&CellValue::Blank));
        assert_eq!(out.number("required_12m"), 3.0);
        assert_eq!(out.number("rate"), 25.0);
    }

    #[test]
    fn test_non_finite_is_failure() {
        let schema = schema().column(ColumnSpec::derived(
            "huge",
            "Huge",
            Derivation::Product { left: "demand_12m".into(), right: "finished_12m".into() },
        ));
        let row = Row::at(0).with("demand_12m", 1e200).with("finished_12m", 1e200);
        assert_eq!(derive_row(&row, &schema).get("huge"), Some(&CellValue::Blank));
    }

    #[test]
    fn test_derive_is_idempotent() {
        let rows = vec![
            Row::at(0).with("demand_12m", 5.0).with("finished_12m", 1.0),
            Row::at(1).with("demand_12m", "3").with("finished_12m", CellValue::Blank),
            Row::at(2).with("required_12m", 99.0),
        ];
        let once = derive_rows(&rows, &schema());
        let twice = derive_rows(&once, &schema());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_ratio_zero_denominator() {
        let schema = TableSchema::new("q", "Q", "Q")
            .column(ColumnSpec::editable("passed", "Passed", ValueType::Number))
            .column(ColumnSpec::editable("tested", "Tested", ValueType::Number))
            .column(ColumnSpec::derived(
                "pass_rate",
                "Pass Rate",
                Derivation::Ratio { numerator: "passed".into(), denominator: "tested".into() },
            ));
        let row = Row::at(0).with("passed", 3.0).with("tested", 0.0);
        assert_eq!(derive_row(&row, &schema).number("pass_rate"), 0.0);
    }
}
