/// CSV export of table state.
///
/// Lines are joined with `\n` and carry no trailing newline. Cells holding a
/// comma, quote or newline are quoted with inner quotes doubled.

use crate::row::{Row, TableState};
use crate::schema::TableSchema;
use crate::value::CellValue;

fn escape(text: &str) -> String {
    if text.contains(',') || text.contains('"') || text.contains('\n') {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn cell(value: Option<&CellValue>) -> String {
    match value {
        None | Some(CellValue::Blank) => String::new(),
        Some(v) => escape(&v.to_text()),
    }
}

/// One table as CSV: a header of column labels, then one line per row in
/// schema column order.
pub fn rows_to_csv(rows: &[Row], schema: &TableSchema) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(
        schema
            .labels()
            .iter()
            .map(|l| escape(l))
            .collect::<Vec<_>>()
            .join(","),
    );
    for row in rows {
        let values: Vec<String> = schema
            .columns
            .iter()
            .map(|c| cell(row.get(&c.field)))
            .collect();
        lines.push(values.join(","));
    }
    lines.join("\n")
}

/// Download name for a table's export.
pub fn csv_file_name(table_id: &str) -> String {
    format!("{}_inputs.csv", table_id)
}

/// Every table in one document.
///
/// Each table contributes a `table_id,row_id,<fields>` header followed by
/// its rows, each prefixed with the table and row id.
pub fn combined_csv(state: &TableState, schemas: &[TableSchema]) -> String {
    let mut lines = Vec::new();
    for schema in schemas {
        let mut header = vec!["table_id".to_string(), "row_id".to_string()];
        header.extend(schema.field_names().iter().map(|f| escape(f)));
        lines.push(header.join(","));

        for row in state.get(&schema.id).map(|r| r.as_slice()).unwrap_or(&[]) {
            let mut values = vec![escape(&schema.id), escape(&row.id)];
            values.extend(schema.columns.iter().map(|c| cell(row.get(&c.field))));
            lines.push(values.join(","));
        }
    }
    lines.join("\n")
}
