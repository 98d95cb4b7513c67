/// PlanTable Schema Definitions
///
/// A `TableSchema` describes one planning table: its stable id, where its
/// data comes from in the workbook, how its total row is computed, and an
/// ordered list of columns. Column order is display order and CSV order.
///
/// Schemas are plain data. Derived columns name their rule with a
/// [`Derivation`] variant instead of carrying a closure, so a schema can be
/// serialized, compared and audited.
///
/// # Examples
///
/// ```
/// use plantable::{ColumnSpec, Derivation, TableSchema, ValueType};
///
/// let schema = TableSchema::new("stock", "Stock", "Stock")
///     .column(ColumnSpec::source("item", "Item", ValueType::String))
///     .column(ColumnSpec::editable("demand", "Demand", ValueType::Number))
///     .column(ColumnSpec::editable("on_hand", "On hand", ValueType::Number))
///     .column(ColumnSpec::derived(
///         "required",
///         "Required",
///         Derivation::Shortfall { demand: "demand".into(), finished: "on_hand".into() },
///     ));
///
/// assert_eq!(schema.len(), 4);
/// assert_eq!(schema.column_index("on_hand"), Some(2));
/// ```

use crate::value::ValueType;
use serde::{Deserialize, Serialize};

/// Where a column's value originates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnRole {
    /// Read-only data imported from the workbook
    Source,
    /// Captured from the user
    Editable,
    /// Computed locally or supplied by the optimizer
    Derived,
    /// Layout-only column (spacers)
    None,
}

/// Rule used to compute a derived column from the other fields of its row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Derivation {
    /// `max(0, round2(demand - finished))`
    Shortfall { demand: String, finished: String },
    /// `round2(left * right)`
    Product { left: String, right: String },
    /// `round2(100 * numerator / denominator)`, `0` for a zero denominator
    Ratio { numerator: String, denominator: String },
}

impl Derivation {
    /// Fields this rule reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            Derivation::Shortfall { demand, finished } => vec![demand, finished],
            Derivation::Product { left, right } => vec![left, right],
            Derivation::Ratio { numerator, denominator } => vec![numerator, denominator],
        }
    }
}

/// Declarative description of a single column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: String,
    pub label: String,
    pub role: ColumnRole,
    pub value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derivation: Option<Derivation>,
    /// Whether the total row sums this column
    #[serde(default = "summed_by_default")]
    pub summed: bool,
}

fn summed_by_default() -> bool {
    true
}

impl ColumnSpec {
    fn with_role(field: &str, label: &str, role: ColumnRole, value_type: ValueType) -> Self {
        ColumnSpec {
            field: field.to_string(),
            label: label.to_string(),
            role,
            value_type,
            derivation: None,
            summed: true,
        }
    }

    pub fn source(field: &str, label: &str, value_type: ValueType) -> Self {
        Self::with_role(field, label, ColumnRole::Source, value_type)
    }

    pub fn editable(field: &str, label: &str, value_type: ValueType) -> Self {
        Self::with_role(field, label, ColumnRole::Editable, value_type)
    }

    /// A derived column whose values arrive from outside (optimizer output).
    pub fn output(field: &str, label: &str, value_type: ValueType) -> Self {
        Self::with_role(field, label, ColumnRole::Derived, value_type)
    }

    /// A numeric derived column computed locally by `derivation`.
    pub fn derived(field: &str, label: &str, derivation: Derivation) -> Self {
        ColumnSpec {
            derivation: Some(derivation),
            ..Self::with_role(field, label, ColumnRole::Derived, ValueType::Number)
        }
    }

    pub fn spacer(field: &str) -> Self {
        Self::with_role(field, "", ColumnRole::None, ValueType::String)
    }

    /// Leave this column blank in the total row (percentages, rates).
    pub fn not_summed(mut self) -> Self {
        self.summed = false;
        self
    }

    pub fn is_numeric(&self) -> bool {
        self.value_type == ValueType::Number
    }

    pub fn is_editable(&self) -> bool {
        self.role == ColumnRole::Editable
    }
}

/// Which extraction rules the sheet mapper applies to a table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceShape {
    /// Look each source column up by field, then label
    Generic,
    /// Item plus demand / finished inventory figures located by pattern
    Demand { header: String },
    /// Machine recommendation assembled from inventory and base-result sheets
    Recommendation,
    /// Buy-back valuation rows from the profit sheet
    Buyback,
    /// Profit rows from the profit sheet
    ProfitSummary,
    /// Conversion matrix, sheet name carries a trailing space
    ConversionMatrix,
}

/// How a table's total row is produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AggregatePolicy {
    /// Sum numeric editable and derived columns
    Sum,
    /// Sum, but pin one field to a constant
    SumWithOverride { field: String, value: f64 },
    /// No total row; the source data already carries one
    Suppressed,
}

/// Schema definition for a planning table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub id: String,
    pub display_name: String,
    pub source_sheet: String,
    pub shape: SourceShape,
    pub aggregate: AggregatePolicy,
    pub columns: Vec<ColumnSpec>,
}

impl TableSchema {
    /// Creates an empty generic schema; add columns with [`TableSchema::column`].
    pub fn new(id: &str, display_name: &str, source_sheet: &str) -> Self {
        TableSchema {
            id: id.to_string(),
            display_name: display_name.to_string(),
            source_sheet: source_sheet.to_string(),
            shape: SourceShape::Generic,
            aggregate: AggregatePolicy::Sum,
            columns: Vec::new(),
        }
    }

    pub fn with_shape(mut self, shape: SourceShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn with_aggregate(mut self, aggregate: AggregatePolicy) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    /// Returns the number of columns in the schema.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the schema has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.field.as_str()).collect()
    }

    pub fn labels(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.label.as_str()).collect()
    }

    pub fn column_index(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub fn get_column(&self, field: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.field == field)
    }

    /// Check the structural invariants: unique fields, and a derivation only
    /// on derived columns whose inputs exist in the schema.
    pub fn validate(&self) -> Result<(), String> {
        for (i, col) in self.columns.iter().enumerate() {
            if self.columns[..i].iter().any(|c| c.field == col.field) {
                return Err(format!("Table '{}': duplicate field '{}'", self.id, col.field));
            }
            if let Some(derivation) = &col.derivation {
                if col.role != ColumnRole::Derived {
                    return Err(format!(
                        "Table '{}': column '{}' has a derivation but is not derived",
                        self.id, col.field
                    ));
                }
                for input in derivation.inputs() {
                    if self.get_column(input).is_none() {
                        return Err(format!(
                            "Table '{}': column '{}' reads unknown field '{}'",
                            self.id, col.field, input
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
