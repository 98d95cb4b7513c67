/// The planning tables shipped with the buy-back planner.
///
/// Seven tables: the machine recommendation, the buy-back valuation and
/// expected-profit summaries, three structurally identical demand tables,
/// and the conversion matrix.

use crate::schema::{AggregatePolicy, ColumnSpec, Derivation, SourceShape, TableSchema};
use crate::value::ValueType::{Number, String as Text};

pub const MACHINE_RECOMMENDATION: &str = "machine_recommendation";
pub const MAX_BUYBACK: &str = "max_buyback";
pub const EXPECTED_PROFIT: &str = "expected_profit";
pub const SYSTEMS: &str = "systems";
pub const MODULES: &str = "modules";
pub const PARTS: &str = "parts";
pub const CONVERSION_MATRIX: &str = "conversion_matrix";

/// Margin pinned on the buy-back total row.
pub const TOTAL_REQUIRED_MARGIN: f64 = 40.0;

pub fn machine_recommendation() -> TableSchema {
    TableSchema::new(MACHINE_RECOMMENDATION, "System Recommendation", "MachineRecommendation")
        .with_shape(SourceShape::Recommendation)
        .column(ColumnSpec::source("machine_type", "Machine type", Text))
        .column(ColumnSpec::editable("offered_bundle", "Customer excess for sale", Number))
        .column(ColumnSpec::editable("units_in_sales_pipeline", "Expected Buy Back", Number))
        .column(ColumnSpec::source(
            "units_in_qualified_inventory",
            "Units in qualified inventory",
            Number,
        ))
        .column(ColumnSpec::output(
            "recommended_from_other_inventory",
            "Recommend from other inventory",
            Number,
        ))
        .column(ColumnSpec::spacer("spacer1"))
        .column(ColumnSpec::output("recommended_buy_12m", "Recommend Buy for 12 M", Number))
        .column(ColumnSpec::editable("required_margin", "Required margin (%)", Number).not_summed())
        .column(ColumnSpec::source("qtc_avg_bb_price", "QTC average BB price", Number))
        .column(ColumnSpec::output(
            "recommended_bb_price_on_bundle",
            "Max Buy Back Bundle Valuation",
            Number,
        ))
}

pub fn max_buyback() -> TableSchema {
    TableSchema::new(MAX_BUYBACK, "Max Buy Back Bundle Valuation (K)", "OutProfit")
        .with_shape(SourceShape::Buyback)
        .with_aggregate(AggregatePolicy::SumWithOverride {
            field: "required_margin".to_string(),
            value: TOTAL_REQUIRED_MARGIN,
        })
        .column(ColumnSpec::source("metric", "Metric", Text))
        .column(ColumnSpec::output("valuation", "Valuation", Number))
        .column(ColumnSpec::editable("required_margin", "Required Margin (%)", Number))
}

pub fn expected_profit() -> TableSchema {
    TableSchema::new(EXPECTED_PROFIT, "Expected Profit on Bundle", "OutProfit")
        .with_shape(SourceShape::ProfitSummary)
        .with_aggregate(AggregatePolicy::Suppressed)
        .column(ColumnSpec::source("metric", "Metric", Text))
        .column(ColumnSpec::output("valuation", "Profit", Number))
        .column(ColumnSpec::output("margin", "Margin (%)", Number))
}

fn demand(id: &str, name: &str, sheet: &str, item_label: &str) -> TableSchema {
    TableSchema::new(id, name, sheet)
        .with_shape(SourceShape::Demand {
            header: item_label.to_lowercase(),
        })
        .column(ColumnSpec::source("item", item_label, Text))
        .column(ColumnSpec::editable("demand_12m", "Demand 12M", Number))
        .column(ColumnSpec::editable("demand_24m", "Demand 24M", Number))
        .column(ColumnSpec::editable("finished_12m", "Finished Inventory 12M", Number))
        .column(ColumnSpec::editable("finished_24m", "Finished Inventory 24M", Number))
        .column(ColumnSpec::derived(
            "required_12m",
            "Required 12M",
            Derivation::Shortfall {
                demand: "demand_12m".to_string(),
                finished: "finished_12m".to_string(),
            },
        ))
        .column(ColumnSpec::derived(
            "required_24m",
            "Required 24M",
            Derivation::Shortfall {
                demand: "demand_24m".to_string(),
                finished: "finished_24m".to_string(),
            },
        ))
}

pub fn systems() -> TableSchema {
    demand(SYSTEMS, "System Demand", "Systems", "System")
}

pub fn modules() -> TableSchema {
    demand(MODULES, "Modules Demand", "Modules", "Module")
}

pub fn parts() -> TableSchema {
    demand(PARTS, "Parts Demand", "Parts", "Part")
}

pub fn conversion_matrix() -> TableSchema {
    TableSchema::new(CONVERSION_MATRIX, "Conversion Matrix", "Conversion matrix ")
        .with_shape(SourceShape::ConversionMatrix)
        .column(ColumnSpec::source("delta", "Delta_{i,j}", Text))
        .column(ColumnSpec::source("275d", "275D", Number))
        .column(ColumnSpec::source("350c", "350C", Number))
        .column(ColumnSpec::source("450f", "450F", Number))
        .column(ColumnSpec::source("850f", "850F", Number))
        .column(ColumnSpec::source("1150f", "1150F", Number))
}

/// Every active table, in display order.
pub fn all_schemas() -> Vec<TableSchema> {
    vec![
        machine_recommendation(),
        max_buyback(),
        expected_profit(),
        systems(),
        modules(),
        parts(),
        conversion_matrix(),
    ]
}
