/// PlanTable - Schema-Driven Planning Tables
///
/// Imports a multi-sheet planning workbook into typed tables, keeps derived
/// columns consistent as cells are edited, persists the state after every
/// change, and merges optimizer results back into the tables the user is
/// working on.
///
/// Flow: workbook → [`mapper`] → [`derive`] → [`store::TableStore`] → edits →
/// [`optimizer`] request → response → [`merge`] → store → display with an
/// [`aggregate`] total row.

pub mod value;
pub mod schema;
pub mod row;
pub mod derive;
pub mod catalog;
pub mod workbook;
pub mod mapper;
pub mod aggregate;
pub mod changeset;
pub mod persist;
pub mod store;
pub mod merge;
pub mod optimizer;
pub mod export;
pub mod config;

pub use value::{coerce_number, parse_number, round2, CellValue, ValueType};
pub use schema::{AggregatePolicy, ColumnRole, ColumnSpec, Derivation, SourceShape, TableSchema};
pub use row::{Row, TableState};
pub use derive::{derive_row, derive_rows, DeriveError};
pub use workbook::{RawRecord, Workbook};
pub use mapper::map_sheet_to_rows;
pub use aggregate::{aggregate_row, display_rows, is_total_row, rows_with_aggregate, TOTAL_ROW_ID};
pub use changeset::{Changeset, TableChange};
pub use persist::{FileStorage, MemoryStorage, StateStorage, StorageError, STATE_KEY};
pub use store::{EditOutcome, TableStore};
pub use merge::{plan_merge, MergePlan};
pub use optimizer::{OptimizerError, OptimizerRequest, OptimizerResponse};
pub use export::{combined_csv, csv_file_name, rows_to_csv};
pub use config::AppConfig;

#[cfg(feature = "optimizer")]
pub use optimizer::{optimize, OptimizerClient};

// WebSocket server modules - only when server feature is enabled
#[cfg(feature = "server")]
pub mod messages;
#[cfg(feature = "server")]
pub mod websocket;
#[cfg(feature = "server")]
pub mod server;

#[cfg(test)]
mod integration_tests {
    use super::*;
    use serde_json::json;

    fn base_workbook() -> Workbook {
        Workbook::from_json(&json!({
            "CoreQInventory": [
                {"System": "System", "CoreInventory": "CoreInventory"},
                {"System": "275D", "CoreInventory": 2},
                {"System": "350C", "CoreInventory": 1}
            ],
            "OutBase": [
                {"QTC average BB price": 1200, "Recommended Buy for 12 M": 1, "Recommended BB Price on Bundle": 900},
                {"QTC average BB price": 800, "Recommended Buy for 12 M": 0, "Recommended BB Price on Bundle": 500}
            ],
            "OutProfit": [
                {"type": "Buy Back", "Metric": "Refurbishment", "Valuation": 5000, "Margin": 0},
                {"type": "Buy Back", "Metric": "Harvesting Modules", "Valuation": 3000, "Margin": 0},
                {"type": "Buy Back", "Metric": "Total", "Valuation": 8000, "Margin": 0},
                {"type": "Profit", "Metric": "Refurbishment", "Valuation": 20, "Margin": 1000},
                {"type": "Profit", "Metric": "Total", "Valuation": 22, "Margin": 1600}
            ],
            "Systems": [
                {"System": "275D", "Demand_12M": 5, "Demand_24M": 12, "Qinventory_12M": 1, "Qinventory_24M": 3}
            ],
            "Modules": [
                {"Module": "Module", "Demand 12M": "Demand 12M"},
                {"Module": "M1", "Demand 12M": 4, "Demand 24M": 6, "Finished 12": 4, "Finished 24": 10}
            ],
            "Parts": [],
            "Conversion matrix ": [
                {"Delta_{i,j}": "275D", "275D": 1, "350C": 0.5}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn test_complete_planning_round() {
        let mut store = TableStore::create(catalog::all_schemas(), Box::new(MemoryStorage::new()));

        // Import
        store.import_workbook(&base_workbook());
        assert_eq!(store.rows(catalog::MACHINE_RECOMMENDATION).unwrap().len(), 2);
        assert_eq!(store.rows(catalog::MAX_BUYBACK).unwrap().len(), 2);
        assert_eq!(store.rows(catalog::EXPECTED_PROFIT).unwrap().len(), 2);
        assert_eq!(store.rows(catalog::MODULES).unwrap()[0].number("required_24m"), 0.0);
        assert_eq!(store.rows(catalog::CONVERSION_MATRIX).unwrap()[0].number("350c"), 0.5);

        // Edit
        let outcome = store.edit_cell(catalog::SYSTEMS, "0", "finished_24m", CellValue::from_json(&json!("10")));
        assert!(outcome.is_applied());
        assert_eq!(store.rows(catalog::SYSTEMS).unwrap()[0].number("required_24m"), 2.0);
        store.edit_cell(catalog::MAX_BUYBACK, "0", "required_margin", CellValue::Number(18.0));
        store.edit_cell(catalog::MACHINE_RECOMMENDATION, "1", "offered_bundle", CellValue::Number(3.0));

        // Request
        let request = OptimizerRequest::from_state(store.state());
        assert_eq!(request.refurbishment_margin, 18.0);
        assert_eq!(request.harvesting_module_margin, 40.0);
        assert_eq!(request.total_margin, 22.0);
        assert_eq!(request.systems.len(), 1);

        // Response and merge
        let response: OptimizerResponse = serde_json::from_value(json!({
            "status": "success",
            "user_input1_data": [{"Offered Bundle": 2}, {}],
            "outbase_data": [
                {"recommended from inventory": 1, "Recommended Buy": 4, "Recommended BB Price": 950},
                {"Recommended Buy": 2}
            ],
            "user_input2_data": [{"Required Margin": 18}, {"Required Margin": 26}, {"Required Margin": 40}],
            "outprofit_data": [
                {"Metric": "Refurbishment", "Max_BBB_Valuation": 5100, "Profit": 900, "Margin_toGet": 18},
                {"Metric": "Harvesting Modules", "Max_BBB_Valuation": 3100, "Profit": 700, "Margin_toGet": 26},
                {"Metric": "Total", "Max_BBB_Valuation": 8200, "Profit": 1600, "Margin_toGet": 21}
            ]
        }))
        .unwrap();
        let response = response.into_result().unwrap();
        let plan = plan_merge(store.state(), &response);
        store.apply_merge(plan);

        let rec = store.rows(catalog::MACHINE_RECOMMENDATION).unwrap();
        assert_eq!(rec[0].number("offered_bundle"), 2.0);
        assert_eq!(rec[0].number("recommended_bb_price_on_bundle"), 950.0);
        assert_eq!(rec[1].number("offered_bundle"), 3.0);
        assert_eq!(rec[1].number("qtc_avg_bb_price"), 800.0);

        let buyback = store.rows(catalog::MAX_BUYBACK).unwrap();
        assert_eq!(buyback.len(), 2);
        assert_eq!(buyback[1].number("required_margin"), 26.0);

        let total = aggregate_row(buyback, store.schema(catalog::MAX_BUYBACK).unwrap()).unwrap();
        assert_eq!(total.number("valuation"), 8200.0);
        assert_eq!(total.number("required_margin"), 40.0);

        let profit = store.rows(catalog::EXPECTED_PROFIT).unwrap();
        assert_eq!(profit.len(), 3);
        assert!(aggregate_row(profit, store.schema(catalog::EXPECTED_PROFIT).unwrap()).is_none());

        // Export
        let csv = rows_to_csv(buyback, store.schema(catalog::MAX_BUYBACK).unwrap());
        assert_eq!(csv.lines().count(), 3);
        assert!(combined_csv(store.state(), store.schemas()).starts_with("table_id,row_id,machine_type"));
    }
}
