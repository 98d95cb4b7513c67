/// Planning Round Example
///
/// This example demonstrates:
/// - Importing a workbook into the planning tables
/// - Editing cells and watching derived columns follow
/// - Building the optimizer request
/// - Merging a canned optimizer response
/// - Showing total rows and exporting CSV
///
/// Set `OPTIMIZER_URL` to send the request to a running optimizer instead of
/// using the canned response.

use plantable::*;
use serde_json::json;

fn print_table(store: &TableStore, table_id: &str) {
    let (Some(schema), Some(rows)) = (store.schema(table_id), store.rows(table_id)) else {
        return;
    };
    println!("   [{}]", schema.display_name);
    for row in rows_with_aggregate(rows, schema) {
        let cells: Vec<String> = schema
            .columns
            .iter()
            .filter(|c| c.role != ColumnRole::None)
            .map(|c| format!("{}={}", c.field, row.text(&c.field)))
            .collect();
        println!("     {:>5} | {}", row.id, cells.join(", "));
    }
}

fn canned_response() -> OptimizerResponse {
    serde_json::from_value(json!({
        "status": "success",
        "message": "Optimization completed successfully",
        "user_input1_data": [{"Offered Bundle": 4, "Units in sales pipeline": 2}],
        "outbase_data": [{"recommended from inventory": 1, "Recommended Buy": 3, "Recommended BB Price": 1150}],
        "user_input2_data": [{"Required Margin": 20}, {"Required Margin": 25}, {"Required Margin": 40}],
        "outprofit_data": [
            {"Metric": "Refurbishment", "Max_BBB_Valuation": 5200, "Profit": 1040, "Margin_toGet": 20},
            {"Metric": "Harvesting Modules", "Max_BBB_Valuation": 2100, "Profit": 525, "Margin_toGet": 25},
            {"Metric": "Total", "Max_BBB_Valuation": 7300, "Profit": 1565, "Margin_toGet": 21.4}
        ]
    }))
    .expect("canned response is valid")
}

#[tokio::main]
async fn main() {
    println!("=== PlanTable Planning Round Example ===\n");

    // 1. Create the store
    println!("1. Creating store...");
    let mut store = TableStore::create(catalog::all_schemas(), Box::new(MemoryStorage::new()));
    println!("   {} tables ready\n", store.schemas().len());

    // 2. Import a workbook
    println!("2. Importing workbook...");
    let workbook = Workbook::from_json(&json!({
        "CoreQInventory": [
            {"System": "System", "CoreInventory": "CoreInventory"},
            {"System": "275D", "CoreInventory": 2}
        ],
        "OutBase": [
            {"QTC average BB price": "1,200", "Recommended Buy for 12 M": 1.5, "Recommended BB Price on Bundle": 1100}
        ],
        "OutProfit": [
            {"type": "Buy Back", "Metric": "Refurbishment", "Valuation": 5000},
            {"type": "Buy Back", "Metric": "Harvesting Modules", "Valuation": 2000},
            {"type": "Buy Back", "Metric": "Total", "Valuation": 7000},
            {"type": "Profit", "Metric": "Total", "Valuation": 21, "Margin": 1500}
        ],
        "Systems": [
            {"System": "275D", "Demand_12M": 5, "Demand_24M": 12, "Qinventory_12M": 1, "Qinventory_24M": 3},
            {"System": "350C", "Demand_12M": 2, "Demand_24M": 4, "Qinventory_12M": 3, "Qinventory_24M": 3}
        ]
    }))
    .expect("demo workbook is valid");
    store.import_workbook(&workbook);
    print_table(&store, catalog::SYSTEMS);
    println!();

    // 3. Edit cells
    println!("3. Editing cells...");
    let outcome = store.edit_cell(catalog::SYSTEMS, "1", "demand_12m", CellValue::text("10"));
    println!("   systems/1 demand_12m=10 -> {:?}", outcome.is_applied());
    let outcome = store.edit_cell(catalog::SYSTEMS, "7", "demand_12m", CellValue::Number(1.0));
    println!("   systems/7 (missing row) -> {:?}", outcome);
    store.edit_cell(catalog::MAX_BUYBACK, "0", "required_margin", CellValue::Number(20.0));
    print_table(&store, catalog::SYSTEMS);
    println!();

    // 4. Build the optimizer request
    println!("4. Building optimizer request...");
    let request = OptimizerRequest::from_state(store.state());
    println!(
        "   margins: refurbishment={} module={} parts={} total={}\n",
        request.refurbishment_margin,
        request.harvesting_module_margin,
        request.harvesting_parts_margin,
        request.total_margin
    );

    // 5. Run or simulate the optimizer and merge
    println!("5. Merging optimizer results...");
    match std::env::var("OPTIMIZER_URL") {
        Ok(url) => match OptimizerClient::new(&url) {
            Ok(client) => match optimize(&mut store, &client).await {
                Ok(response) => println!("   optimizer: {}", response.message.unwrap_or_default()),
                Err(e) => println!("   optimizer failed, tables unchanged: {}", e),
            },
            Err(e) => println!("   could not build client: {}", e),
        },
        Err(_) => {
            let plan = plan_merge(store.state(), &canned_response());
            println!("   canned response touches {:?}", plan.table_ids());
            store.apply_merge(plan);
        }
    }
    print_table(&store, catalog::MACHINE_RECOMMENDATION);
    print_table(&store, catalog::MAX_BUYBACK);
    print_table(&store, catalog::EXPECTED_PROFIT);
    println!();

    // 6. Export
    println!("6. Exporting...");
    let schema = store.schema(catalog::MAX_BUYBACK).expect("catalog table");
    let rows = store.rows(catalog::MAX_BUYBACK).unwrap_or(&[]);
    println!("   {}:", csv_file_name(catalog::MAX_BUYBACK));
    for line in rows_to_csv(rows, schema).lines() {
        println!("     {}", line);
    }

    println!("\n=== Example Complete ===");
}
