/// HTTP server with WebSocket support for the planning tables
use actix_web::{http::header, middleware, web, App, Error, HttpRequest, HttpResponse, HttpServer};
use actix_web_actors::ws;
use serde_json::{json, Value as JsonValue};

use crate::catalog;
use crate::config::AppConfig;
use crate::export::{combined_csv, csv_file_name, rows_to_csv};
use crate::merge::plan_merge;
use crate::messages::ServerMessage;
use crate::optimizer::{OptimizerClient, OptimizerRequest};
use crate::persist::FileStorage;
use crate::store::TableStore;
use crate::websocket::{AppState, TableWebSocket};
use crate::workbook::Workbook;

/// Workbooks are posted whole.
const MAX_WORKBOOK_BYTES: usize = 32 * 1024 * 1024;

/// WebSocket endpoint handler
async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let resp = ws::start(TableWebSocket::new(state), &req, stream)?;
    Ok(resp)
}

/// Health check endpoint
async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "message": "PlanTable server is running"
    }))
}

fn not_found(table_id: &str) -> HttpResponse {
    HttpResponse::NotFound().json(json!({
        "status": "error",
        "message": format!("Unknown table '{}'", table_id)
    }))
}

/// Every table with its schema, rows and total row
async fn list_tables(state: web::Data<AppState>) -> HttpResponse {
    let store = state.store();
    let tables: Vec<ServerMessage> = store
        .schemas()
        .iter()
        .filter_map(|s| ServerMessage::table_data(&store, &s.id))
        .collect();
    HttpResponse::Ok().json(json!({ "tables": tables }))
}

async fn get_table(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let table_id = path.into_inner();
    match ServerMessage::table_data(&state.store(), &table_id) {
        Some(msg) => HttpResponse::Ok().json(msg),
        None => not_found(&table_id),
    }
}

async fn table_csv(state: web::Data<AppState>, path: web::Path<String>) -> HttpResponse {
    let table_id = path.into_inner();
    let csv = {
        let store = state.store();
        let Some(schema) = store.schema(&table_id) else {
            return not_found(&table_id);
        };
        rows_to_csv(store.rows(&table_id).unwrap_or(&[]), schema)
    };
    HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", csv_file_name(&table_id)),
        ))
        .body(csv)
}

/// All tables in one CSV document
async fn export_all(state: web::Data<AppState>) -> HttpResponse {
    let csv = {
        let store = state.store();
        combined_csv(store.state(), store.schemas())
    };
    HttpResponse::Ok()
        .content_type("text/csv")
        .insert_header((
            header::CONTENT_DISPOSITION,
            "attachment; filename=\"all_tables.csv\"",
        ))
        .body(csv)
}

/// Replace every table from a posted workbook
async fn import_workbook(state: web::Data<AppState>, body: web::Json<JsonValue>) -> HttpResponse {
    let workbook = match Workbook::from_json(&body) {
        Ok(workbook) => workbook,
        Err(message) => {
            return HttpResponse::BadRequest().json(json!({ "status": "error", "message": message }))
        }
    };
    log::info!("importing workbook with sheets {:?}", workbook.sheet_names());

    let counts: serde_json::Map<String, JsonValue> = {
        let mut store = state.store();
        store.import_workbook(&workbook);
        store
            .state()
            .iter()
            .map(|(id, rows)| (id.clone(), json!(rows.len())))
            .collect()
    };
    state.publish_changes();
    HttpResponse::Ok().json(json!({ "status": "success", "tables": counts }))
}

/// Run an optimizer round trip and merge the results
///
/// The store lock is released while the optimizer runs.
async fn optimize(state: web::Data<AppState>) -> HttpResponse {
    let request = OptimizerRequest::from_state(state.store().state());

    let response = match state.optimizer.submit(&request).await {
        Ok(response) => response,
        Err(e) => {
            log::error!("optimization failed: {}", e);
            return HttpResponse::BadGateway().json(json!({
                "status": "error",
                "message": format!("Optimization failed: {}", e)
            }));
        }
    };

    {
        let mut store = state.store();
        let plan = plan_merge(store.state(), &response);
        log::info!("merging optimizer results into {:?}", plan.table_ids());
        store.apply_merge(plan);
    }
    state.publish_changes();

    HttpResponse::Ok().json(json!({
        "status": "success",
        "message": response.message,
        "warnings": response.warnings,
    }))
}

/// Forget persisted state; the tables in memory stay as they are
async fn clear_state(state: web::Data<AppState>) -> HttpResponse {
    state.store().clear_persisted();
    HttpResponse::Ok().json(json!({ "status": "success" }))
}

/// Register every route on an app
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().limit(MAX_WORKBOOK_BYTES))
        .route("/ws", web::get().to(ws_index))
        .route("/health", web::get().to(health_check))
        .route("/tables", web::get().to(list_tables))
        .route("/tables/{id}", web::get().to(get_table))
        .route("/tables/{id}/csv", web::get().to(table_csv))
        .route("/export.csv", web::get().to(export_all))
        .route("/import", web::post().to(import_workbook))
        .route("/optimize", web::post().to(optimize))
        .route("/state", web::delete().to(clear_state));
}

/// Start the HTTP server with WebSocket support
pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let storage = FileStorage::new(&config.state_dir);
    let store = TableStore::create(catalog::all_schemas(), Box::new(storage));
    let optimizer = OptimizerClient::with_timeout(&config.optimizer_url, config.optimizer_timeout_secs)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let optimizer_url = optimizer.url().to_string();
    let state = web::Data::new(AppState::new(store, optimizer));

    let (host, port) = (config.host.as_str(), config.port);
    println!("🚀 PlanTable Server");
    println!("====================================");
    println!("📡 WebSocket: ws://{}:{}/ws", host, port);
    println!("📋 Tables: http://{}:{}/tables", host, port);
    println!("🏥 Health check: http://{}:{}/health", host, port);
    println!("🧮 Optimizer: {}", optimizer_url);
    println!("💾 State dir: {}", config.state_dir.display());
    println!("====================================");
    println!();

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            // Enable logger
            .wrap(middleware::Logger::default())
            // CORS for development
            .wrap(
                actix_cors::Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .max_age(3600),
            )
            .configure(configure)
    })
    .bind((host, port))?
    .run()
    .await
}
