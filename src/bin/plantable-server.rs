/// PlanTable Server
///
/// Serves the planning tables over HTTP and WebSocket, persisting state to
/// `STATE_DIR` and forwarding optimization requests to `OPTIMIZER_URL`.

use plantable::config::AppConfig;
use plantable::server::run_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env();
    log::info!("starting with {:?}", config);

    run_server(config).await
}
