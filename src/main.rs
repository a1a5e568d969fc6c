use clap::Parser;
use std::sync::Arc;

use travail_auth::{
    auth::SqliteUserStore, build_auth_service, config::AppConfig, logging, ApiConfig, ApiServer,
    TravailError,
};

#[derive(Parser, Debug)]
#[command(name = "travail_auth")]
struct Config {
    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// HTTP port
    #[arg(short = 'p', long, env = "API_PORT", default_value_t = 8080)]
    port: u16,

    /// Path to SQLite database for users
    #[arg(long, default_value = "data/travail.db")]
    db_path: String,

    /// Log level, overridden by RUST_LOG
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Also write rotating log files to this directory
    #[arg(long)]
    log_dir: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let config = Config::parse();

    let _logger = logging::setup_logging(&config.log_level, config.log_dir.as_deref())
        .map_err(TravailError::from)?;

    // Missing JWT secret is fatal
    let app_config = AppConfig::from_env().map_err(TravailError::from)?;

    // Ensure data directory exists
    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent).map_err(TravailError::from)?;
    }
    let store = SqliteUserStore::new(&config.db_path).map_err(TravailError::from)?;
    log::info!("User store ready (db: {})", config.db_path);

    let auth = build_auth_service(&app_config, Arc::new(store))?;

    let server = ApiServer::new(
        ApiConfig {
            port: config.port,
            host: config.host,
        },
        Arc::new(auth),
    );
    server.start().await
}
