use std::sync::Arc;

use anyhow::Context;
use firewall_rules::database::Database;
use firewall_rules::models::config::AppConfig;
use firewall_rules::models::server::WebServerState;
use firewall_rules::utils::logging::{init_logging, LogBuffer, LOG_BUFFER_CAPACITY};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let config = AppConfig::from_env().context("Invalid environment variables")?;

    let logs = LogBuffer::new(LOG_BUFFER_CAPACITY);
    init_logging(config.env, logs.clone()).context("Logger initialization failed")?;

    let database = Arc::new(Database::new(config.store_settings()));
    let shared_state = Arc::new(WebServerState {
        database: Arc::clone(&database),
        logs,
    });

    let app = firewall_rules::app(shared_state);
    let listener = TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    info!("Server running on port {} [{}]", config.port, config.env);

    // Requests that arrive before the store is up wait in the readiness middleware.
    let server = tokio::spawn(async move { axum::serve(listener, app).await });

    database
        .connect_with_retry()
        .await
        .context("Database connection retry budget exhausted")?;

    server.await?.context("HTTP server failed")?;
    Ok(())
}
