use std::sync::Arc;

use dotenv::dotenv;
use gstbill_core::app::{create_router, AppState};
use gstbill_core::config::Config;
use gstbill_core::db::Database;
use gstbill_core::rate_limit::build_store;
use gstbill_core::worker::LogMailer;
use gstbill_core::logging;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logging::init();

    info!("Starting gstbill server...");

    let config = Config::from_env()?;
    let db_pool = Database::new(&config).await?;
    let rate_limiter = build_store(config.redis_url.as_deref()).await?;

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let state = AppState {
        db: db_pool,
        config: Arc::new(config),
        rate_limiter,
        mailer: Arc::new(LogMailer),
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", addr, e))?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}
