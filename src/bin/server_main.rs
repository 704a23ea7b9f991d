use anyhow::{Context, Result};
use log::info;
use std::sync::Arc;

use customization_cases::case_store;
use customization_cases::config::{AggregatorConfig, ServerConfig};
use customization_cases::db_connect;
use customization_cases::env_loader;
use customization_cases::web::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    env_loader::load_env();
    env_logger::init();

    info!("Starting case API server...");

    let server_config = ServerConfig::from_env();
    let pool = db_connect::connect().await?;
    info!("Database connection pool established.");

    let schema_client = pool.get().await?;
    case_store::ensure_schema(&schema_client).await?;
    drop(schema_client);

    let state = Arc::new(AppState {
        pool,
        config: AggregatorConfig::from_env(),
    });
    let app = web::router(state, &server_config.image_dir);

    let addr = server_config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Case API listening on http://{}", addr);
    info!("Serving images from {}", server_config.image_dir);

    axum::serve(listener, app).await.context("Server terminated")?;
    Ok(())
}
