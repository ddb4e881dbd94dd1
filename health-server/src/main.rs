mod config;
mod hub;
mod routes;

use anyhow::Result;
use axum::{
    routing::{get, head},
    Router,
};
use health_checks::{HealthAggregator, HttpProber};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::hub::BroadcastHub;
use crate::routes::{broadcast_update, get_health, heartbeat, hub_ws, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::from_env()?;
    config.log_configuration();

    let prober = Arc::new(HttpProber::new()?);
    let aggregator = Arc::new(HealthAggregator::new(prober, config.targets.clone()));
    let hub = Arc::new(BroadcastHub::new(aggregator.clone()));
    let state = AppState { aggregator, hub };

    let app = Router::new()
        .route("/api/health", get(get_health))
        .route("/api/heartbeat", head(heartbeat))
        .route("/api/health-hub", get(hub_ws))
        .route("/api/broadcast/update", get(broadcast_update))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
