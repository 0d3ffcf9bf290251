// Main entry point - Dependency injection and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::application::battery_service::BatteryService;
use crate::application::collection_service::CollectionService;
use crate::application::result_cache::{EvictionPolicy, ResultCache};
use crate::infrastructure::config::{load_collector_config, load_store_config};
use crate::infrastructure::http_store::HttpTelemetryStore;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{collect_battery_data, health_check, list_batteries};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    // Load configuration
    let store_config = load_store_config()?;
    let collector = load_collector_config()?.collector;

    // Create store adapter (infrastructure layer)
    let store = Arc::new(HttpTelemetryStore::new(
        store_config.store.host,
        store_config.store.token,
        store_config.store.page_limit,
        Duration::from_secs(store_config.store.request_timeout_secs),
    )?);

    // Fetched record sets live in memory for the whole process; entries only
    // leave through explicit refreshes unless a size bound is configured.
    let policy = collector
        .cache_max_entries
        .map(EvictionPolicy::MaxEntries)
        .unwrap_or_default();
    let cache = Arc::new(ResultCache::new(policy));

    // Create services (application layer)
    let battery_service = BatteryService::new(store.clone());
    let collection_service = CollectionService::new(store, cache, collector);

    // Create application state
    let state = Arc::new(AppState {
        battery_service,
        collection_service,
    });

    // Build router (presentation layer)
    let router = Router::new()
        .route("/healthz", get(health_check))
        .route("/batteries", get(list_batteries))
        .route("/batteries/:id/collect", get(collect_battery_data))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
    println!("Starting battery-telemetry service on {}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, router).await?;

    Ok(())
}
