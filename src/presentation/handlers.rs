// HTTP request handlers
use crate::infrastructure::ndjson::stream_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CollectQuery {
    pub range: Option<String>,
    pub task: Option<String>,
    pub refresh: Option<bool>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List all batteries
pub async fn list_batteries(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.battery_service.list_batteries().await {
        Ok(batteries) => Json(batteries),
        Err(e) => {
            eprintln!("Error fetching batteries: {}", e);
            // Return empty list on error
            Json(Vec::new())
        }
    }
}

/// Stream a data collection for a battery (progress, then the result)
pub async fn collect_battery_data(
    Path(id): Path<String>,
    Query(query): Query<CollectQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let range = query.range.unwrap_or_else(|| "1day".to_string());
    let task = query.task.unwrap_or_else(|| "batteryHealth".to_string());
    let refresh = query.refresh.unwrap_or(false);

    let rx = state.collection_service.stream(id, range, task, refresh);
    stream_from_receiver(rx)
}
