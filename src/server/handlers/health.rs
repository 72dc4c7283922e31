use crate::server::state::AppState;
use axum::{Json, extract::State};
use serde_json::{Value, json};

/// Liveness plus a snapshot of cache and extraction load
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "cached_manifests": state.resolver.cached_count(),
        "in_flight": state.resolver.in_flight(),
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}
