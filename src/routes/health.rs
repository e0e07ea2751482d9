use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// Health check endpoint
///
/// Reports whether the counting store answers. An unreachable store leaves
/// the service up (checks fail open), so this only drives monitoring.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store_status = match state.limiter.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::error!("Rate limit store health check failed: {}", e);
            "disconnected"
        }
    };

    Json(json!({
        "status": if store_status == "connected" { "healthy" } else { "degraded" },
        "store": store_status,
        "backend": state.limiter.backend(),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
