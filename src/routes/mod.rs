pub mod admin;
pub mod health;
pub mod identifier;
pub mod limits;
pub mod middleware;

pub use admin::reset_limit;
pub use health::health_check;
pub use identifier::{resolve_identifier, HeaderTrust};
pub use limits::{check_limit, limit_status, list_limits, timestamp_to_rfc3339};
pub use middleware::{apply_rate_limit_headers, enforce, ActionGuard};

use axum::{
    routing::{delete, get, post},
    Router,
};

use crate::AppState;

/// Routes served by the limiter service
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/limits", get(list_limits))
        .route("/api/limits/:action", delete(reset_limit))
        .route("/api/limits/:action/check", post(check_limit))
        .route("/api/limits/:action/status", get(limit_status))
        .with_state(state)
}
