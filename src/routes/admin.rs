use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::limiter::RateLimitAction;
use crate::{error::Result, AppError, AppState};

/// Query parameters for the reset endpoint
#[derive(Debug, Deserialize)]
pub struct ResetQuery {
    pub identifier: String,
    /// Admin secret key for authentication
    #[serde(default)]
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub success: bool,
    pub action: RateLimitAction,
    pub identifier: String,
}

/// Clear an identifier's window for an action
///
/// Requires the admin secret key passed as query parameter. The endpoint is
/// disabled (always 401) when no key is configured.
///
/// DELETE /api/limits/:action?identifier=<identifier>&key=<admin_secret_key>
pub async fn reset_limit(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<ResetQuery>,
) -> Result<Json<ResetResponse>> {
    let admin_key = state
        .config
        .admin_secret_key
        .as_ref()
        .ok_or(AppError::Unauthorized)?;

    if params.key != *admin_key {
        tracing::warn!("Invalid admin key attempt");
        return Err(AppError::Unauthorized);
    }

    let action: RateLimitAction = action.parse()?;
    state.limiter.reset(&params.identifier, action).await?;

    Ok(Json(ResetResponse {
        success: true,
        action,
        identifier: params.identifier.trim().to_string(),
    }))
}
