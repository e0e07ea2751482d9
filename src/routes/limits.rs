use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::middleware::apply_rate_limit_headers;
use crate::error::{AppError, Result};
use crate::limiter::RateLimitAction;
use crate::models::{RateLimitDecision, RateLimitStatus};
use crate::AppState;

/// Request body for a check
#[derive(Debug, Deserialize)]
pub struct CheckRequest {
    pub identifier: String,
}

/// Query parameters for a status lookup
#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub identifier: String,
}

/// Decision plus the reset instant as RFC 3339 for human consumers
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckResponse {
    #[serde(flatten)]
    pub decision: RateLimitDecision,
    pub reset_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    #[serde(flatten)]
    pub status: RateLimitStatus,
    pub reset_at: String,
}

/// One row of the configured action table
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLimitEntry {
    pub action: RateLimitAction,
    pub limit: u32,
    pub window_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct LimitsResponse {
    pub backend: &'static str,
    pub limits: Vec<ActionLimitEntry>,
}

/// Convert a Unix timestamp (seconds) to RFC 3339, falling back to the epoch
pub fn timestamp_to_rfc3339(timestamp: u64) -> String {
    i64::try_from(timestamp)
        .ok()
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .unwrap_or_default()
        .to_rfc3339()
}

/// Record an attempt for an identifier under an action
///
/// POST /api/limits/:action/check
///
/// 200 with the decision while under quota, 429 once the window is exhausted.
pub async fn check_limit(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Json(payload): Json<CheckRequest>,
) -> Result<(HeaderMap, Json<CheckResponse>)> {
    let action: RateLimitAction = action.parse()?;
    let decision = state.limiter.check(&payload.identifier, action).await?;

    if !decision.success {
        return Err(AppError::RateLimited(decision));
    }

    let mut headers = HeaderMap::new();
    apply_rate_limit_headers(&mut headers, &decision);

    Ok((
        headers,
        Json(CheckResponse {
            reset_at: timestamp_to_rfc3339(decision.reset_time),
            decision,
        }),
    ))
}

/// Read-only view of an identifier's window
///
/// GET /api/limits/:action/status?identifier=<identifier>
pub async fn limit_status(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<StatusQuery>,
) -> Result<Json<StatusResponse>> {
    let action: RateLimitAction = action.parse()?;
    let status = state.limiter.status(&params.identifier, action).await?;

    Ok(Json(StatusResponse {
        reset_at: timestamp_to_rfc3339(status.reset_time),
        status,
    }))
}

/// GET /api/limits
pub async fn list_limits(State(state): State<AppState>) -> Json<LimitsResponse> {
    let limits = state
        .limiter
        .table()
        .iter()
        .map(|(action, limit)| ActionLimitEntry {
            action,
            limit: limit.limit,
            window_secs: limit.window_secs,
        })
        .collect();

    Json(LimitsResponse {
        backend: state.limiter.backend(),
        limits,
    })
}
