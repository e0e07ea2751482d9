use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

use super::identifier::{resolve_identifier, HeaderTrust};
use crate::constants::{HEADER_LIMIT, HEADER_REMAINING, HEADER_RESET, UNKNOWN_IDENTIFIER};
use crate::error::{AppError, Result};
use crate::limiter::{RateLimitAction, RateLimiter};
use crate::models::RateLimitDecision;
use crate::AppState;

/// State for [`enforce`]: the limiter plus the action a route is bound to
#[derive(Clone)]
pub struct ActionGuard {
    limiter: Arc<RateLimiter>,
    action: RateLimitAction,
    trust: HeaderTrust,
}

impl ActionGuard {
    pub fn new(state: &AppState, action: RateLimitAction) -> Self {
        Self {
            limiter: state.limiter.clone(),
            action,
            trust: HeaderTrust::from_config(&state.config),
        }
    }
}

/// Rate limit a route under the guard's action
///
/// Use with `axum::middleware::from_fn_with_state(ActionGuard::new(&state, action), enforce)`.
/// Rejected requests get a 429 without reaching the handler; admitted ones
/// carry the `X-RateLimit-*` headers on the way out.
pub async fn enforce(
    State(guard): State<ActionGuard>,
    request: Request,
    next: Next,
) -> Result<Response> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    let identifier = resolve_identifier(request.headers(), peer, guard.trust)
        .unwrap_or_else(|| {
            tracing::debug!("No client identity on request, using shared bucket");
            UNKNOWN_IDENTIFIER.to_string()
        });

    let decision = guard.limiter.check(&identifier, guard.action).await?;
    if !decision.success {
        return Err(AppError::RateLimited(decision));
    }

    let mut response = next.run(request).await;
    apply_rate_limit_headers(response.headers_mut(), &decision);
    Ok(response)
}

/// Echo the limiter's window as `X-RateLimit-Limit/Remaining/Reset`
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, decision: &RateLimitDecision) {
    headers.insert(
        HeaderName::from_static(HEADER_LIMIT),
        HeaderValue::from(decision.limit),
    );
    headers.insert(
        HeaderName::from_static(HEADER_REMAINING),
        HeaderValue::from(decision.remaining),
    );
    headers.insert(
        HeaderName::from_static(HEADER_RESET),
        HeaderValue::from(decision.reset_time),
    );
}
