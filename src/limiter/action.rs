//! Rate-limited actions and their per-action quotas

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Operations throttled by the limiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    Login,
    Register,
    PasswordReset,
    EmailVerification,
    ApiGeneral,
    ApiUpload,
    /// Per-route limiter on media upload handlers
    Upload,
    /// Per-route limiter on comment posting
    Comment,
}

impl RateLimitAction {
    pub const ALL: [RateLimitAction; 8] = [
        RateLimitAction::Login,
        RateLimitAction::Register,
        RateLimitAction::PasswordReset,
        RateLimitAction::EmailVerification,
        RateLimitAction::ApiGeneral,
        RateLimitAction::ApiUpload,
        RateLimitAction::Upload,
        RateLimitAction::Comment,
    ];

    /// Name used in store keys, URLs and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::Login => "login",
            RateLimitAction::Register => "register",
            RateLimitAction::PasswordReset => "password_reset",
            RateLimitAction::EmailVerification => "email_verification",
            RateLimitAction::ApiGeneral => "api_general",
            RateLimitAction::ApiUpload => "api_upload",
            RateLimitAction::Upload => "upload",
            RateLimitAction::Comment => "comment",
        }
    }

    /// Environment variable overriding this action's quota, e.g. `RATE_LIMIT_LOGIN`
    pub fn env_var(&self) -> String {
        format!("RATE_LIMIT_{}", self.as_str().to_ascii_uppercase())
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RateLimitAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RateLimitAction::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| AppError::UnknownAction(s.to_string()))
    }
}

/// Quota for one action: at most `limit` attempts per `window_secs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLimit {
    pub window_secs: u64,
    pub limit: u32,
}

impl ActionLimit {
    pub const fn new(limit: u32, window_secs: u64) -> Self {
        Self { window_secs, limit }
    }

    /// Parse a `limit/window_secs` override such as `5/900`
    pub fn parse(value: &str) -> Result<Self, String> {
        let (limit, window) = value
            .split_once('/')
            .ok_or_else(|| format!("expected `limit/window_secs`, got '{}'", value))?;

        let limit: u32 = limit
            .trim()
            .parse()
            .map_err(|_| format!("invalid limit '{}'", limit.trim()))?;
        let window_secs: u64 = window
            .trim()
            .parse()
            .map_err(|_| format!("invalid window '{}'", window.trim()))?;

        if limit == 0 || window_secs == 0 {
            return Err("limit and window must both be positive".to_string());
        }

        Ok(Self::new(limit, window_secs))
    }
}

/// Quota table covering every [`RateLimitAction`]
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitTable {
    limits: [ActionLimit; 8],
}

impl Default for RateLimitTable {
    fn default() -> Self {
        let mut limits = [ActionLimit::new(0, 0); 8];
        for action in RateLimitAction::ALL {
            limits[action.index()] = default_limit(action);
        }
        Self { limits }
    }
}

impl RateLimitTable {
    pub fn get(&self, action: RateLimitAction) -> ActionLimit {
        self.limits[action.index()]
    }

    /// Replace one action's quota
    pub fn with_limit(mut self, action: RateLimitAction, limit: ActionLimit) -> Self {
        self.limits[action.index()] = limit;
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (RateLimitAction, ActionLimit)> + '_ {
        RateLimitAction::ALL
            .into_iter()
            .map(move |action| (action, self.get(action)))
    }
}

fn default_limit(action: RateLimitAction) -> ActionLimit {
    match action {
        RateLimitAction::Login => ActionLimit::new(5, 900),
        RateLimitAction::Register => ActionLimit::new(3, 3600),
        RateLimitAction::PasswordReset => ActionLimit::new(3, 3600),
        RateLimitAction::EmailVerification => ActionLimit::new(5, 3600),
        RateLimitAction::ApiGeneral => ActionLimit::new(100, 60),
        RateLimitAction::ApiUpload => ActionLimit::new(50, 3600),
        RateLimitAction::Upload => ActionLimit::new(10, 60),
        RateLimitAction::Comment => ActionLimit::new(5, 60),
    }
}
