//! Sliding-window rate limiter
//!
//! Each (action, identifier) pair owns a time-ordered set of attempts in a
//! shared counting store. A check purges attempts that left the window,
//! counts what is left and records the new attempt only while the count is
//! under the action's quota. The purge/count/record sequence runs as one
//! atomic unit inside the store.
//!
//! When the store fails the limiter fails open: the request is admitted with
//! an estimated `remaining` and the failure is logged.

pub mod action;
pub mod clock;

pub use action::{ActionLimit, RateLimitAction, RateLimitTable};
pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::constants::{
    DEFAULT_KEY_PREFIX, ERR_EMPTY_IDENTIFIER, ERR_IDENTIFIER_TOO_LONG, MAX_IDENTIFIER_LEN,
};
use crate::error::{AppError, Result, StoreError};
use crate::models::{RateLimitDecision, RateLimitStatus};
use crate::security::pepper_identifier;
use crate::store::SharedCounter;

/// Rate limiter over a shared counting store
pub struct RateLimiter {
    store: SharedCounter,
    table: RateLimitTable,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    pepper: Option<String>,
}

impl RateLimiter {
    /// Create a limiter using the wall clock and the default key prefix
    pub fn new(store: SharedCounter, table: RateLimitTable) -> Self {
        Self {
            store,
            table,
            clock: Arc::new(SystemClock),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            pepper: None,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Hash identifiers with `pepper` before they reach the store
    pub fn with_pepper(mut self, pepper: Option<String>) -> Self {
        self.pepper = pepper.filter(|p| !p.is_empty());
        self
    }

    pub fn table(&self) -> &RateLimitTable {
        &self.table
    }

    /// Name of the backing store, for health output and logs
    pub fn backend(&self) -> &'static str {
        self.store.backend()
    }

    /// Store key for an identifier under an action, `{prefix}:{action}:{identifier}`
    pub fn store_key(&self, identifier: &str, action: RateLimitAction) -> String {
        let subject = match &self.pepper {
            Some(pepper) => pepper_identifier(identifier, pepper),
            None => identifier.to_string(),
        };
        format!("{}:{}:{}", self.key_prefix, action.as_str(), subject)
    }

    /// Decide whether the current attempt is allowed and record it if so
    ///
    /// Returns `success: false` once `limit` attempts were admitted inside the
    /// trailing window. Store failures never surface here; the attempt is
    /// admitted and the failure logged.
    pub async fn check(
        &self,
        identifier: &str,
        action: RateLimitAction,
    ) -> Result<RateLimitDecision> {
        let identifier = validate_identifier(identifier)?;
        let ActionLimit { window_secs, limit } = self.table.get(action);
        let key = self.store_key(identifier, action);
        let now = self.clock.now();
        let reset_time = now.saturating_add(window_secs);
        let member = attempt_member(now);

        match self
            .store
            .try_admit(&key, now, window_secs, limit, &member)
            .await
        {
            Ok(admission) if admission.admitted => {
                let remaining = limit.saturating_sub(admission.count + 1);
                debug!(
                    action = %action,
                    identifier = %identifier,
                    remaining = remaining,
                    "Rate limit check passed"
                );
                Ok(RateLimitDecision::allowed(limit, remaining, reset_time))
            }
            Ok(admission) => {
                warn!(
                    action = %action,
                    identifier = %identifier,
                    attempts = admission.count,
                    limit = limit,
                    "Rate limit exceeded"
                );
                Ok(RateLimitDecision::rejected(limit, reset_time, window_secs))
            }
            Err(e) => {
                log_fail_open(action, identifier, self.store.backend(), &e);
                Ok(RateLimitDecision::allowed(
                    limit,
                    limit.saturating_sub(1),
                    reset_time,
                ))
            }
        }
    }

    /// Report remaining attempts without consuming one
    pub async fn status(&self, identifier: &str, action: RateLimitAction) -> Result<RateLimitStatus> {
        let identifier = validate_identifier(identifier)?;
        let ActionLimit { window_secs, limit } = self.table.get(action);
        let key = self.store_key(identifier, action);
        let now = self.clock.now();

        let count = match self.store.purge_and_count(&key, now, window_secs).await {
            Ok(count) => count,
            Err(e) => {
                log_fail_open(action, identifier, self.store.backend(), &e);
                0
            }
        };

        Ok(RateLimitStatus {
            remaining: limit.saturating_sub(count),
            reset_time: now.saturating_add(window_secs),
            limit,
        })
    }

    /// Forget every attempt recorded for the key (administrative override)
    pub async fn reset(&self, identifier: &str, action: RateLimitAction) -> Result<()> {
        let identifier = validate_identifier(identifier)?;
        let key = self.store_key(identifier, action);

        self.store.clear(&key).await?;

        info!(action = %action, identifier = %identifier, "Rate limit reset");
        Ok(())
    }

    /// Probe the backing store
    pub async fn ping(&self) -> std::result::Result<(), StoreError> {
        self.store.ping().await
    }
}

fn validate_identifier(identifier: &str) -> Result<&str> {
    let identifier = identifier.trim();
    if identifier.is_empty() {
        return Err(AppError::InvalidInput(ERR_EMPTY_IDENTIFIER.to_string()));
    }
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::InvalidInput(ERR_IDENTIFIER_TOO_LONG.to_string()));
    }
    Ok(identifier)
}

/// Unique sorted-set member for an attempt recorded at `now`
fn attempt_member(now: u64) -> String {
    format!("{}-{:016x}", now, rand::random::<u64>())
}

fn log_fail_open(action: RateLimitAction, identifier: &str, backend: &str, e: &StoreError) {
    error!(
        action = %action,
        identifier = %identifier,
        backend = backend,
        error = %e,
        "Rate limit store unavailable, failing open"
    );
}
