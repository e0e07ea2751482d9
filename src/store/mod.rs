//! Counting store backends
//!
//! - Redis sorted sets for multi-instance deployments
//! - Embedded redb table for single-node deployments that must survive restarts
//! - In-memory map for development and tests

pub mod embedded;
pub mod memory;
pub mod redis_store;

pub use embedded::EmbeddedWindowCounter;
pub use memory::MemoryWindowCounter;
pub use redis_store::{AdmissionMode, RedisWindowCounter};

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{Config, StoreBackend};
use crate::error::StoreError;
use crate::limiter::Clock;
use crate::models::Admission;

/// Shared store handle
pub type SharedCounter = Arc<dyn AtomicWindowCounter>;

/// Sliding-window attempt counter shared by every server instance
///
/// Keys hold time-ordered attempts. Window bounds are half-open: an attempt
/// at `at` counts while `at > now - window`.
#[async_trait]
pub trait AtomicWindowCounter: Send + Sync {
    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;

    /// Purge attempts outside the window and count the rest
    async fn purge_and_count(&self, key: &str, now: u64, window: u64)
        -> Result<u32, StoreError>;

    /// Record an attempt at `now` and refresh the key's expiry to `window`
    async fn record_attempt(
        &self,
        key: &str,
        now: u64,
        window: u64,
        member: &str,
    ) -> Result<(), StoreError>;

    /// Purge, count and record while under `limit`, as a single atomic unit
    async fn try_admit(
        &self,
        key: &str,
        now: u64,
        window: u64,
        limit: u32,
        member: &str,
    ) -> Result<Admission, StoreError>;

    /// Delete the key; deleting an absent key succeeds
    async fn clear(&self, key: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;

    /// Whether keys expire on their own (no sweep needed)
    fn expires_natively(&self) -> bool {
        false
    }

    /// Drop keys idle for a full window, returning how many were removed
    async fn sweep_expired(&self, _now: u64) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Count, then record in a second round trip
///
/// Concurrent callers can both observe `limit - 1` between the two steps and
/// both be admitted.
pub async fn admit_in_two_steps<C>(
    counter: &C,
    key: &str,
    now: u64,
    window: u64,
    limit: u32,
    member: &str,
) -> Result<Admission, StoreError>
where
    C: AtomicWindowCounter + ?Sized,
{
    let count = counter.purge_and_count(key, now, window).await?;
    if count >= limit {
        return Ok(Admission::rejected(count));
    }

    counter.record_attempt(key, now, window, member).await?;
    Ok(Admission::admitted(count))
}

/// Build the store selected by configuration
pub async fn open_store(config: &Config) -> Result<SharedCounter, StoreError> {
    let store: SharedCounter = match config.backend {
        StoreBackend::Memory => {
            info!("Rate limiter using in-memory storage backend");
            Arc::new(MemoryWindowCounter::new())
        }
        StoreBackend::Embedded => {
            info!(
                "Rate limiter using embedded storage backend at {}",
                config.database_path
            );
            Arc::new(EmbeddedWindowCounter::open(&config.database_path)?)
        }
        StoreBackend::Redis => {
            let store = RedisWindowCounter::new(
                &config.redis_url,
                config.redis_admission_mode,
                config.redis_timeout(),
            )?;

            // Requests fail open while Redis is down, so an unreachable
            // server is not fatal at startup
            match store.ping().await {
                Ok(()) => info!(
                    "Rate limiter using Redis storage backend ({:?} admission)",
                    store.mode()
                ),
                Err(e) => warn!(
                    "Redis unreachable at startup, rate limiting will fail open until it recovers: {}",
                    e
                ),
            }

            Arc::new(store)
        }
    };

    Ok(store)
}

/// Periodically sweep idle keys from stores without native expiry
///
/// Returns `None` when the store expires keys itself or `every` is `None`.
pub fn spawn_sweeper(
    store: SharedCounter,
    clock: Arc<dyn Clock>,
    every: Option<Duration>,
) -> Option<JoinHandle<()>> {
    let every = every?;
    if store.expires_natively() {
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            match store.sweep_expired(clock.now()).await {
                Ok(removed) => debug!(
                    backend = store.backend(),
                    removed = removed,
                    "Completed rate limit store sweep"
                ),
                Err(e) => warn!("Rate limit store sweep failed: {}", e),
            }
        }
    }))
}
