//! Redis sorted-set storage backend
//!
//! Each key is a sorted set whose scores are attempt timestamps and whose
//! members are the unique attempt tiebreakers. Keys carry an `EXPIRE` of one
//! window, so Redis drops idle keys on its own.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::future::Future;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::debug;

use super::{admit_in_two_steps, AtomicWindowCounter};
use crate::error::StoreError;
use crate::models::Admission;

/// Purge, count and conditionally record in one server-side step
///
/// KEYS[1] = key; ARGV = now, window, limit, member.
/// Returns `{admitted (0|1), count_before}`.
const ADMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)
if count >= limit then
  return {0, count}
end

redis.call('ZADD', key, now, ARGV[4])
redis.call('EXPIRE', key, window)
return {1, count}
"#;

/// How admissions are issued against Redis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdmissionMode {
    /// Single Lua script; at most `limit` admissions per window under concurrency
    #[default]
    Atomic,
    /// Count, then record in a second round trip; concurrent callers can overshoot
    Pipelined,
}

impl FromStr for AdmissionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(AdmissionMode::Atomic),
            "pipelined" => Ok(AdmissionMode::Pipelined),
            other => Err(format!(
                "unknown admission mode '{}', expected 'atomic' or 'pipelined'",
                other
            )),
        }
    }
}

/// Redis storage backend
///
/// The connection manager is created on first use, so the service can start
/// while Redis is still down; every call made before Redis answers fails and
/// the limiter fails open.
pub struct RedisWindowCounter {
    client: redis::Client,
    connection_manager: OnceCell<ConnectionManager>,
    script: redis::Script,
    mode: AdmissionMode,
    timeout: Duration,
}

impl RedisWindowCounter {
    /// Create a backend for `url` without connecting yet
    pub fn new(url: &str, mode: AdmissionMode, timeout: Duration) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;

        Ok(Self {
            client,
            connection_manager: OnceCell::new(),
            script: redis::Script::new(ADMIT_SCRIPT),
            mode,
            timeout,
        })
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let manager = self
            .connection_manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                debug!("Connected to Redis for rate limiting");
                Ok::<_, StoreError>(manager)
            })
            .await?;

        Ok(manager.clone())
    }

    /// Bound a Redis round trip by the configured timeout
    async fn bounded<T, F>(&self, operation: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, operation)
            .await
            .map_err(|_| {
                StoreError::Unavailable(format!(
                    "Redis did not answer within {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }

    async fn admit_atomically(
        &self,
        key: &str,
        now: u64,
        window: u64,
        limit: u32,
        member: &str,
    ) -> Result<Admission, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let (admitted, count): (i64, i64) = self
                .script
                .key(key)
                .arg(now)
                .arg(window)
                .arg(limit)
                .arg(member)
                .invoke_async(&mut conn)
                .await?;

            let count = u32::try_from(count).unwrap_or(u32::MAX);
            Ok::<_, StoreError>(if admitted == 1 {
                Admission::admitted(count)
            } else {
                Admission::rejected(count)
            })
        })
        .await
    }
}

/// Highest score still outside the window: attempts at or below it are purged
fn purge_cutoff(now: u64, window: u64) -> i64 {
    now as i64 - window as i64
}

#[async_trait]
impl AtomicWindowCounter for RedisWindowCounter {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn purge_and_count(&self, key: &str, now: u64, window: u64) -> Result<u32, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let (count,): (u32,) = redis::pipe()
                .atomic()
                .cmd("ZREMRANGEBYSCORE")
                .arg(key)
                .arg("-inf")
                .arg(purge_cutoff(now, window))
                .ignore()
                .cmd("ZCARD")
                .arg(key)
                .query_async(&mut conn)
                .await?;
            Ok::<_, StoreError>(count)
        })
        .await
    }

    async fn record_attempt(
        &self,
        key: &str,
        now: u64,
        window: u64,
        member: &str,
    ) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: () = redis::pipe()
                .atomic()
                .cmd("ZADD")
                .arg(key)
                .arg(now)
                .arg(member)
                .ignore()
                .cmd("EXPIRE")
                .arg(key)
                .arg(window)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn try_admit(
        &self,
        key: &str,
        now: u64,
        window: u64,
        limit: u32,
        member: &str,
    ) -> Result<Admission, StoreError> {
        match self.mode {
            AdmissionMode::Atomic => self.admit_atomically(key, now, window, limit, member).await,
            AdmissionMode::Pipelined => {
                admit_in_two_steps(self, key, now, window, limit, member).await
            }
        }
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok::<_, StoreError>(())
        })
        .await
    }

    fn expires_natively(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_mode_parse() {
        assert_eq!("atomic".parse::<AdmissionMode>().unwrap(), AdmissionMode::Atomic);
        assert_eq!(
            " Pipelined ".parse::<AdmissionMode>().unwrap(),
            AdmissionMode::Pipelined
        );
        assert!("lua".parse::<AdmissionMode>().is_err());
        assert_eq!(AdmissionMode::default(), AdmissionMode::Atomic);
    }

    #[test]
    fn test_purge_cutoff_is_inclusive_window_start() {
        assert_eq!(purge_cutoff(1_000, 900), 100);
        // Early clocks produce a negative cutoff instead of wrapping
        assert_eq!(purge_cutoff(10, 900), -890);
    }

    #[test]
    fn test_invalid_url_is_rejected() {
        let result =
            RedisWindowCounter::new("not a url", AdmissionMode::Atomic, Duration::from_millis(50));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_server_errors_instead_of_hanging() {
        // Port 1 on localhost refuses connections
        let store = RedisWindowCounter::new(
            "redis://127.0.0.1:1",
            AdmissionMode::Atomic,
            Duration::from_millis(200),
        )
        .unwrap();

        assert!(store.ping().await.is_err());
        assert!(store.try_admit("k", 1_000, 60, 5, "m").await.is_err());
    }
}
