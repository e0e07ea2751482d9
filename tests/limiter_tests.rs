//! Behavioural tests for the sliding-window limiter against the local stores

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use windowguard::limiter::{ActionLimit, ManualClock, RateLimitAction, RateLimitTable};
use windowguard::models::Admission;
use windowguard::store::{EmbeddedWindowCounter, MemoryWindowCounter};
use windowguard::{AtomicWindowCounter, RateLimiter, SharedCounter, StoreError};

const START: u64 = 1_700_000_000;

// =============================================================================
// Test Helpers
// =============================================================================

fn limiter_with(store: SharedCounter) -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START));
    let limiter = RateLimiter::new(store, RateLimitTable::default()).with_clock(clock.clone());
    (limiter, clock)
}

fn memory_limiter() -> (RateLimiter, Arc<ManualClock>) {
    limiter_with(Arc::new(MemoryWindowCounter::new()))
}

/// Store whose every operation fails, as if the server were unreachable
struct FailingCounter;

#[async_trait]
impl AtomicWindowCounter for FailingCounter {
    fn backend(&self) -> &'static str {
        "failing"
    }

    async fn purge_and_count(&self, _: &str, _: u64, _: u64) -> Result<u32, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn record_attempt(&self, _: &str, _: u64, _: u64, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn try_admit(
        &self,
        _: &str,
        _: u64,
        _: u64,
        _: u32,
        _: &str,
    ) -> Result<Admission, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn clear(&self, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }
}

/// Shared buffer that collects formatted log output
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs() -> (CapturedLogs, tracing::subscriber::DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (logs, guard)
}

async fn admitted_under_contention(limiter: Arc<RateLimiter>, callers: usize) -> usize {
    let handles: Vec<_> = (0..callers)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move {
                limiter
                    .check("ip:203.0.113.7", RateLimitAction::Login)
                    .await
                    .unwrap()
                    .success
            })
        })
        .collect();

    let mut admitted = 0;
    for handle in handles {
        if handle.await.unwrap() {
            admitted += 1;
        }
    }
    admitted
}

// =============================================================================
// Quota Tests
// =============================================================================

#[tokio::test]
async fn test_login_allows_five_then_rejects() {
    let (limiter, _clock) = memory_limiter();

    for expected in [4, 3, 2, 1, 0] {
        let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
        assert!(decision.success);
        assert_eq!(decision.remaining, expected);
        assert_eq!(decision.limit, 5);
        assert_eq!(decision.reset_time, START + 900);
        assert_eq!(decision.retry_after, None);
    }

    let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    assert!(!decision.success);
    assert_eq!(decision.remaining, 0);
    assert_eq!(decision.retry_after, Some(900));
}

#[tokio::test]
async fn test_rejections_are_not_recorded() {
    let (limiter, clock) = memory_limiter();

    for _ in 0..5 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }
    for _ in 0..10 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }

    // Only the five admitted attempts age out; the rejected ones never counted
    clock.advance(900);
    let status = limiter.status("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    assert_eq!(status.remaining, 5);
}

#[tokio::test]
async fn test_actions_do_not_share_windows() {
    let (limiter, _clock) = memory_limiter();

    for _ in 0..3 {
        limiter.check("user:1", RateLimitAction::Register).await.unwrap();
    }
    assert!(!limiter.check("user:1", RateLimitAction::Register).await.unwrap().success);

    let decision = limiter.check("user:1", RateLimitAction::Comment).await.unwrap();
    assert!(decision.success);
    assert_eq!(decision.remaining, 4);
}

#[tokio::test]
async fn test_status_is_idempotent() {
    let (limiter, _clock) = memory_limiter();
    limiter.check("ip:1.2.3.4", RateLimitAction::Upload).await.unwrap();

    let first = limiter.status("ip:1.2.3.4", RateLimitAction::Upload).await.unwrap();
    let second = limiter.status("ip:1.2.3.4", RateLimitAction::Upload).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.remaining, 9);
    assert_eq!(first.reset_time, START + 60);
}

// =============================================================================
// Window Tests
// =============================================================================

#[tokio::test]
async fn test_window_expiry_restores_quota() {
    let (limiter, clock) = memory_limiter();

    for _ in 0..5 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }

    clock.advance(899);
    assert!(!limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap().success);

    clock.advance(1);
    let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    assert!(decision.success);
    assert_eq!(decision.remaining, 4);
}

#[tokio::test]
async fn test_window_slides_attempt_by_attempt() {
    let (limiter, clock) = memory_limiter();

    for _ in 0..3 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }
    clock.advance(300);
    for _ in 0..2 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }

    clock.advance(300);
    assert!(!limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap().success);

    // The first three leave the window; the two later ones still count
    clock.advance(300);
    let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    assert!(decision.success);
    assert_eq!(decision.remaining, 2);
}

#[tokio::test]
async fn test_reset_matches_fresh_identifier() {
    let (limiter, _clock) = memory_limiter();

    for _ in 0..5 {
        limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    }
    limiter.reset("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();

    let reset = limiter.status("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    let fresh = limiter.status("ip:9.9.9.9", RateLimitAction::Login).await.unwrap();
    assert_eq!(reset, fresh);

    // Resetting an identifier that never made an attempt is fine
    limiter.reset("ip:9.9.9.9", RateLimitAction::Login).await.unwrap();
}

#[tokio::test]
async fn test_custom_table_limits_apply() {
    let table = RateLimitTable::default().with_limit(RateLimitAction::Comment, ActionLimit::new(1, 10));
    let clock = Arc::new(ManualClock::new(START));
    let limiter = RateLimiter::new(Arc::new(MemoryWindowCounter::new()), table)
        .with_clock(clock.clone());

    assert!(limiter.check("user:1", RateLimitAction::Comment).await.unwrap().success);
    let decision = limiter.check("user:1", RateLimitAction::Comment).await.unwrap();
    assert!(!decision.success);
    assert_eq!(decision.retry_after, Some(10));

    clock.advance(10);
    assert!(limiter.check("user:1", RateLimitAction::Comment).await.unwrap().success);
}

#[tokio::test]
async fn test_embedded_store_keeps_windows_across_limiters() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("limits.redb");

    {
        let (limiter, _clock) = limiter_with(Arc::new(EmbeddedWindowCounter::open(&path).unwrap()));
        for _ in 0..3 {
            limiter.check("ip:1.2.3.4", RateLimitAction::Register).await.unwrap();
        }
    }

    let (limiter, _clock) = limiter_with(Arc::new(EmbeddedWindowCounter::open(&path).unwrap()));
    let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Register).await.unwrap();
    assert!(!decision.success);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_memory_store() {
    let (limiter, _clock) = memory_limiter();
    let admitted = admitted_under_contention(Arc::new(limiter), 20).await;
    assert_eq!(admitted, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_embedded_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = EmbeddedWindowCounter::open(temp_dir.path().join("limits.redb")).unwrap();
    let (limiter, _clock) = limiter_with(Arc::new(store));

    let admitted = admitted_under_contention(Arc::new(limiter), 20).await;
    assert_eq!(admitted, 5);
}

// =============================================================================
// Fail-Open Tests
// =============================================================================

#[tokio::test]
async fn test_store_failure_fails_open_and_logs_error() {
    let (logs, _guard) = capture_logs();
    let (limiter, _clock) = limiter_with(Arc::new(FailingCounter));

    let decision = limiter.check("ip:1.2.3.4", RateLimitAction::Login).await.unwrap();
    assert!(decision.success);
    assert_eq!(decision.remaining, 4);
    assert_eq!(decision.limit, 5);
    assert_eq!(decision.reset_time, START + 900);

    let output = logs.contents();
    assert!(output.contains("ERROR"));
    assert!(output.contains("failing open"));
    assert!(output.contains("connection refused"));
}

#[tokio::test]
async fn test_status_fails_open_with_full_quota() {
    let (limiter, _clock) = limiter_with(Arc::new(FailingCounter));

    let status = limiter.status("ip:1.2.3.4", RateLimitAction::ApiGeneral).await.unwrap();
    assert_eq!(status.remaining, 100);
    assert_eq!(status.limit, 100);
}

#[tokio::test]
async fn test_reset_surfaces_store_failure() {
    let (limiter, _clock) = limiter_with(Arc::new(FailingCounter));

    assert!(limiter.reset("ip:1.2.3.4", RateLimitAction::Login).await.is_err());
}
