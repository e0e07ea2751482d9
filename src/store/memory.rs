use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::AtomicWindowCounter;
use crate::error::StoreError;
use crate::models::{Admission, AttemptLog};

/// In-memory storage backend for development/single instance
///
/// One mutex guards the whole map, so admission is atomic per key and
/// across keys.
#[derive(Default)]
pub struct MemoryWindowCounter {
    entries: Mutex<HashMap<String, AttemptLog>>,
}

impl MemoryWindowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently held
    pub async fn key_count(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[async_trait]
impl AtomicWindowCounter for MemoryWindowCounter {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn purge_and_count(&self, key: &str, now: u64, window: u64) -> Result<u32, StoreError> {
        let mut entries = self.entries.lock().await;

        let Some(log) = entries.get_mut(key) else {
            return Ok(0);
        };

        log.purge(now, window);
        let count = log.count();
        if log.is_empty() {
            entries.remove(key);
        }

        Ok(count)
    }

    async fn record_attempt(
        &self,
        key: &str,
        now: u64,
        window: u64,
        member: &str,
    ) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        entries
            .entry(key.to_string())
            .or_default()
            .record(now, window, member);
        Ok(())
    }

    async fn try_admit(
        &self,
        key: &str,
        now: u64,
        window: u64,
        limit: u32,
        member: &str,
    ) -> Result<Admission, StoreError> {
        let mut entries = self.entries.lock().await;
        let log = entries.entry(key.to_string()).or_default();
        let admission = log.try_admit(now, window, limit, member);

        if log.is_empty() {
            entries.remove(key);
        }

        Ok(admission)
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, StoreError> {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|_, log| !log.is_expired(now));
        Ok(before - entries.len())
    }
}
