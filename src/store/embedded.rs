use async_trait::async_trait;
use redb::{ReadableTable, Table};
use std::path::Path;

use super::AtomicWindowCounter;
use crate::db::{open_database, tables, Db};
use crate::error::StoreError;
use crate::models::{Admission, AttemptLog};

/// Embedded redb storage backend
///
/// redb serializes write transactions, so each purge/count/record runs in a
/// write transaction of its own and cannot interleave with another admission.
pub struct EmbeddedWindowCounter {
    db: Db,
}

impl EmbeddedWindowCounter {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Open (or create) the database file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(open_database(path)?))
    }

    /// Run `f` against the attempt log for `key` inside one write transaction
    ///
    /// The log is written back afterwards, or removed once empty.
    async fn with_log<T, F>(&self, key: &str, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut AttemptLog) -> T + Send + 'static,
    {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<T, StoreError> {
            let write_txn = db.begin_write()?;
            let result = {
                let mut table = write_txn.open_table(tables::RATE_LIMITS)?;
                let mut log = load_log(&table, &key)?;
                let result = f(&mut log);
                store_log(&mut table, &key, &log)?;
                result
            };
            write_txn.commit()?;
            Ok(result)
        })
        .await?
    }
}

fn load_log(table: &Table<&'static str, &'static [u8]>, key: &str) -> Result<AttemptLog, StoreError> {
    let log = match table.get(key)? {
        Some(bytes) => bincode::deserialize(bytes.value())?,
        None => AttemptLog::new(),
    };
    Ok(log)
}

fn store_log(
    table: &mut Table<&'static str, &'static [u8]>,
    key: &str,
    log: &AttemptLog,
) -> Result<(), StoreError> {
    if log.is_empty() {
        table.remove(key)?;
    } else {
        let bytes = bincode::serialize(log)?;
        table.insert(key, bytes.as_slice())?;
    }
    Ok(())
}

#[async_trait]
impl AtomicWindowCounter for EmbeddedWindowCounter {
    fn backend(&self) -> &'static str {
        "embedded"
    }

    async fn purge_and_count(&self, key: &str, now: u64, window: u64) -> Result<u32, StoreError> {
        self.with_log(key, move |log| {
            log.purge(now, window);
            log.count()
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
        let member = member.to_string();
        self.with_log(key, move |log| log.record(now, window, member))
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
        let member = member.to_string();
        self.with_log(key, move |log| log.try_admit(now, window, limit, member))
            .await
    }

    async fn clear(&self, key: &str) -> Result<(), StoreError> {
        let db = self.db.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            let write_txn = db.begin_write()?;
            {
                let mut table = write_txn.open_table(tables::RATE_LIMITS)?;
                table.remove(key.as_str())?;
            }
            write_txn.commit()?;
            Ok(())
        })
        .await?
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || -> Result<(), StoreError> {
            db.begin_read()?;
            Ok(())
        })
        .await?
    }

    async fn sweep_expired(&self, now: u64) -> Result<usize, StoreError> {
        let db = self.db.clone();

        tokio::task::spawn_blocking(move || -> Result<usize, StoreError> {
            let write_txn = db.begin_write()?;
            let removed = {
                let mut table = write_txn.open_table(tables::RATE_LIMITS)?;

                let mut stale = Vec::new();
                for entry in table.iter()? {
                    let (key, value) = entry?;
                    let log: AttemptLog = bincode::deserialize(value.value())?;
                    if log.is_expired(now) {
                        stale.push(key.value().to_string());
                    }
                }

                for key in &stale {
                    table.remove(key.as_str())?;
                }
                stale.len()
            };
            write_txn.commit()?;

            if removed > 0 {
                tracing::debug!("Swept {} idle rate limit keys", removed);
            }
            Ok(removed)
        })
        .await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_store(temp_dir: &TempDir) -> EmbeddedWindowCounter {
        EmbeddedWindowCounter::open(temp_dir.path().join("test.redb"))
            .expect("Failed to create test database")
    }

    #[tokio::test]
    async fn test_try_admit_until_limit() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        for i in 0..5 {
            let admission = store
                .try_admit("ratelimit:login:ip:1.2.3.4", 1_000, 900, 5, &format!("m{}", i))
                .await
                .unwrap();
            assert!(admission.admitted);
            assert_eq!(admission.count, i);
        }

        let admission = store
            .try_admit("ratelimit:login:ip:1.2.3.4", 1_000, 900, 5, "over")
            .await
            .unwrap();
        assert!(!admission.admitted);
    }

    #[tokio::test]
    async fn test_attempts_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.redb");

        {
            let store = EmbeddedWindowCounter::open(&path).unwrap();
            store.record_attempt("k", 1_000, 900, "a").await.unwrap();
            store.record_attempt("k", 1_001, 900, "b").await.unwrap();
        }

        let store = EmbeddedWindowCounter::open(&path).unwrap();
        assert_eq!(store.purge_and_count("k", 1_002, 900).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_clear_absent_key() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        assert!(store.clear("missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_keys() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.record_attempt("old", 1_000, 60, "a").await.unwrap();
        store.record_attempt("fresh", 1_050, 60, "b").await.unwrap();

        assert_eq!(store.sweep_expired(1_070).await.unwrap(), 1);
        assert_eq!(store.purge_and_count("fresh", 1_070, 60).await.unwrap(), 1);
        assert_eq!(store.purge_and_count("old", 1_070, 60).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_admissions_respect_limit() {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(create_test_store(&temp_dir));

        let handles: Vec<_> = (0..12)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .try_admit("shared", 1_000, 900, 5, &format!("m{}", i))
                        .await
                        .unwrap()
                        .admitted
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 5);
    }
}
