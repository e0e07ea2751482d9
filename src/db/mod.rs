pub mod tables;

use redb::{Database, ReadableTableMetadata};
use std::path::Path;
use std::sync::Arc;

use crate::error::StoreError;

/// Embedded database handle, cloned into blocking tasks
pub type Db = Arc<Database>;

/// Open the embedded rate limit database, creating file, directory and table
#[allow(clippy::result_large_err)]
pub fn open_database(path: impl AsRef<Path>) -> Result<Db, StoreError> {
    let path = path.as_ref();
    tracing::info!(path = %path.display(), "Opening rate limit database");

    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() && !dir.exists() => {
            std::fs::create_dir_all(dir).map_err(|e| {
                tracing::error!("Failed to create database directory: {}", e);
                StoreError::Database(redb::Error::Io(e))
            })?;
        }
        _ => {}
    }

    let db = Database::create(path).map_err(redb::Error::from)?;
    ensure_tables(&db)?;

    Ok(Arc::new(db))
}

fn ensure_tables(db: &Database) -> Result<(), StoreError> {
    let write_txn = db.begin_write()?;
    let existing = {
        let table = write_txn.open_table(tables::RATE_LIMITS)?;
        table.len()?
    };
    write_txn.commit()?;

    tracing::debug!(keys = existing, "Rate limit table ready");
    Ok(())
}
