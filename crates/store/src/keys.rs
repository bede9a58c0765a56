//! Rotating key persistence.

use coepi_core::RotatingKey;
use rusqlite::{params, OptionalExtension};
use tracing::debug;

use crate::database::Database;
use crate::error::{StorageError, StorageResult};

/// Persists this device's rotating keys by recency.
pub trait KeyStore: Send + Sync {
    /// Persist a newly activated key.
    fn insert(&self, key: &RotatingKey) -> StorageResult<()>;

    /// Persist `key` in place of any stored key whose epoch is not older.
    fn supersede(&self, key: &RotatingKey) -> StorageResult<()>;

    /// Up to `limit` keys, most recent first.
    fn most_recent(&self, limit: usize) -> StorageResult<Vec<RotatingKey>>;
}

/// [`KeyStore`] over the `rotating_keys` table.
#[derive(Clone)]
pub struct SqliteKeyStore {
    db: Database,
}

impl SqliteKeyStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }
}

impl KeyStore for SqliteKeyStore {
    /// Rejects keys whose epoch does not follow the latest stored one.
    fn insert(&self, key: &RotatingKey) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;

            let latest: Option<i64> = tx
                .query_row(
                    "SELECT epoch_start FROM rotating_keys ORDER BY epoch_start DESC LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(latest) = latest {
                if key.epoch_start() as i64 <= latest {
                    return Err(StorageError::NonMonotonicEpoch {
                        latest: latest as u64,
                        attempted: key.epoch_start(),
                    });
                }
            }

            tx.execute(
                "INSERT INTO rotating_keys (key, epoch_start) VALUES (?1, ?2)",
                params![key.bytes(), key.epoch_start() as i64],
            )?;
            tx.commit()?;

            debug!(epoch_start = key.epoch_start(), "Rotating key persisted");
            Ok(())
        })
    }

    fn supersede(&self, key: &RotatingKey) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            let tx = conn.transaction()?;
            let replaced = tx.execute(
                "DELETE FROM rotating_keys WHERE epoch_start >= ?1",
                params![key.epoch_start() as i64],
            )?;
            tx.execute(
                "INSERT INTO rotating_keys (key, epoch_start) VALUES (?1, ?2)",
                params![key.bytes(), key.epoch_start() as i64],
            )?;
            tx.commit()?;

            debug!(
                epoch_start = key.epoch_start(),
                replaced, "Rotating key superseded"
            );
            Ok(())
        })
    }

    fn most_recent(&self, limit: usize) -> StorageResult<Vec<RotatingKey>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT key, epoch_start FROM rotating_keys ORDER BY epoch_start DESC LIMIT ?1",
            )?;

            let keys = stmt
                .query_map([limit as i64], |row| {
                    Ok(RotatingKey::new(
                        row.get::<_, Vec<u8>>(0)?,
                        row.get::<_, i64>(1)? as u64,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(keys)
        })
    }
}
