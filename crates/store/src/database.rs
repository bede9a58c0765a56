//! Shared SQLite connection and schema.

use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::info;

use crate::error::{StorageError, StorageResult};
use crate::identifiers::SqliteIdentifierStore;
use crate::keys::SqliteKeyStore;
use crate::reports::SqliteReportStore;

/// Handle to the node's database. Clones share one connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Create or open a database at the specified path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        info!(path = %path.display(), "Opening CoEpi database");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        // WAL keeps readers off the writer's back
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;

        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rotating_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key BLOB NOT NULL,
                epoch_start INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS observed_identifiers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                identifier BLOB NOT NULL,
                observed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS reports (
                id TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                mime_type TEXT NOT NULL,
                associated_keys TEXT NOT NULL,
                is_self_authored INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_keys_epoch_start ON rotating_keys(epoch_start);
            CREATE INDEX IF NOT EXISTS idx_observed_at ON observed_identifiers(observed_at);
            CREATE INDEX IF NOT EXISTS idx_observed_identifier ON observed_identifiers(identifier);
            CREATE INDEX IF NOT EXISTS idx_reports_created_at ON reports(created_at);
            "#,
        )?;

        Ok(())
    }

    /// Run `f` with exclusive access to the connection.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut conn = self.conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        f(&mut conn)
    }

    /// Store for this device's rotating keys.
    pub fn key_store(&self) -> SqliteKeyStore {
        SqliteKeyStore::new(self.clone())
    }

    /// Store for identifiers observed on the channel.
    pub fn identifier_store(&self) -> SqliteIdentifierStore {
        SqliteIdentifierStore::new(self.clone())
    }

    /// Store for symptom reports.
    pub fn report_store(&self) -> SqliteReportStore {
        SqliteReportStore::new(self.clone())
    }

    /// Database file, `None` when in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}
