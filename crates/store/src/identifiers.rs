//! Observed identifier persistence.

use coepi_core::{Identifier, ObservedIdentifier, Timestamp};
use rusqlite::params;
use rusqlite::types::Value;
use std::collections::HashSet;
use tracing::debug;

use crate::database::Database;
use crate::error::StorageResult;

/// Candidates bound per statement, well under SQLite's variable limit.
const CANDIDATE_BATCH: usize = 500;

/// Append-only log of identifiers heard on the channel.
pub trait IdentifierStore: Send + Sync {
    /// Record one observation. Duplicates are kept.
    fn insert(&self, observation: &ObservedIdentifier) -> StorageResult<()>;

    /// Observations whose bytes are in `candidates` and whose time lies in
    /// `[min_timestamp, max_timestamp]`, oldest first.
    fn find_in_range(
        &self,
        min_timestamp: Timestamp,
        max_timestamp: Timestamp,
        candidates: &HashSet<Identifier>,
    ) -> StorageResult<Vec<ObservedIdentifier>>;

    /// Delete observations older than `cutoff`, returning how many were removed.
    fn prune_before(&self, cutoff: Timestamp) -> StorageResult<usize>;

    /// Number of stored observations.
    fn count(&self) -> StorageResult<usize>;
}

/// [`IdentifierStore`] over the `observed_identifiers` table.
#[derive(Clone)]
pub struct SqliteIdentifierStore {
    db: Database,
}

impl SqliteIdentifierStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }
}

impl IdentifierStore for SqliteIdentifierStore {
    fn insert(&self, observation: &ObservedIdentifier) -> StorageResult<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO observed_identifiers (identifier, observed_at) VALUES (?1, ?2)",
                params![
                    observation.identifier.as_bytes(),
                    observation.observed_at as i64
                ],
            )?;
            Ok(())
        })
    }

    fn find_in_range(
        &self,
        min_timestamp: Timestamp,
        max_timestamp: Timestamp,
        candidates: &HashSet<Identifier>,
    ) -> StorageResult<Vec<ObservedIdentifier>> {
        if candidates.is_empty() || min_timestamp > max_timestamp {
            return Ok(Vec::new());
        }

        let candidates: Vec<&Identifier> = candidates.iter().collect();

        let mut found = self.db.with_conn(|conn| {
            let mut found = Vec::new();

            for batch in candidates.chunks(CANDIDATE_BATCH) {
                let placeholders = (0..batch.len())
                    .map(|i| format!("?{}", i + 3))
                    .collect::<Vec<_>>()
                    .join(", ");
                let sql = format!(
                    "SELECT identifier, observed_at FROM observed_identifiers
                     WHERE observed_at BETWEEN ?1 AND ?2 AND identifier IN ({})",
                    placeholders
                );

                let mut values = Vec::with_capacity(batch.len() + 2);
                values.push(Value::Integer(min_timestamp as i64));
                values.push(Value::Integer(max_timestamp as i64));
                values.extend(batch.iter().map(|id| Value::Blob(id.as_bytes().to_vec())));

                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                        Ok(ObservedIdentifier::new(
                            Identifier::new(row.get(0)?),
                            row.get::<_, i64>(1)? as u64,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                found.extend(rows);
            }

            Ok(found)
        })?;

        found.sort_by_key(|obs| obs.observed_at);

        debug!(
            min_timestamp,
            max_timestamp,
            candidates = candidates.len(),
            matches = found.len(),
            "Range query over observed identifiers"
        );

        Ok(found)
    }

    fn prune_before(&self, cutoff: Timestamp) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM observed_identifiers WHERE observed_at < ?1",
                [cutoff as i64],
            )?;
            Ok(removed)
        })
    }

    fn count(&self) -> StorageResult<usize> {
        self.db.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM observed_identifiers", [], |row| {
                    row.get(0)
                })?;
            Ok(count as usize)
        })
    }
}
