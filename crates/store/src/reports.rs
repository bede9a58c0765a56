//! Symptom report cache.

use coepi_core::{SymptomReport, Timestamp};
use rusqlite::{params, Row};

use crate::database::Database;
use crate::error::StorageResult;

/// Local cache of submitted and fetched symptom reports.
pub trait ReportStore: Send + Sync {
    /// Store a report. Returns false when a report with the same id exists.
    fn insert(&self, report: &SymptomReport) -> StorageResult<bool>;

    /// Every cached report, newest first.
    fn all(&self) -> StorageResult<Vec<SymptomReport>>;

    /// Reports whose id is in `ids`.
    fn by_ids(&self, ids: &[String]) -> StorageResult<Vec<SymptomReport>>;

    /// Reports created within `[start, end]`, oldest first.
    fn find_in_range(&self, start: Timestamp, end: Timestamp) -> StorageResult<Vec<SymptomReport>>;

    /// Remove a report. Returns false when it was not present.
    fn delete(&self, id: &str) -> StorageResult<bool>;
}

/// [`ReportStore`] over the `reports` table.
#[derive(Clone)]
pub struct SqliteReportStore {
    db: Database,
}

impl SqliteReportStore {
    pub(crate) fn new(db: Database) -> Self {
        Self { db }
    }
}

const REPORT_COLUMNS: &str =
    "id, payload, mime_type, associated_keys, is_self_authored, created_at";

/// Row in `REPORT_COLUMNS` order; keys are decoded by the caller.
type ReportRow = (String, String, String, String, bool, i64);

fn read_row(row: &Row<'_>) -> rusqlite::Result<ReportRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get::<_, i64>(4)? != 0,
        row.get(5)?,
    ))
}

fn into_report(row: ReportRow) -> StorageResult<SymptomReport> {
    let (id, payload, mime_type, keys, is_self_authored, created_at) = row;
    Ok(SymptomReport {
        id,
        payload,
        mime_type,
        associated_keys: serde_json::from_str(&keys)?,
        is_self_authored,
        created_at: created_at as u64,
    })
}

impl SqliteReportStore {
    fn query(
        &self,
        sql: &str,
        values: Vec<rusqlite::types::Value>,
    ) -> StorageResult<Vec<SymptomReport>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(values.iter()), read_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        rows.into_iter().map(into_report).collect()
    }
}

impl ReportStore for SqliteReportStore {
    fn insert(&self, report: &SymptomReport) -> StorageResult<bool> {
        let keys = serde_json::to_string(&report.associated_keys)?;

        self.db.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO reports
                 (id, payload, mime_type, associated_keys, is_self_authored, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    report.id,
                    report.payload,
                    report.mime_type,
                    keys,
                    report.is_self_authored as i64,
                    report.created_at as i64,
                ],
            )?;
            Ok(inserted == 1)
        })
    }

    fn all(&self) -> StorageResult<Vec<SymptomReport>> {
        self.query(
            &format!("SELECT {} FROM reports ORDER BY created_at DESC", REPORT_COLUMNS),
            Vec::new(),
        )
    }

    fn by_ids(&self, ids: &[String]) -> StorageResult<Vec<SymptomReport>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let values = ids
            .iter()
            .map(|id| rusqlite::types::Value::Text(id.clone()))
            .collect();

        self.query(
            &format!(
                "SELECT {} FROM reports WHERE id IN ({}) ORDER BY created_at ASC",
                REPORT_COLUMNS, placeholders
            ),
            values,
        )
    }

    fn find_in_range(&self, start: Timestamp, end: Timestamp) -> StorageResult<Vec<SymptomReport>> {
        self.query(
            &format!(
                "SELECT {} FROM reports WHERE created_at BETWEEN ?1 AND ?2 ORDER BY created_at ASC",
                REPORT_COLUMNS
            ),
            vec![
                rusqlite::types::Value::Integer(start as i64),
                rusqlite::types::Value::Integer(end as i64),
            ],
        )
    }

    fn delete(&self, id: &str) -> StorageResult<bool> {
        self.db.with_conn(|conn| {
            let removed = conn.execute("DELETE FROM reports WHERE id = ?1", [id])?;
            Ok(removed > 0)
        })
    }
}
