//! Local persistence for the CoEpi identifier protocol.
//!
//! Three logical tables live in one SQLite database:
//!
//! - `rotating_keys`: this device's keys `(key, epoch_start)`
//! - `observed_identifiers`: identifiers heard from nearby devices `(identifier, observed_at)`
//! - `reports`: submitted and fetched symptom reports
//!
//! # Concurrency
//!
//! The channel-ingestion path, the rotation scheduler and the matcher all
//! share one [`Database`]. Every insert is a single statement, so records are
//! atomic individually; no cross-record transactions are required. The
//! connection is serialised behind a mutex.
//!
//! Each table is reached through a trait ([`KeyStore`], [`IdentifierStore`],
//! [`ReportStore`]) so callers can substitute their own storage engine.

pub mod database;
pub mod error;
pub mod identifiers;
pub mod keys;
pub mod reports;

pub use database::Database;
pub use error::{StorageError, StorageResult};
pub use identifiers::{IdentifierStore, SqliteIdentifierStore};
pub use keys::{KeyStore, SqliteKeyStore};
pub use reports::{ReportStore, SqliteReportStore};
