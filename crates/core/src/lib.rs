//! Core functionality for the CoEpi contact event number (CEN) protocol.
//!
//! This crate provides the fundamental types, configuration, clock and
//! logging utilities shared by every other crate in the workspace:
//!
//! - **Data model**: rotating keys, broadcast identifiers, observations,
//!   published keys, symptom reports and match results
//! - **Configuration**: an immutable protocol configuration handed to each
//!   component at construction, loaded from TOML
//! - **Clock**: wall-clock seconds behind a trait so schedulers can be driven
//!   deterministically in tests
//! - **Logging**: `tracing` subscriber initialisation

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, IdentifierScheme, LoggingConfig, NodeConfig, ProtocolConfig, ServiceConfig,
    StorageConfig,
};
pub use error::{Error, Result};
pub use types::{
    round_down, Identifier, MatchResult, ObservedIdentifier, PublishedKey, RotatingKey,
    SymptomReport, Timestamp, SECONDS_PER_DAY,
};
