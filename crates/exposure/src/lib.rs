//! Proximity exposure protocol runtime.
//!
//! Ties the identifier engine, the stores and the radio boundary together:
//!
//! - [`RotationScheduler`]: key lifecycle and identifier emission
//! - [`MatchEngine`]: regenerates a published key's identifiers over the
//!   match window and looks them up locally
//! - [`ExposureCoordinator`]: channel ingestion, periodic key checks and
//!   report submission against a [`ReportService`]

pub mod coordinator;
pub mod error;
pub mod matcher;
pub mod scheduler;
pub mod service;
pub mod task;

pub use coordinator::{CheckOutcome, ExposureAlert, ExposureCoordinator, Stores};
pub use error::{ExposureError, MatchError, NetworkError, RotationError, SubmitError};
pub use matcher::{CandidateSet, MatchEngine};
pub use scheduler::{RotationHandle, RotationScheduler, SchedulerState};
pub use service::{HttpReportService, ReportService};
pub use task::TaskHandle;
