//! Boundary to the local radio channel.
//!
//! The radio itself (advertising, scanning, the physical layer) is an external
//! collaborator. This crate defines the contract the rest of the workspace
//! programs against:
//!
//! - core to radio: [`Advertiser::advertise`] replaces the advertised identifier
//! - radio to core: an unbounded stream of [`ObservedIdentifier`] events
//! - [`CurrentIdentifier`]: the live current-identifier cell written by the
//!   rotation scheduler and read by anyone who needs the broadcast value
//!
//! [`LoopbackRadio`] is an in-process implementation used by simulations and tests.
//!
//! [`ObservedIdentifier`]: coepi_core::ObservedIdentifier

pub mod current;
pub mod radio;

pub use current::{CurrentIdentifier, IdentifierEmission};
pub use radio::{
    observation_channel, Advertiser, LoopbackRadio, ObservationReceiver, ObservationSender,
    RadioError, LOOPBACK_HISTORY_LIMIT,
};
