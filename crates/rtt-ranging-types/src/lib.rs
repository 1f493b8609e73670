//! Shared data model and collaborator contracts for the Wi-Fi RTT ranging scheduler.
//!
//! This crate has no behavior of its own: it is the vocabulary every other
//! `rtt-ranging-*` crate builds on.

pub mod debug;
pub mod error;
pub mod events;
pub mod model;
pub mod traits;

pub use debug::{DebugParameters, OVERRIDE_ASSUME_NO_PRIVILEGE};
pub use error::{RangingFailure, SubmitError};
pub use events::{EventListener, EventListeners, RangingEvent};
pub use model::*;
pub use traits::{
    Clock, CredentialStore, DiscoveryResolver, LivenessRegistry, PermissionOracle,
    RangingController,
};
