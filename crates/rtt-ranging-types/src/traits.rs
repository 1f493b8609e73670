//! Collaborator contracts for everything the core treats as out-of-scope and external:
//! the radio driver, the peer-discovery daemon, the credential store, and the
//! permission/importance/liveness providers. Each is expressed here as a trait so the
//! scheduler can be driven by fakes in tests and by real adapters in a binary that wires
//! this crate up to the genuine collaborators.

use std::time::Instant;

use futures::future::BoxFuture;

use crate::model::{Capabilities, LivenessToken, RangingRequest, SecurityType, Uid};

/// A source of wall-clock time, injected so tests can control it deterministically —
/// the same "pass a clock in" shape used for `Instant`-driven state elsewhere in this
/// workspace.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The system clock. The only production implementation; tests use a fake instead.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// The ranging driver ("the Controller"), accessed only through this contract.
pub trait RangingController: Send + Sync {
    /// Returns `true` if the Controller synchronously accepted the request.
    fn range_request(&self, cmd_id: u32, request: &RangingRequest) -> bool;

    fn range_cancel(&self, cmd_id: u32, mac_list: Vec<[u8; 6]>);

    fn get_capabilities(&self) -> Capabilities;
}

/// The peer-discovery service ("the Discovery Resolver").
pub trait DiscoveryResolver: Send + Sync {
    /// Resolves peer IDs to MAC addresses. Unmapped IDs may be omitted from the result.
    /// MACs travel as raw bytes across this boundary — the resolver crate is
    /// responsible for validating the 6-byte length before trusting one.
    fn request_mac_addresses(
        &self,
        uid: Uid,
        peer_ids: Vec<i64>,
    ) -> BoxFuture<'static, Vec<(i64, Vec<u8>)>>;

    /// Whether the discovery subsystem is present at all. Aware-peer ranging requires
    /// this to be `true` at submission time.
    fn is_available(&self) -> bool;
}

/// Pre-shared secret lookup for secure ranging.
pub trait CredentialStore: Send + Sync {
    fn lookup(&self, translated_ssid: &str, security_type: SecurityType) -> Option<String>;
}

/// Permission, package-identity, and foreground-importance providers, collapsed into one
/// trait since every core decision that touches them is one of these three boolean
/// questions.
pub trait PermissionOracle: Send + Sync {
    fn is_foreground(&self, uid: Uid) -> bool;
    fn has_location_permission(&self, uid: Uid) -> bool;
    fn has_nearby_devices_permission(&self, uid: Uid) -> bool;
}

/// Client-liveness subscription. "Death" of a token is delivered through the future
/// returned by `subscribe`; the scheduler awaits it on a spawned task and trampolines
/// the result back onto its own execution context as a `ClientDeath` command, so a
/// request never holds a back-pointer to the scheduler that owns it.
pub trait LivenessRegistry: Send + Sync {
    /// Resolves once the client owning `token` has died. Never resolves otherwise.
    fn subscribe(&self, token: LivenessToken) -> BoxFuture<'static, ()>;

    fn unsubscribe(&self, token: LivenessToken);
}
