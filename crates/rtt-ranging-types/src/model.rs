//! The ranging scheduler's data model, as plain Rust types.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An attributed process identifier. Android calls this a UID; kept as a bare `i32`
/// since the scheduler only ever compares, hashes, and bills against it.
pub type Uid = i32;

/// A session-scoped identifier for a client process's liveness. "Death" of the token is
/// signalled by [`crate::traits::LivenessRegistry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LivenessToken(pub u64);

/// The attribution set billed for a ranging operation: the submitting UID plus,
/// optionally, the leaf UIDs of any attribution chains riding on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkSource {
    pub uids: Vec<Uid>,
    pub chain_leaf_uids: Vec<Uid>,
}

impl WorkSource {
    pub fn single(uid: Uid) -> Self {
        Self {
            uids: vec![uid],
            chain_leaf_uids: Vec::new(),
        }
    }

    /// Every UID that should be counted or billed, primary and chain-leaf alike.
    pub fn all_uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.uids.iter().chain(self.chain_leaf_uids.iter()).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.uids.is_empty() && self.chain_leaf_uids.is_empty()
    }

    /// The work source that remains after removing every UID present in `other`. Used by
    /// `cancel(work_source)`: an entry is removed once its remaining work source is empty.
    pub fn subtract(&self, other: &WorkSource) -> WorkSource {
        let remove: std::collections::HashSet<Uid> = other.all_uids().collect();
        WorkSource {
            uids: self.uids.iter().copied().filter(|u| !remove.contains(u)).collect(),
            chain_leaf_uids: self
                .chain_leaf_uids
                .iter()
                .copied()
                .filter(|u| !remove.contains(u))
                .collect(),
        }
    }
}

/// 802.11 preamble used for the measurement exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preamble {
    Legacy,
    Ht,
    Vht,
    He,
}

/// Key-management bits carried in a secure-ranging config's AKM suite selector.
/// See [`SecurityType`] for the derived security type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AkmSuite {
    pub pasn: bool,
    pub sae: bool,
    pub ft_psk: bool,
}

/// The security type derived from an [`AkmSuite`], used as half of the credential store
/// lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityType {
    Open,
    Sae,
    Psk,
    Eap,
}

impl AkmSuite {
    /// PASN-only implies open; any SAE bit implies SAE; any FT-PSK bit implies PSK;
    /// otherwise EAP.
    pub fn security_type(&self) -> SecurityType {
        if self.sae {
            SecurityType::Sae
        } else if self.ft_psk {
            SecurityType::Psk
        } else if self.pasn {
            SecurityType::Open
        } else {
            SecurityType::Eap
        }
    }
}

/// Secure-ranging (PASN) configuration attached to a request or a single responder.
#[derive(Debug, Clone, Default)]
pub struct SecureRangingConfig {
    pub akm: AkmSuite,
    pub ssid: Option<String>,
    pub password: Option<String>,
    pub base_akm_only: bool,
}

/// A target to measure distance to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponderKind {
    /// An infrastructure access point.
    Ap,
    /// A peer discovered through the neighbouring discovery subsystem.
    Aware,
}

/// A single ranging target, shared with the lifetime of its [`RangingRequest`].
#[derive(Debug, Clone)]
pub struct Responder {
    pub kind: ResponderKind,
    pub mac: Option<[u8; 6]>,
    /// Opaque, session-scoped peer identifier. Only meaningful for [`ResponderKind::Aware`].
    pub peer_handle: Option<i64>,
    pub supports_11mc: bool,
    pub supports_11az: bool,
    pub channel: Option<u32>,
    pub bandwidth_mhz: Option<u32>,
    pub frequency_mhz: Option<u32>,
    pub preamble: Option<Preamble>,
    pub secure_config: Option<SecureRangingConfig>,
    pub az_min_time_between_ntb_measurements_us: Option<u32>,
    pub az_max_time_between_ntb_measurements_us: Option<u32>,
}

impl Responder {
    pub fn ap(mac: [u8; 6]) -> Self {
        Self {
            kind: ResponderKind::Ap,
            mac: Some(mac),
            peer_handle: None,
            supports_11mc: true,
            supports_11az: false,
            channel: None,
            bandwidth_mhz: None,
            frequency_mhz: None,
            preamble: None,
            secure_config: None,
            az_min_time_between_ntb_measurements_us: None,
            az_max_time_between_ntb_measurements_us: None,
        }
    }

    pub fn aware_peer(peer_handle: i64) -> Self {
        Self {
            kind: ResponderKind::Aware,
            mac: None,
            peer_handle: Some(peer_handle),
            supports_11mc: true,
            supports_11az: false,
            channel: None,
            bandwidth_mhz: None,
            frequency_mhz: None,
            preamble: None,
            secure_config: None,
            az_min_time_between_ntb_measurements_us: None,
            az_max_time_between_ntb_measurements_us: None,
        }
    }

    /// A responder needs resolution if it carries a peer handle but no MAC yet.
    pub fn needs_resolution(&self) -> bool {
        self.peer_handle.is_some() && self.mac.is_none()
    }

    /// The identity to report back to the caller: the peer handle when present,
    /// otherwise the MAC.
    pub fn outbound_identity(&self) -> Option<Identity> {
        match (self.peer_handle, self.mac) {
            (Some(h), _) => Some(Identity::PeerHandle(h)),
            (None, Some(mac)) => Some(Identity::Mac(mac)),
            (None, None) => None,
        }
    }
}

/// The immutable (save for MAC substitution pre-dispatch) request body.
#[derive(Debug, Clone)]
pub struct RangingRequest {
    pub responders: Vec<Responder>,
    pub rtt_burst_size: u8,
}

impl RangingRequest {
    pub fn is_empty(&self) -> bool {
        self.responders.is_empty()
    }

    pub fn has_aware_responder(&self) -> bool {
        self.responders.iter().any(|r| r.kind == ResponderKind::Aware)
    }

    pub fn any_aware_unresolved(&self) -> bool {
        self.responders.iter().any(|r| r.needs_resolution())
    }
}

/// Either side of an identity: the caller's opaque peer handle, or a raw MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Identity {
    Mac([u8; 6]),
    PeerHandle(i64),
}

/// Outcome of a single responder's measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangingStatus {
    Success,
    Fail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelInfo {
    pub frequency_mhz: u32,
    pub bandwidth_mhz: u32,
}

/// A successfully-parsed responder-location report. Gated behind caller privilege by
/// the post-processor's location-data gating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponderLocation {
    pub raw: Vec<u8>,
}

/// Secure-ranging (PASN) result flags, forwarded unconditionally when present since they
/// drive client re-authentication retries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecureRangingOutcome {
    pub secure_he_ltf_used: bool,
    pub secure_ltf_protocol_version: Option<u8>,
    pub comeback_cookie: Option<Vec<u8>>,
    pub comeback_delay: Option<Duration>,
}

/// One responder's raw measurement as emitted by the Controller, keyed by MAC. This is
/// the `RangingResult` entity in its as-received-from-the-driver form,
/// before the post-processor maps it back onto the original request.
#[derive(Debug, Clone)]
pub struct RawRangingResult {
    pub mac: [u8; 6],
    pub status: RangingStatus,
    pub distance_mm: i32,
    pub std_dev_mm: i32,
    pub rssi: i32,
    pub attempted_measurements: u8,
    pub successful_measurements: u8,
    pub timestamp: Instant,
    pub channel: Option<ChannelInfo>,
    pub supports_11mc: bool,
    pub supports_11az: bool,
    pub az_ltf_repetition_count: Option<u8>,
    pub az_min_time_between_ntb_measurements_us: Option<u32>,
    pub az_max_time_between_ntb_measurements_us: Option<u32>,
    pub spatial_stream_count: Option<u8>,
    pub secure_outcome: SecureRangingOutcome,
    pub lci: Option<Vec<u8>>,
    pub lcr: Option<Vec<u8>>,
    pub responder_location: Option<ResponderLocation>,
}

/// The result delivered to the client, in request order, identity-addressed rather than
/// MAC-addressed.
#[derive(Debug, Clone)]
pub struct RangingResult {
    pub identity: Identity,
    pub status: RangingStatus,
    pub distance_mm: i32,
    pub std_dev_mm: i32,
    pub rssi: i32,
    pub attempted_measurements: u8,
    pub successful_measurements: u8,
    pub timestamp: Instant,
    pub channel: Option<ChannelInfo>,
    pub supports_11mc: bool,
    pub supports_11az: bool,
    pub az_ltf_repetition_count: Option<u8>,
    pub az_min_time_between_ntb_measurements_us: Option<u32>,
    pub az_max_time_between_ntb_measurements_us: Option<u32>,
    pub spatial_stream_count: Option<u8>,
    pub secure_outcome: SecureRangingOutcome,
    pub lci: Option<Vec<u8>>,
    pub lcr: Option<Vec<u8>>,
    pub responder_location: Option<ResponderLocation>,
}

impl RangingResult {
    pub fn failure(identity: Identity) -> Self {
        Self {
            identity,
            status: RangingStatus::Fail,
            distance_mm: 0,
            std_dev_mm: 0,
            rssi: 0,
            attempted_measurements: 0,
            successful_measurements: 0,
            timestamp: Instant::now(),
            channel: None,
            supports_11mc: false,
            supports_11az: false,
            az_ltf_repetition_count: None,
            az_min_time_between_ntb_measurements_us: None,
            az_max_time_between_ntb_measurements_us: None,
            spatial_stream_count: None,
            secure_outcome: SecureRangingOutcome::default(),
            lci: None,
            lcr: None,
            responder_location: None,
        }
    }
}

/// Controller feature flags, cached by the facade after the first query.
#[derive(Debug, Clone, Copy, Default)]
pub struct Capabilities {
    pub one_sided_rtt: Option<bool>,
    pub lci: Option<bool>,
    pub lcr: Option<bool>,
    pub station_responder: Option<bool>,
    pub az_ntb_initiator: Option<bool>,
    pub secure_he_ltf: Option<bool>,
    pub ranging_frame_protection: Option<bool>,
    pub max_supported_secure_he_ltf_protocol_version: Option<u32>,
}

/// Tracks, per UID, the wall-clock time of that UID's last dispatched execution. Created
/// lazily on first dispatch.
#[derive(Debug, Clone, Copy)]
pub struct RequesterRecord {
    pub last_execution: Instant,
}

/// Sink for the terminal outcome of an accepted submission. Invoked exactly once per
/// accepted [`RequestInfo`].
pub trait RangingCallback: Send + Sync {
    fn on_results(&self, results: Vec<RangingResult>);
    fn on_failure(&self, failure: crate::error::RangingFailure);
}

/// An owned, queued unit of work. Owned exclusively by the Request Queue; never has a
/// back-pointer to the scheduler.
pub struct RequestInfo {
    pub requester_uid: Uid,
    pub work_source: WorkSource,
    pub liveness_token: LivenessToken,
    pub calling_package: String,
    pub calling_feature_id: Option<String>,
    pub request: RangingRequest,
    pub callback: Arc<dyn RangingCallback>,
    pub privileged: bool,
    pub attribution_source: Option<String>,
    pub cmd_id: u32,
    pub dispatched: bool,
    pub handles_translated: bool,
}

impl fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInfo")
            .field("requester_uid", &self.requester_uid)
            .field("work_source", &self.work_source)
            .field("calling_package", &self.calling_package)
            .field("cmd_id", &self.cmd_id)
            .field("dispatched", &self.dispatched)
            .field("handles_translated", &self.handles_translated)
            .finish()
    }
}

impl RequestInfo {
    /// Every UID this entry should be counted against for throttling purposes: the
    /// submitting UID plus its work source.
    pub fn billed_uids(&self) -> impl Iterator<Item = Uid> + '_ {
        self.work_source.all_uids()
    }
}
