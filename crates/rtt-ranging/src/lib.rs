//! Wi-Fi RTT ranging coordinator.
//!
//! `rtt-ranging` wires the scheduler workspace (`rtt-ranging-scheduler` and its
//! collaborator crates) into one [`RangingCoordinator`]: a thin assembly layer that owns
//! configuration, a debug side-channel, and the public API a caller actually drives.
//!
//! ```rust,no_run
//! # use rtt_ranging::RangingCoordinator;
//! # use rtt_ranging_scheduler::{Collaborators, SchedulerConfig};
//! # use rtt_ranging_availability::AvailabilityMonitor;
//! # fn example(collaborators: Collaborators) {
//! let coordinator = RangingCoordinator::new(
//!     SchedulerConfig::from_env(),
//!     collaborators,
//!     AvailabilityMonitor::builder(),
//! );
//! let caps = coordinator.get_characteristics();
//! # let _ = caps;
//! # }
//! ```

use std::sync::{Arc, OnceLock};

use rtt_ranging_availability::{AvailabilityMonitor, AvailabilityMonitorBuilder};
use rtt_ranging_scheduler::{Collaborators, SchedulerConfig, SchedulerHandle};
use rtt_ranging_types::{
    Capabilities, DebugParameters, LivenessToken, RangingCallback, RangingRequest, RawRangingResult,
    SubmitError, Uid, WorkSource, OVERRIDE_ASSUME_NO_PRIVILEGE,
};

/// The public upward API, covering request submission, cancellation, lifecycle
/// notifications, and the debug surface.
///
/// Cheaply `Clone`: every field is a handle onto the scheduler's single execution
/// context or a small shared cache, never the state itself.
#[derive(Clone)]
pub struct RangingCoordinator {
    handle: SchedulerHandle,
    debug: Arc<DebugParameters>,
    capabilities: Arc<OnceLock<Capabilities>>,
}

impl RangingCoordinator {
    /// Spawns the scheduler and returns the coordinator that fronts it.
    ///
    /// `availability_builder` is passed through unbuilt, same contract as
    /// [`rtt_ranging_scheduler::spawn`]: the caller still owns feeding it `note_*`
    /// updates through [`RangingCoordinator::availability`].
    pub fn new(
        config: SchedulerConfig,
        collaborators: Collaborators,
        availability_builder: AvailabilityMonitorBuilder,
    ) -> Self {
        let debug = Arc::new(DebugParameters::new());
        let (handle, _availability) =
            rtt_ranging_scheduler::spawn(config, collaborators, availability_builder, Arc::clone(&debug));

        Self {
            handle,
            debug,
            capabilities: Arc::new(OnceLock::new()),
        }
    }

    /// Submits a ranging request. Synchronous validation failures (empty responder
    /// list, Aware peers without Discovery) return an `Err` immediately; every other
    /// outcome is delivered later through `callback`.
    #[allow(clippy::too_many_arguments)]
    pub fn start_ranging(
        &self,
        requester_uid: Uid,
        work_source: WorkSource,
        liveness_token: LivenessToken,
        calling_package: String,
        calling_feature_id: Option<String>,
        request: RangingRequest,
        callback: Arc<dyn RangingCallback>,
        privileged: bool,
        attribution_source: Option<String>,
    ) -> Result<(), SubmitError> {
        self.handle.submit(
            requester_uid,
            work_source,
            liveness_token,
            calling_package,
            calling_feature_id,
            request,
            callback,
            privileged,
            attribution_source,
        )
    }

    /// Cancels every queued or dispatched request whose work source overlaps
    /// `work_source`. Silent on an empty or unknown work source — see DESIGN.md.
    pub fn cancel_ranging(&self, work_source: WorkSource) {
        self.handle.cancel(work_source);
    }

    /// Forwarded from the binder-layer integrator's death recipient.
    pub fn notify_client_death(&self, uid: Uid, liveness_token: LivenessToken) {
        self.handle.notify_client_death(uid, liveness_token);
    }

    /// Forwarded from the `RangingController` adapter's async result channel.
    pub fn notify_controller_result(&self, cmd_id: u32, results: Vec<RawRangingResult>) {
        self.handle.notify_controller_result(cmd_id, results);
    }

    pub fn is_available(&self) -> bool {
        self.handle.is_available()
    }

    /// Queries the Controller's feature flags on first call only; every later call
    /// returns the cached value.
    pub fn get_characteristics(&self) -> Capabilities {
        *self.capabilities.get_or_init(|| self.handle.get_characteristics())
    }

    pub fn debug_shell(&self) -> DebugShell<'_> {
        DebugShell { debug: &self.debug }
    }
}

/// The `reset` / `get <name>` / `set <name> <value>` command surface. Not part of the
/// runtime contract — a test and operator hook only, and deliberately incapable of
/// touching queue state.
pub struct DebugShell<'a> {
    debug: &'a DebugParameters,
}

impl DebugShell<'_> {
    pub fn reset(&self) {
        self.debug.reset();
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.debug.get(name)
    }

    pub fn set(&self, name: &str, value: i64) {
        self.debug.set(name, value);
    }

    /// `set override-assume-no-privilege 1`, the one switch callers are expected to
    /// flip directly by name.
    pub fn set_assume_no_privilege(&self, value: bool) {
        self.debug.set(OVERRIDE_ASSUME_NO_PRIVILEGE, value as i64);
    }

    pub fn get_capabilities(&self, coordinator: &RangingCoordinator) -> Capabilities {
        coordinator.get_characteristics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    use futures::future::BoxFuture;

    use rtt_ranging_types::{
        Clock, CredentialStore, DiscoveryResolver, PermissionOracle, RangingController,
        RangingResult, Responder, SecurityType,
    };

    struct FakeController;

    impl RangingController for FakeController {
        fn range_request(&self, _cmd_id: u32, _request: &RangingRequest) -> bool {
            false
        }
        fn range_cancel(&self, _cmd_id: u32, _mac_list: Vec<[u8; 6]>) {}
        fn get_capabilities(&self) -> Capabilities {
            Capabilities {
                one_sided_rtt: Some(true),
                ..Capabilities::default()
            }
        }
    }

    struct FakeResolver;

    impl DiscoveryResolver for FakeResolver {
        fn request_mac_addresses(
            &self,
            _uid: Uid,
            _peer_ids: Vec<i64>,
        ) -> BoxFuture<'static, Vec<(i64, Vec<u8>)>> {
            Box::pin(async { Vec::new() })
        }
        fn is_available(&self) -> bool {
            true
        }
    }

    struct NoCredentials;

    impl CredentialStore for NoCredentials {
        fn lookup(&self, _translated_ssid: &str, _security_type: SecurityType) -> Option<String> {
            None
        }
    }

    struct FakePermissions;

    impl PermissionOracle for FakePermissions {
        fn is_foreground(&self, _uid: Uid) -> bool {
            false
        }
        fn has_location_permission(&self, _uid: Uid) -> bool {
            true
        }
        fn has_nearby_devices_permission(&self, _uid: Uid) -> bool {
            true
        }
    }

    #[derive(Default)]
    struct FakeLiveness;

    impl rtt_ranging_types::LivenessRegistry for FakeLiveness {
        fn subscribe(&self, _token: LivenessToken) -> BoxFuture<'static, ()> {
            Box::pin(futures::future::pending())
        }
        fn unsubscribe(&self, _token: LivenessToken) {}
    }

    struct FakeClock;

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            Instant::now()
        }
    }

    struct NoopCallback;

    impl RangingCallback for NoopCallback {
        fn on_results(&self, _results: Vec<RangingResult>) {}
        fn on_failure(&self, _failure: rtt_ranging_types::RangingFailure) {}
    }

    fn make_coordinator() -> RangingCoordinator {
        let collaborators = Collaborators {
            controller: Arc::new(FakeController),
            resolver: Arc::new(FakeResolver),
            credentials: Arc::new(NoCredentials),
            permissions: Arc::new(FakePermissions),
            liveness: Arc::new(FakeLiveness),
            clock: Arc::new(FakeClock),
        };
        RangingCoordinator::new(SchedulerConfig::default(), collaborators, AvailabilityMonitor::builder())
    }

    #[tokio::test]
    async fn empty_responder_list_is_rejected_synchronously() {
        let coordinator = make_coordinator();
        let result = coordinator.start_ranging(
            1,
            WorkSource::single(1),
            LivenessToken(1),
            "com.example".to_string(),
            None,
            RangingRequest { responders: Vec::new(), rtt_burst_size: 8 },
            Arc::new(NoopCallback),
            false,
            None,
        );
        assert_eq!(result, Err(SubmitError::EmptyResponders));
    }

    #[tokio::test]
    async fn aware_responder_without_discovery_is_rejected_synchronously() {
        struct UnavailableResolver;
        impl DiscoveryResolver for UnavailableResolver {
            fn request_mac_addresses(
                &self,
                _uid: Uid,
                _peer_ids: Vec<i64>,
            ) -> BoxFuture<'static, Vec<(i64, Vec<u8>)>> {
                Box::pin(async { Vec::new() })
            }
            fn is_available(&self) -> bool {
                false
            }
        }

        let collaborators = Collaborators {
            controller: Arc::new(FakeController),
            resolver: Arc::new(UnavailableResolver),
            credentials: Arc::new(NoCredentials),
            permissions: Arc::new(FakePermissions),
            liveness: Arc::new(FakeLiveness),
            clock: Arc::new(FakeClock),
        };
        let coordinator =
            RangingCoordinator::new(SchedulerConfig::default(), collaborators, AvailabilityMonitor::builder());

        let result = coordinator.start_ranging(
            1,
            WorkSource::single(1),
            LivenessToken(1),
            "com.example".to_string(),
            None,
            RangingRequest { responders: vec![Responder::aware_peer(7)], rtt_burst_size: 8 },
            Arc::new(NoopCallback),
            false,
            None,
        );
        assert_eq!(result, Err(SubmitError::AwareUnavailable));
    }

    #[tokio::test]
    async fn capabilities_are_cached_after_first_query() {
        let coordinator = make_coordinator();
        let first = coordinator.get_characteristics();
        let second = coordinator.get_characteristics();
        assert_eq!(first.one_sided_rtt, Some(true));
        assert_eq!(second.one_sided_rtt, Some(true));
    }

    #[tokio::test]
    async fn debug_shell_round_trips_the_override_switch() {
        let coordinator = make_coordinator();
        let shell = coordinator.debug_shell();

        assert_eq!(shell.get(OVERRIDE_ASSUME_NO_PRIVILEGE), None);
        shell.set_assume_no_privilege(true);
        assert_eq!(shell.get(OVERRIDE_ASSUME_NO_PRIVILEGE), Some(1));
        shell.reset();
        assert_eq!(shell.get(OVERRIDE_ASSUME_NO_PRIVILEGE), None);
    }
}
