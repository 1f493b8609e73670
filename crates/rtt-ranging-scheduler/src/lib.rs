//! The Wi-Fi RTT ranging scheduler: request queue + timeout timer + request lifecycle
//! engine, the dominant crate in this workspace.
//!
//! A dedicated `tokio` task owns every mutable field; every external input —
//! submissions, cancellations, Controller results, resolver callbacks, timer fires,
//! availability edges, client death — arrives as a [`Command`] over one channel, the
//! idiomatic Rust expression of a single execution context with no internal locking.

mod collaborators;
mod command;
mod config;
mod credential;
mod engine;
mod handle;
mod overlay;
mod queue;
mod timer;

pub use collaborators::Collaborators;
pub use command::{Command, SubmitPayload};
pub use config::{SchedulerConfig, SchedulerConfigBuilder};
pub use handle::SchedulerHandle;
pub use timer::{HAL_AWARE_RANGING_TIMEOUT_MS, HAL_RANGING_TIMEOUT_MS};

use std::sync::Arc;

use tokio::sync::mpsc;

use rtt_ranging_availability::{AvailabilityEdge, AvailabilityMonitor, AvailabilityMonitorBuilder};
use rtt_ranging_types::DebugParameters;

use engine::Engine;

/// Spawns the scheduler task and returns the handle callers drive it with, plus the
/// shared [`AvailabilityMonitor`] so the caller can keep feeding it `note_*` updates.
///
/// `availability_builder` is taken unbuilt so this function can register the edge
/// listener that forwards transitions back into the scheduler's own command channel —
/// the only way an externally-driven boolean gets to "try dispatch" without giving the
/// monitor a back-pointer to the engine. `debug` is owned by the caller (the facade),
/// which hands out its own clone to the debug shell command handler.
pub fn spawn(
    config: SchedulerConfig,
    collaborators: Collaborators,
    availability_builder: AvailabilityMonitorBuilder,
    debug: Arc<DebugParameters>,
) -> (SchedulerHandle, Arc<AvailabilityMonitor>) {
    let (sender, receiver) = mpsc::unbounded_channel();

    let availability_sender = sender.clone();
    let availability = Arc::new(
        availability_builder
            .on_edge(move |event| {
                let available = event.edge == AvailabilityEdge::Enabled;
                let _ = availability_sender.send(Command::AvailabilityChanged(available));
            })
            .build(),
    );

    let handle = SchedulerHandle::new(
        sender.clone(),
        Arc::clone(&availability),
        Arc::clone(&collaborators.controller),
        Arc::clone(&collaborators.resolver),
    );

    let engine = Engine::new(config, collaborators, Arc::clone(&availability), debug, sender);
    tokio::spawn(engine.run(receiver));

    (handle, availability)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    use futures::future::BoxFuture;

    use rtt_ranging_types::{
        Capabilities, Clock, CredentialStore, DebugParameters, DiscoveryResolver, Identity,
        LivenessRegistry, LivenessToken, PermissionOracle, RangingCallback, RangingController,
        RangingFailure, RangingRequest, RangingResult, RangingStatus, RawRangingResult, Responder,
        SecureRangingOutcome, SecurityType, WorkSource,
    };

    struct FakeController {
        accept: bool,
        dispatched: mpsc::UnboundedSender<(u32, RangingRequest)>,
        cancelled: Mutex<Vec<u32>>,
    }

    impl RangingController for FakeController {
        fn range_request(&self, cmd_id: u32, request: &RangingRequest) -> bool {
            if self.accept {
                let _ = self.dispatched.send((cmd_id, request.clone()));
            }
            self.accept
        }

        fn range_cancel(&self, cmd_id: u32, _mac_list: Vec<[u8; 6]>) {
            self.cancelled.lock().unwrap().push(cmd_id);
        }

        fn get_capabilities(&self) -> Capabilities {
            Capabilities::default()
        }
    }

    /// `pending: true` makes every resolution request hang forever, simulating a
    /// Discovery Resolver that never answers — used to pin a request in
    /// `AwaitingResolution` so the queue can be driven past its per-UID cap.
    struct FakeResolver {
        pending: bool,
        mapping: Vec<(i64, Vec<u8>)>,
    }

    impl DiscoveryResolver for FakeResolver {
        fn request_mac_addresses(
            &self,
            _uid: i32,
            _peer_ids: Vec<i64>,
        ) -> BoxFuture<'static, Vec<(i64, Vec<u8>)>> {
            if self.pending {
                Box::pin(futures::future::pending())
            } else {
                let mapping = self.mapping.clone();
                Box::pin(async move { mapping })
            }
        }

        fn is_available(&self) -> bool {
            true
        }
    }

    struct FakePermissions;

    impl PermissionOracle for FakePermissions {
        fn is_foreground(&self, _uid: i32) -> bool {
            false
        }
        fn has_location_permission(&self, _uid: i32) -> bool {
            true
        }
        fn has_nearby_devices_permission(&self, _uid: i32) -> bool {
            true
        }
    }

    struct FakeClock(Mutex<Instant>);

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            *self.0.lock().unwrap()
        }
    }

    struct NoCredentials;

    impl CredentialStore for NoCredentials {
        fn lookup(&self, _translated_ssid: &str, _security_type: SecurityType) -> Option<String> {
            None
        }
    }

    #[derive(Default)]
    struct FakeLiveness {
        senders: Mutex<HashMap<LivenessToken, tokio::sync::oneshot::Sender<()>>>,
    }

    impl FakeLiveness {
        fn kill(&self, token: LivenessToken) {
            if let Some(tx) = self.senders.lock().unwrap().remove(&token) {
                let _ = tx.send(());
            }
        }
    }

    impl LivenessRegistry for FakeLiveness {
        fn subscribe(&self, token: LivenessToken) -> BoxFuture<'static, ()> {
            let (tx, rx) = tokio::sync::oneshot::channel();
            self.senders.lock().unwrap().insert(token, tx);
            Box::pin(async move {
                let _ = rx.await;
            })
        }

        fn unsubscribe(&self, token: LivenessToken) {
            self.senders.lock().unwrap().remove(&token);
        }
    }

    enum CallbackEvent {
        Results(Vec<RangingResult>),
        Failure(RangingFailure),
    }

    struct RecordingCallback(mpsc::UnboundedSender<CallbackEvent>);

    impl RangingCallback for RecordingCallback {
        fn on_results(&self, results: Vec<RangingResult>) {
            let _ = self.0.send(CallbackEvent::Results(results));
        }
        fn on_failure(&self, failure: RangingFailure) {
            let _ = self.0.send(CallbackEvent::Failure(failure));
        }
    }

    fn make_collaborators(accept: bool) -> (Collaborators, mpsc::UnboundedReceiver<(u32, RangingRequest)>, Arc<FakeLiveness>) {
        make_collaborators_with_resolver(accept, false)
    }

    fn make_collaborators_with_resolver(
        accept: bool,
        resolver_pending: bool,
    ) -> (Collaborators, mpsc::UnboundedReceiver<(u32, RangingRequest)>, Arc<FakeLiveness>) {
        make_collaborators_with_resolver_mapping(accept, resolver_pending, Vec::new())
    }

    fn make_collaborators_with_resolver_mapping(
        accept: bool,
        resolver_pending: bool,
        mapping: Vec<(i64, Vec<u8>)>,
    ) -> (Collaborators, mpsc::UnboundedReceiver<(u32, RangingRequest)>, Arc<FakeLiveness>) {
        let (dispatched_tx, dispatched_rx) = mpsc::unbounded_channel();
        let liveness = Arc::new(FakeLiveness::default());
        let collaborators = Collaborators {
            controller: Arc::new(FakeController {
                accept,
                dispatched: dispatched_tx,
                cancelled: Mutex::new(Vec::new()),
            }),
            resolver: Arc::new(FakeResolver {
                pending: resolver_pending,
                mapping,
            }),
            credentials: Arc::new(NoCredentials),
            permissions: Arc::new(FakePermissions),
            liveness: liveness.clone(),
            clock: Arc::new(FakeClock(Mutex::new(Instant::now()))),
        };
        (collaborators, dispatched_rx, liveness)
    }

    fn raw_success(mac: [u8; 6]) -> RawRangingResult {
        RawRangingResult {
            mac,
            status: RangingStatus::Success,
            distance_mm: 1_500,
            std_dev_mm: 100,
            rssi: -55,
            attempted_measurements: 8,
            successful_measurements: 5,
            timestamp: Instant::now(),
            channel: None,
            supports_11mc: true,
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

    #[tokio::test]
    async fn happy_path_dispatches_and_delivers_result() {
        let (collaborators, mut dispatched_rx, _liveness) = make_collaborators(true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        let mac = [0, 1, 2, 3, 4, 5];

        handle
            .submit(
                1000,
                WorkSource::single(1000),
                LivenessToken(1),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap(mac)],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (cmd_id, _request) = dispatched_rx.recv().await.unwrap();
        handle.notify_controller_result(cmd_id, vec![raw_success(mac)]);

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Results(results) => {
                assert_eq!(results.len(), 1);
                assert_eq!(results[0].status, RangingStatus::Success);
                assert_eq!(results[0].identity, Identity::Mac(mac));
                assert_eq!(results[0].distance_mm, 1_500);
            }
            CallbackEvent::Failure(_) => panic!("expected a successful result"),
        }
    }

    #[tokio::test]
    async fn submission_while_unavailable_fails_without_dispatch() {
        let (collaborators, _dispatched_rx, _liveness) = make_collaborators(true);
        let (handle, _availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                2000,
                WorkSource::single(2000),
                LivenessToken(2),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([9, 9, 9, 9, 9, 9])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::NotAvailable) => {}
            _ => panic!("expected NotAvailable failure"),
        }
    }

    #[tokio::test]
    async fn twenty_first_queued_submission_from_same_uid_is_rejected() {
        // A resolver that never answers pins the head in `AwaitingResolution` forever,
        // so 20 Aware-peer submissions from the same UID all stay queued at once —
        // exactly the state the per-UID spam check needs to observe.
        let (collaborators, dispatched_rx, _liveness) = make_collaborators_with_resolver(true, true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);
        drop(dispatched_rx);

        for i in 0..20i64 {
            let (cb_tx, _cb_rx) = mpsc::unbounded_channel();
            handle
                .submit(
                    3000,
                    WorkSource::single(3000),
                    LivenessToken(100 + i as u64),
                    "com.example".to_string(),
                    None,
                    RangingRequest {
                        responders: vec![Responder::aware_peer(i)],
                        rtt_burst_size: 8,
                    },
                    Arc::new(RecordingCallback(cb_tx)),
                    false,
                    None,
                )
                .unwrap();
        }

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                3000,
                WorkSource::single(3000),
                LivenessToken(999),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::aware_peer(999)],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::Generic) => {}
            _ => panic!("expected the 21st queued submission to be throttle-rejected"),
        }
    }

    #[tokio::test]
    async fn client_death_cancels_dispatched_head() {
        let (collaborators, mut dispatched_rx, liveness) = make_collaborators(true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        let token = LivenessToken(7);
        handle
            .submit(
                4000,
                WorkSource::single(4000),
                token,
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([7, 7, 7, 7, 7, 7])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (_cmd_id, _request) = dispatched_rx.recv().await.unwrap();
        liveness.kill(token);

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::Generic) => {}
            _ => panic!("expected a generic failure after client death"),
        }
    }

    #[tokio::test]
    async fn cancel_of_a_non_dispatched_request_is_silent() {
        // A pending resolver keeps the head in AwaitingResolution, so the second
        // submission from the same UID stays queued behind it, non-dispatched.
        let (collaborators, dispatched_rx, _liveness) =
            make_collaborators_with_resolver(true, true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);
        drop(dispatched_rx);

        let (head_tx, _head_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                5000,
                WorkSource::single(5000),
                LivenessToken(50),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::aware_peer(1)],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(head_tx)),
                false,
                None,
            )
            .unwrap();

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        let queued_source = WorkSource::single(5001);
        handle
            .submit(
                5001,
                queued_source.clone(),
                LivenessToken(51),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([5, 5, 5, 5, 5, 5])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        handle.cancel(queued_source);

        // The cancel is advisory on a non-dispatched entry: no callback fires. Give the
        // scheduler task a moment to process the command before asserting silence.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cb_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn cancel_of_a_dispatched_request_cancels_and_fails() {
        let (collaborators, mut dispatched_rx, _liveness) = make_collaborators(true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        let work_source = WorkSource::single(6000);
        handle
            .submit(
                6000,
                work_source.clone(),
                LivenessToken(60),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([6, 6, 6, 6, 6, 6])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (_cmd_id, _request) = dispatched_rx.recv().await.unwrap();
        handle.cancel(work_source);

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::Generic) => {}
            _ => panic!("expected a generic failure after cancelling a dispatched request"),
        }
    }

    #[tokio::test]
    async fn availability_loss_mid_dispatch_fails_with_not_available() {
        let (collaborators, mut dispatched_rx, _liveness) = make_collaborators(true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                7000,
                WorkSource::single(7000),
                LivenessToken(70),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([7, 0, 0, 0, 0, 0])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (_cmd_id, _request) = dispatched_rx.recv().await.unwrap();
        availability.note_controller_present(false);

        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::NotAvailable) => {}
            _ => panic!("expected NotAvailable failure once availability is lost mid-dispatch"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_aware_dispatch_times_out_at_the_hal_ranging_timeout() {
        let (collaborators, mut dispatched_rx, _liveness) = make_collaborators(true);
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                8000,
                WorkSource::single(8000),
                LivenessToken(80),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::ap([8, 0, 0, 0, 0, 0])],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (_cmd_id, _request) = dispatched_rx.recv().await.unwrap();

        tokio::time::advance(Duration::from_millis(HAL_RANGING_TIMEOUT_MS - 1)).await;
        assert!(cb_rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(2)).await;
        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::Generic) => {}
            _ => panic!("expected a timeout failure at the non-Aware HAL timeout"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn aware_dispatch_times_out_at_the_longer_aware_timeout() {
        // The mapping must actually resolve peer_handle=1, or `apply_resolution` drops
        // the only (Aware) responder and the dispatched request would be misclassified
        // as non-Aware, arming the shorter timeout instead of the one under test.
        let (collaborators, mut dispatched_rx, _liveness) = make_collaborators_with_resolver_mapping(
            true,
            false,
            vec![(1, vec![9, 0, 0, 0, 0, 0])],
        );
        let (handle, availability) =
            spawn(
                SchedulerConfig::default(),
                collaborators,
                AvailabilityMonitor::builder(),
                Arc::new(DebugParameters::default()),
            );
        availability.note_controller_present(true);
        availability.note_idle(false);
        availability.note_location_mode(true);

        let (cb_tx, mut cb_rx) = mpsc::unbounded_channel();
        handle
            .submit(
                9000,
                WorkSource::single(9000),
                LivenessToken(90),
                "com.example".to_string(),
                None,
                RangingRequest {
                    responders: vec![Responder::aware_peer(1)],
                    rtt_burst_size: 8,
                },
                Arc::new(RecordingCallback(cb_tx)),
                false,
                None,
            )
            .unwrap();

        let (_cmd_id, _request) = dispatched_rx.recv().await.unwrap();

        // Still short of the longer Aware timeout, well past the non-Aware one: must
        // not have fired yet.
        tokio::time::advance(Duration::from_millis(HAL_RANGING_TIMEOUT_MS + 500)).await;
        assert!(cb_rx.try_recv().is_err());

        tokio::time::advance(Duration::from_millis(
            HAL_AWARE_RANGING_TIMEOUT_MS - HAL_RANGING_TIMEOUT_MS - 500 + 1,
        ))
        .await;
        match cb_rx.recv().await.unwrap() {
            CallbackEvent::Failure(RangingFailure::Generic) => {}
            _ => panic!("expected a timeout failure at the Aware HAL timeout"),
        }
    }
}
