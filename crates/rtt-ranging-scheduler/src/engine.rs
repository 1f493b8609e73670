//! Request lifecycle engine: the only mutator of the queue and of the Controller slot.
//! Runs as a dedicated `tokio` task; every method here executes on that one execution
//! context, so nothing in this file needs a lock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

use rtt_ranging_availability::AvailabilityMonitor;
use rtt_ranging_resolver::ResolveOutcome;
use rtt_ranging_throttle::ThrottlePolicy;
use rtt_ranging_types::{
    DebugParameters, LivenessToken, RangingFailure, RangingRequest, RawRangingResult, RequestInfo,
    ResponderKind, Uid,
};

use crate::collaborators::Collaborators;
use crate::command::Command;
use crate::config::SchedulerConfig;
use crate::credential::fill_passphrase;
use crate::overlay::apply_az_overrides;
use crate::queue::RequestQueue;
use crate::timer::{TimeoutTimer, HAL_AWARE_RANGING_TIMEOUT_MS, HAL_RANGING_TIMEOUT_MS};

pub struct Engine {
    config: SchedulerConfig,
    collaborators: Collaborators,
    availability: Arc<AvailabilityMonitor>,
    queue: RequestQueue,
    throttle: ThrottlePolicy,
    timer: TimeoutTimer,
    next_cmd_id: u32,
    next_resolution_id: u64,
    /// `Some` exactly while a [`ResolveOutcome::Deferred`] future is outstanding for the
    /// current head. Distinct from `RequestInfo::handles_translated`, which instead
    /// guards `resolve_if_needed`'s one-shot retry (see DESIGN.md).
    pending_resolution: Option<u64>,
    debug: Arc<DebugParameters>,
    sender: mpsc::UnboundedSender<Command>,
}

impl Engine {
    pub fn new(
        config: SchedulerConfig,
        collaborators: Collaborators,
        availability: Arc<AvailabilityMonitor>,
        debug: Arc<DebugParameters>,
        sender: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            throttle: ThrottlePolicy::new(config.throttle.clone()),
            config,
            collaborators,
            availability,
            queue: RequestQueue::new(),
            timer: TimeoutTimer::new(),
            next_cmd_id: 1,
            next_resolution_id: 0,
            pending_resolution: None,
            debug,
            sender,
        }
    }

    pub async fn run(mut self, mut receiver: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = receiver.recv().await {
            match command {
                Command::Submit(payload) => self.handle_submit(*payload).await,
                Command::Cancel(work_source) => self.handle_cancel(work_source).await,
                Command::ClientDeath { uid, liveness_token } => {
                    self.handle_client_death(uid, liveness_token).await
                }
                Command::ControllerResult { cmd_id, results } => {
                    self.handle_controller_result(cmd_id, results).await
                }
                Command::ResolverResult {
                    resolution_id,
                    mapping,
                } => self.handle_resolver_result(resolution_id, mapping).await,
                Command::Timeout { cmd_id } => self.handle_timeout(cmd_id).await,
                Command::AvailabilityChanged(available) => {
                    self.handle_availability_changed(available).await
                }
            }
        }
    }

    async fn handle_submit(&mut self, payload: crate::command::SubmitPayload) {
        let crate::command::SubmitPayload {
            requester_uid,
            work_source,
            liveness_token,
            calling_package,
            calling_feature_id,
            mut request,
            callback,
            privileged,
            attribution_source,
        } = payload;

        // Non-emptiness and Aware-without-discovery were already validated
        // synchronously by `SchedulerHandle::submit`; Rust's type system makes "every
        // responder is non-null" a tautology, so there is nothing left to check here.

        self.subscribe_liveness(requester_uid, liveness_token);

        if !self.availability.is_available() {
            self.collaborators.liveness.unsubscribe(liveness_token);
            #[cfg(feature = "metrics")]
            counter!("rtt_ranging_scheduler_submissions_rejected_total").increment(1);
            callback.on_failure(RangingFailure::NotAvailable);
            return;
        }

        apply_az_overrides(&mut request, &self.config);
        fill_passphrase(&mut request, self.collaborators.credentials.as_ref());

        let queued: Vec<_> = self.queue.work_sources().cloned().collect();
        if !self.throttle.allows_submission(&work_source, queued.iter()) {
            self.collaborators.liveness.unsubscribe(liveness_token);
            #[cfg(feature = "metrics")]
            counter!("rtt_ranging_scheduler_submissions_rejected_total").increment(1);
            callback.on_failure(RangingFailure::Generic);
            return;
        }

        self.queue.push_back(RequestInfo {
            requester_uid,
            work_source,
            liveness_token,
            calling_package,
            calling_feature_id,
            request,
            callback,
            privileged,
            attribution_source,
            cmd_id: 0,
            dispatched: false,
            handles_translated: false,
        });
        self.record_queue_depth();
        #[cfg(feature = "metrics")]
        counter!("rtt_ranging_scheduler_submissions_accepted_total").increment(1);

        self.dispatch().await;
    }

    async fn handle_cancel(&mut self, work_source: rtt_ranging_types::WorkSource) {
        let removed = self.queue.cancel_subtract(&work_source);
        self.record_queue_depth();
        let mut dispatched_head_removed = false;
        let mut resolving_head_removed = false;

        for entry in removed {
            self.collaborators.liveness.unsubscribe(entry.liveness_token);
            if entry.dispatched {
                dispatched_head_removed = true;
                self.collaborators
                    .controller
                    .range_cancel(entry.cmd_id, responder_macs(&entry.request));
                entry.callback.on_failure(RangingFailure::Generic);
            } else if entry.handles_translated {
                // Only the head is ever mid-resolution (`handles_translated` is set by
                // `dispatch()` exclusively on the head); removing it must release the
                // `pending_resolution` guard or a stale resolver callback would later
                // apply its mapping to whatever unrelated request is then at the head.
                // Removed silently, same as any other non-dispatched entry: cancel is
                // advisory.
                resolving_head_removed = true;
            }
            // Non-dispatched, non-resolving entries are removed silently: cancel is advisory.
        }

        if dispatched_head_removed || resolving_head_removed {
            self.timer.cancel();
            self.pending_resolution = None;
            self.dispatch().await;
        }
    }

    async fn handle_client_death(&mut self, uid: Uid, _liveness_token: LivenessToken) {
        // `remove_non_dispatched_by_requester` also sweeps up a head that is mid-resolution
        // (non-dispatched, `handles_translated = true`) — note that *before* removing it,
        // since afterward it is simply gone from the queue and `self.queue.head()` would
        // observe whatever comes next instead.
        let resolving_head_removed = matches!(
            self.queue.head(),
            Some(h) if !h.dispatched && h.handles_translated && h.requester_uid == uid
        );

        let removed = self.queue.remove_non_dispatched_by_requester(uid);
        self.record_queue_depth();
        for entry in removed {
            self.collaborators.liveness.unsubscribe(entry.liveness_token);
        }
        // Removed non-dispatched entries (including a resolving head) get no callback:
        // client death is equivalent to an advisory cancel for everything that wasn't
        // already dispatched.

        let head_owned_and_dispatched =
            matches!(self.queue.head(), Some(h) if h.dispatched && h.requester_uid == uid);

        if head_owned_and_dispatched {
            self.timer.cancel();
            if let Some(head) = self.pop_and_unsubscribe() {
                self.collaborators
                    .controller
                    .range_cancel(head.cmd_id, responder_macs(&head.request));
                head.callback.on_failure(RangingFailure::Generic);
            }
            self.dispatch().await;
        } else if resolving_head_removed {
            // Same stale-`pending_resolution` hazard as `handle_cancel`: the head was
            // awaiting a resolver callback, not a Controller result, but removing it
            // still has to release the guard so the queue isn't stalled forever.
            self.pending_resolution = None;
            self.dispatch().await;
        }
    }

    async fn handle_controller_result(&mut self, cmd_id: u32, results: Vec<RawRangingResult>) {
        let is_head_result = matches!(self.queue.head(), Some(h) if h.dispatched && h.cmd_id == cmd_id);
        if !is_head_result {
            #[cfg(feature = "tracing")]
            tracing::debug!(cmd_id, "stale controller result dropped");
            return;
        }

        self.timer.cancel();
        let Some(head) = self.pop_and_unsubscribe() else {
            return;
        };

        let permission_ok = if is_aware_only(&head.request) {
            self.collaborators.permissions.has_location_permission(head.requester_uid)
                || self
                    .collaborators
                    .permissions
                    .has_nearby_devices_permission(head.requester_uid)
        } else {
            self.collaborators.permissions.has_location_permission(head.requester_uid)
        };

        if permission_ok {
            let privileged = head.privileged && !self.debug.assume_no_privilege();
            let mapped = rtt_ranging_postprocess::build_results(&head.request, &results, privileged);
            head.callback.on_results(mapped);
        } else {
            head.callback.on_failure(RangingFailure::LocationPermissionMissing);
        }

        self.dispatch().await;
    }

    async fn handle_resolver_result(&mut self, resolution_id: u64, mapping: Vec<(i64, Vec<u8>)>) {
        if self.pending_resolution != Some(resolution_id) {
            #[cfg(feature = "tracing")]
            tracing::debug!(resolution_id, "stale resolver result dropped");
            return;
        }
        self.pending_resolution = None;

        if let Some(head) = self.queue.head_mut() {
            rtt_ranging_resolver::apply_resolution(&mut head.request, mapping);
        }

        self.dispatch().await;
    }

    async fn handle_timeout(&mut self, cmd_id: u32) {
        let is_head_timeout = matches!(self.queue.head(), Some(h) if h.dispatched && h.cmd_id == cmd_id);
        if !is_head_timeout {
            #[cfg(feature = "tracing")]
            tracing::debug!(cmd_id, "stale timeout ignored");
            return;
        }

        #[cfg(feature = "metrics")]
        counter!("rtt_ranging_scheduler_timeouts_total").increment(1);

        if let Some(head) = self.pop_and_unsubscribe() {
            self.collaborators
                .controller
                .range_cancel(head.cmd_id, responder_macs(&head.request));
            head.callback.on_failure(RangingFailure::Generic);
        }

        self.dispatch().await;
    }

    async fn handle_availability_changed(&mut self, available: bool) {
        if available {
            self.dispatch().await;
            return;
        }

        self.timer.cancel();
        self.pending_resolution = None;

        let cleared = self.queue.clear();
        self.record_queue_depth();
        for entry in cleared {
            if entry.dispatched {
                self.collaborators
                    .controller
                    .range_cancel(entry.cmd_id, responder_macs(&entry.request));
            }
            self.collaborators.liveness.unsubscribe(entry.liveness_token);
            entry.callback.on_failure(RangingFailure::NotAvailable);
        }
    }

    /// Dispatch procedure, written as a loop instead of a "set pop, recurse" so the
    /// borrow on `self.queue`'s head never outlives a single iteration.
    async fn dispatch(&mut self) {
        loop {
            if self.pending_resolution.is_some() {
                return;
            }

            let (uid, dispatched, handles_translated) = match self.queue.head() {
                Some(head) => (head.requester_uid, head.dispatched, head.handles_translated),
                None => return,
            };

            if dispatched {
                return;
            }

            if !self.availability.is_available() {
                self.fail_head(RangingFailure::NotAvailable);
                continue;
            }

            let (outcome, translated) = {
                let head = self.queue.head().expect("head checked above");
                rtt_ranging_resolver::resolve_if_needed(
                    uid,
                    &head.request,
                    handles_translated,
                    self.collaborators.resolver.as_ref(),
                )
            };
            if let Some(head) = self.queue.head_mut() {
                head.handles_translated = translated;
            }

            match outcome {
                ResolveOutcome::Deferred(future) => {
                    let resolution_id = self.next_resolution_id;
                    self.next_resolution_id += 1;
                    self.pending_resolution = Some(resolution_id);

                    let sender = self.sender.clone();
                    tokio::spawn(async move {
                        let mapping = future.await;
                        let _ = sender.send(Command::ResolverResult {
                            resolution_id,
                            mapping,
                        });
                    });
                    return;
                }
                ResolveOutcome::Failed => {
                    self.fail_head(RangingFailure::Generic);
                    continue;
                }
                ResolveOutcome::Ready => {}
            }

            let permitted = {
                let head = self.queue.head().expect("head checked above");
                self.throttle.allows_dispatch(
                    self.collaborators.clock.as_ref(),
                    &head.work_source,
                    &head.calling_package,
                    self.collaborators.permissions.as_ref(),
                )
            };
            if !permitted {
                self.fail_head(RangingFailure::Generic);
                continue;
            }

            let cmd_id = self.next_cmd_id;
            self.next_cmd_id += 1;

            let accepted = {
                let head = self.queue.head_mut().expect("head checked above");
                head.cmd_id = cmd_id;
                self.collaborators.controller.range_request(cmd_id, &head.request)
            };
            if !accepted {
                self.fail_head(RangingFailure::Generic);
                continue;
            }

            let has_aware = self
                .queue
                .head()
                .expect("head checked above")
                .request
                .has_aware_responder();
            let timeout_ms = if has_aware {
                HAL_AWARE_RANGING_TIMEOUT_MS
            } else {
                HAL_RANGING_TIMEOUT_MS
            };

            if let Some(head) = self.queue.head_mut() {
                head.dispatched = true;
            }
            self.timer
                .arm(Duration::from_millis(timeout_ms), cmd_id, self.sender.clone());

            #[cfg(feature = "metrics")]
            counter!("rtt_ranging_scheduler_dispatches_total").increment(1);

            return;
        }
    }

    /// Reports current queue depth as a gauge. Called after every queue mutation.
    fn record_queue_depth(&self) {
        #[cfg(feature = "metrics")]
        gauge!("rtt_ranging_scheduler_queue_depth").set(self.queue.len() as f64);
    }

    fn subscribe_liveness(&self, uid: Uid, token: LivenessToken) {
        let future = self.collaborators.liveness.subscribe(token);
        let sender = self.sender.clone();
        tokio::spawn(async move {
            future.await;
            let _ = sender.send(Command::ClientDeath {
                uid,
                liveness_token: token,
            });
        });
    }

    fn pop_and_unsubscribe(&mut self) -> Option<RequestInfo> {
        let head = self.queue.pop_head()?;
        self.record_queue_depth();
        self.collaborators.liveness.unsubscribe(head.liveness_token);
        Some(head)
    }

    fn fail_head(&mut self, failure: RangingFailure) {
        if let Some(head) = self.pop_and_unsubscribe() {
            head.callback.on_failure(failure);
        }
    }
}

fn responder_macs(request: &RangingRequest) -> Vec<[u8; 6]> {
    request.responders.iter().filter_map(|r| r.mac).collect()
}

fn is_aware_only(request: &RangingRequest) -> bool {
    request.responders.iter().all(|r| r.kind == ResponderKind::Aware)
}
