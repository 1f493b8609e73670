//! The public entry point into a running scheduler task. Cheaply `Clone`, a thin
//! wrapper around a channel sender plus a couple of fields callers need to answer
//! synchronously.

use std::sync::Arc;

use tokio::sync::mpsc;

use rtt_ranging_availability::AvailabilityMonitor;
use rtt_ranging_types::{
    Capabilities, DiscoveryResolver, LivenessToken, RangingCallback, RangingController,
    RangingRequest, RawRangingResult, SubmitError, Uid, WorkSource,
};

use crate::command::{Command, SubmitPayload};

#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::UnboundedSender<Command>,
    availability: Arc<AvailabilityMonitor>,
    controller: Arc<dyn RangingController>,
    resolver: Arc<dyn DiscoveryResolver>,
}

impl SchedulerHandle {
    pub(crate) fn new(
        sender: mpsc::UnboundedSender<Command>,
        availability: Arc<AvailabilityMonitor>,
        controller: Arc<dyn RangingController>,
        resolver: Arc<dyn DiscoveryResolver>,
    ) -> Self {
        Self {
            sender,
            availability,
            controller,
            resolver,
        }
    }

    /// Validates synchronously and rejects malformed requests immediately, then hands
    /// the rest of submission off to the scheduler context. A `¬available` rejection is
    /// deliberately *not* surfaced here — it is delivered asynchronously through
    /// `callback`.
    #[allow(clippy::too_many_arguments)]
    pub fn submit(
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
        if request.is_empty() {
            return Err(SubmitError::EmptyResponders);
        }
        if request.has_aware_responder() && !self.resolver.is_available() {
            return Err(SubmitError::AwareUnavailable);
        }

        let _ = self.sender.send(Command::Submit(Box::new(SubmitPayload {
            requester_uid,
            work_source,
            liveness_token,
            calling_package,
            calling_feature_id,
            request,
            callback,
            privileged,
            attribution_source,
        })));
        Ok(())
    }

    pub fn cancel(&self, work_source: WorkSource) {
        let _ = self.sender.send(Command::Cancel(work_source));
    }

    /// Called by the binder-layer integrator's death recipient.
    pub fn notify_client_death(&self, uid: Uid, liveness_token: LivenessToken) {
        let _ = self.sender.send(Command::ClientDeath { uid, liveness_token });
    }

    /// Called by the `RangingController` adapter when its async result channel fires.
    pub fn notify_controller_result(&self, cmd_id: u32, results: Vec<RawRangingResult>) {
        let _ = self.sender.send(Command::ControllerResult { cmd_id, results });
    }

    pub fn is_available(&self) -> bool {
        self.availability.is_available()
    }

    pub fn get_characteristics(&self) -> Capabilities {
        self.controller.get_capabilities()
    }
}
