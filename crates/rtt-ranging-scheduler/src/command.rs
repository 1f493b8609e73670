//! Messages trampolined onto the scheduler context.
//!
//! Every external input — a client call, a Controller result, a resolver callback, a
//! timer fire, an availability edge — arrives as one of these variants instead of a
//! direct method call, so the engine never needs a back-pointer to whoever sent it.

use std::sync::Arc;

use rtt_ranging_types::{
    LivenessToken, RangingCallback, RangingRequest, RawRangingResult, Uid, WorkSource,
};

/// Everything `submit` needs, already validated synchronously by [`crate::SchedulerHandle`].
pub struct SubmitPayload {
    pub requester_uid: Uid,
    pub work_source: WorkSource,
    pub liveness_token: LivenessToken,
    pub calling_package: String,
    pub calling_feature_id: Option<String>,
    pub request: RangingRequest,
    pub callback: Arc<dyn RangingCallback>,
    pub privileged: bool,
    pub attribution_source: Option<String>,
}

pub enum Command {
    Submit(Box<SubmitPayload>),
    Cancel(WorkSource),
    ClientDeath {
        uid: Uid,
        liveness_token: LivenessToken,
    },
    ControllerResult {
        cmd_id: u32,
        results: Vec<RawRangingResult>,
    },
    ResolverResult {
        resolution_id: u64,
        mapping: Vec<(i64, Vec<u8>)>,
    },
    Timeout {
        cmd_id: u32,
    },
    AvailabilityChanged(bool),
}
