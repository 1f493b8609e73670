//! Error taxonomy delivered on a request's callback.
//!
//! One flat enum so callers never have to write `From` glue between the scheduler, the
//! throttle policy, and the resolver. There is no `Application(E)` leaf: every terminal
//! outcome here really is one of these three kinds.

/// The status code delivered on a request's callback. Exactly one of a success result
/// list or one of these is ever delivered per accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RangingFailure {
    /// `¬available` at submission or during dispatch.
    #[error("ranging is not available")]
    NotAvailable,
    /// Throttle rejection, timeout, client death mid-execution, HAL synchronous
    /// refusal, or resolver failure on the second attempt.
    #[error("ranging request failed")]
    Generic,
    /// Location permission was revoked between submission and result.
    #[error("location permission is missing")]
    LocationPermissionMissing,
}

/// Synchronous, validation-class rejection of a `submit` call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("ranging request has no responders")]
    EmptyResponders,
    #[error("an Aware peer responder was requested but the discovery subsystem is unavailable")]
    AwareUnavailable,
}
