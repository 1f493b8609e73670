//! Peer Handle Resolver.
//!
//! Replaces peer-handle-only responders with MAC-carrying ones before dispatch,
//! deferring to the Discovery Resolver exactly once per request.

use std::collections::HashMap;

use futures::future::BoxFuture;
use rtt_ranging_types::{DiscoveryResolver, RangingRequest, Uid};

/// The three outcomes `resolve_if_needed` can produce.
pub enum ResolveOutcome {
    /// Nothing needed resolving; dispatch may proceed immediately.
    Ready,
    /// A resolution request is in flight. The caller should await this future, then
    /// feed the result to [`apply_resolution`] and re-attempt dispatch.
    Deferred(BoxFuture<'static, Vec<(i64, Vec<u8>)>>),
    /// A second pass still found unresolved handles: abort with a generic failure.
    Failed,
}

/// Starts (or skips) resolution for `request`.
///
/// `handles_translated` is `RequestInfo::handles_translated`: the caller is expected to
/// persist it back onto the owning `RequestInfo` after this call, since this function
/// only inspects and flips a local copy.
pub fn resolve_if_needed(
    uid: Uid,
    request: &RangingRequest,
    handles_translated: bool,
    resolver: &dyn DiscoveryResolver,
) -> (ResolveOutcome, bool) {
    let peer_ids: Vec<i64> = request
        .responders
        .iter()
        .filter(|r| r.needs_resolution())
        .filter_map(|r| r.peer_handle)
        .collect();

    if peer_ids.is_empty() {
        return (ResolveOutcome::Ready, handles_translated);
    }

    if handles_translated {
        #[cfg(feature = "tracing")]
        tracing::debug!(uid, "peer handle resolution failed on second pass");
        return (ResolveOutcome::Failed, handles_translated);
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(uid, count = peer_ids.len(), "deferring to discovery resolver");

    let future = resolver.request_mac_addresses(uid, peer_ids);
    (ResolveOutcome::Deferred(future), true)
}

/// Rebuilds a request's responder list from a resolver mapping callback: substitutes the MAC when it is exactly 6 bytes, drops the responder
/// otherwise. Responders without a handle, or that already carry a MAC, pass through
/// unchanged. Burst size is preserved.
pub fn apply_resolution(request: &mut RangingRequest, mapping: Vec<(i64, Vec<u8>)>) {
    let mac_by_handle: HashMap<i64, [u8; 6]> = mapping
        .into_iter()
        .filter_map(|(handle, bytes)| {
            <[u8; 6]>::try_from(bytes.as_slice()).ok().map(|mac| (handle, mac))
        })
        .collect();

    request.responders.retain_mut(|responder| {
        let Some(handle) = responder.peer_handle else {
            return true;
        };
        if responder.mac.is_some() {
            return true;
        }
        match mac_by_handle.get(&handle) {
            Some(mac) => {
                responder.mac = Some(*mac);
                true
            }
            None => false,
        }
    });
}
