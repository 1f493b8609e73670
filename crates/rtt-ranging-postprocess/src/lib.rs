//! Result Post-processor.
//!
//! Pairs Controller results with the original request, fills in failures for missing
//! peers, strips location-sensitive fields from unprivileged callers, and substitutes
//! peer handles back for MAC addresses on the return path.

use std::collections::HashMap;

use rtt_ranging_types::{Identity, RangingRequest, RangingResult, RangingStatus, RawRangingResult};

/// Builds the client-facing result list, one entry per responder, in request order.
pub fn build_results(
    request: &RangingRequest,
    raw_results: &[RawRangingResult],
    privileged: bool,
) -> Vec<RangingResult> {
    let by_mac: HashMap<[u8; 6], &RawRangingResult> =
        raw_results.iter().map(|r| (r.mac, r)).collect();

    request
        .responders
        .iter()
        .map(|responder| {
            let identity = responder.outbound_identity().unwrap_or(Identity::Mac([0; 6]));

            let raw = responder.mac.and_then(|mac| by_mac.get(&mac).copied());

            match raw {
                Some(raw) if raw.status == RangingStatus::Success => {
                    build_success(identity, raw, privileged)
                }
                _ => RangingResult::failure(identity),
            }
        })
        .collect()
}

fn build_success(identity: Identity, raw: &RawRangingResult, privileged: bool) -> RangingResult {
    let location_parsed = raw.responder_location.is_some();
    let location_visible = privileged && location_parsed;

    RangingResult {
        identity,
        status: RangingStatus::Success,
        distance_mm: raw.distance_mm,
        std_dev_mm: raw.std_dev_mm,
        rssi: raw.rssi,
        attempted_measurements: raw.attempted_measurements,
        successful_measurements: raw.successful_measurements,
        timestamp: raw.timestamp,
        channel: raw.channel,
        supports_11mc: raw.supports_11mc,
        supports_11az: raw.supports_11az,
        az_ltf_repetition_count: raw.az_ltf_repetition_count,
        az_min_time_between_ntb_measurements_us: raw.az_min_time_between_ntb_measurements_us,
        az_max_time_between_ntb_measurements_us: raw.az_max_time_between_ntb_measurements_us,
        spatial_stream_count: raw.spatial_stream_count,
        secure_outcome: raw.secure_outcome.clone(),
        lci: location_visible.then(|| raw.lci.clone()).flatten(),
        lcr: location_visible.then(|| raw.lcr.clone()).flatten(),
        responder_location: location_visible.then(|| raw.responder_location.clone()).flatten(),
    }
}
