//! Configuration-overlay overrides applied to a request before dispatch:
//! `az_min_time_between_ntb_measurements_us` / `az_max_time_between_ntb_measurements_us`.

use rtt_ranging_types::RangingRequest;

use crate::config::SchedulerConfig;

/// Forces every 11az-capable responder's inter-measurement window inside the configured
/// bounds. A responder that already requests a narrower window than the floor, or a
/// wider one than the ceiling, is clamped; responders that don't support 11az are
/// untouched.
pub fn apply_az_overrides(request: &mut RangingRequest, config: &SchedulerConfig) {
    for responder in request.responders.iter_mut().filter(|r| r.supports_11az) {
        if let Some(min) = config.az_min_time_between_ntb_measurements_us {
            let current = responder.az_min_time_between_ntb_measurements_us.unwrap_or(0);
            if current < min {
                responder.az_min_time_between_ntb_measurements_us = Some(min);
            }
        }
        if let Some(max) = config.az_max_time_between_ntb_measurements_us {
            let current = responder
                .az_max_time_between_ntb_measurements_us
                .unwrap_or(u32::MAX);
            if current > max {
                responder.az_max_time_between_ntb_measurements_us = Some(max);
            }
        }
    }
}
