//! Scheduler configuration, built with the same `*ConfigBuilder` shape used throughout
//! this workspace.

use std::time::Duration;

use rtt_ranging_throttle::{ThrottleConfig, ThrottleConfigBuilder};

#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub throttle: ThrottleConfig,
    pub az_min_time_between_ntb_measurements_us: Option<u32>,
    pub az_max_time_between_ntb_measurements_us: Option<u32>,
}

impl SchedulerConfig {
    pub fn builder() -> SchedulerConfigBuilder {
        SchedulerConfigBuilder::default()
    }

    /// Reads the four overlay keys, documented as "read once at startup", from the
    /// process environment. Malformed or absent values fall back to defaults.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();

        if let Ok(raw) = std::env::var("RTT_RANGING_BACKGROUND_EXEC_GAP_MS") {
            if let Ok(ms) = raw.parse::<u64>() {
                builder = builder.background_exec_gap(Duration::from_millis(ms));
            }
        }
        if let Ok(raw) = std::env::var("RTT_RANGING_BACKGROUND_THROTTLE_EXCEPTION_LIST") {
            let packages = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            builder = builder.exempt_packages(packages);
        }
        if let Ok(raw) = std::env::var("RTT_RANGING_AZ_MIN_TIME_BETWEEN_NTB_MEASUREMENTS_US") {
            if let Ok(us) = raw.parse::<u32>() {
                builder = builder.az_min_time_between_ntb_measurements_us(us);
            }
        }
        if let Ok(raw) = std::env::var("RTT_RANGING_AZ_MAX_TIME_BETWEEN_NTB_MEASUREMENTS_US") {
            if let Ok(us) = raw.parse::<u32>() {
                builder = builder.az_max_time_between_ntb_measurements_us(us);
            }
        }

        builder.build()
    }
}

#[derive(Debug, Default)]
pub struct SchedulerConfigBuilder {
    throttle: ThrottleConfigBuilder,
    az_min: Option<u32>,
    az_max: Option<u32>,
}

impl SchedulerConfigBuilder {
    pub fn max_queued_per_uid(mut self, max: usize) -> Self {
        self.throttle = self.throttle.max_queued_per_uid(max);
        self
    }

    pub fn background_exec_gap(mut self, gap: Duration) -> Self {
        self.throttle = self.throttle.background_exec_gap(gap);
        self
    }

    pub fn exempt_packages(mut self, packages: Vec<String>) -> Self {
        self.throttle = self.throttle.exempt_packages(packages);
        self
    }

    pub fn az_min_time_between_ntb_measurements_us(mut self, us: u32) -> Self {
        self.az_min = Some(us);
        self
    }

    pub fn az_max_time_between_ntb_measurements_us(mut self, us: u32) -> Self {
        self.az_max = Some(us);
        self
    }

    pub fn build(self) -> SchedulerConfig {
        SchedulerConfig {
            throttle: self.throttle.build(),
            az_min_time_between_ntb_measurements_us: self.az_min,
            az_max_time_between_ntb_measurements_us: self.az_max,
        }
    }
}
