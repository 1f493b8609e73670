//! Two independent throttling predicates, evaluated at submission and at dispatch.

use std::collections::HashMap;
use std::time::Duration;

use rtt_ranging_types::{Clock, PermissionOracle, RequesterRecord, Uid, WorkSource};

#[cfg(feature = "metrics")]
use metrics::counter;

/// Fixed cap on how many queued `RequestInfo`s a single UID may own at once.
pub const MAX_QUEUED_PER_UID: usize = 20;

/// Tunables for [`ThrottlePolicy`].
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub max_queued_per_uid: usize,
    /// Minimum gap between successive dispatches for an all-background work source.
    pub background_exec_gap: Duration,
    /// Package names exempt from the background gap.
    pub exempt_packages: Vec<String>,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_queued_per_uid: MAX_QUEUED_PER_UID,
            background_exec_gap: Duration::from_millis(0),
            exempt_packages: Vec::new(),
        }
    }
}

impl ThrottleConfig {
    pub fn builder() -> ThrottleConfigBuilder {
        ThrottleConfigBuilder::default()
    }
}

#[derive(Debug, Default)]
pub struct ThrottleConfigBuilder {
    config: ThrottleConfig,
}

impl ThrottleConfigBuilder {
    pub fn max_queued_per_uid(mut self, max: usize) -> Self {
        self.config.max_queued_per_uid = max;
        self
    }

    pub fn background_exec_gap(mut self, gap: Duration) -> Self {
        self.config.background_exec_gap = gap;
        self
    }

    pub fn exempt_packages(mut self, packages: Vec<String>) -> Self {
        self.config.exempt_packages = packages;
        self
    }

    pub fn build(self) -> ThrottleConfig {
        self.config
    }
}

/// Per-UID last-dispatch bookkeeping plus the two throttle predicates.
///
/// Owned exclusively by the scheduler context — no internal locking, same discipline
/// every other mutable piece of core state in this workspace follows.
pub struct ThrottlePolicy {
    config: ThrottleConfig,
    records: HashMap<Uid, RequesterRecord>,
}

impl ThrottlePolicy {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            records: HashMap::new(),
        }
    }

    /// Submission-time spam check: reject only if *every* UID in `work_source` already
    /// has `count >= max_queued_per_uid` queued entries.
    pub fn allows_submission<'a, I>(&self, work_source: &WorkSource, queued: I) -> bool
    where
        I: IntoIterator<Item = &'a WorkSource>,
    {
        let queued: Vec<&WorkSource> = queued.into_iter().collect();
        let accepted = work_source.all_uids().any(|uid| {
            let count = queued
                .iter()
                .filter(|queued_source| queued_source.all_uids().any(|u| u == uid))
                .count();
            count < self.config.max_queued_per_uid
        });

        #[cfg(feature = "metrics")]
        counter!(
            "rtt_ranging_throttle_submissions_total",
            "outcome" => if accepted { "accepted" } else { "rejected" }
        )
        .increment(1);

        if !accepted {
            #[cfg(feature = "tracing")]
            tracing::debug!(?work_source, "submission rejected: per-UID queue cap reached");
        }

        accepted
    }

    /// Dispatch-time background gap check. On permit, updates every named UID's
    /// `last_execution` to `now`.
    pub fn allows_dispatch(
        &mut self,
        clock: &dyn Clock,
        work_source: &WorkSource,
        calling_package: &str,
        permission_oracle: &dyn PermissionOracle,
    ) -> bool {
        if work_source.all_uids().any(|uid| permission_oracle.is_foreground(uid)) {
            return true;
        }

        if self
            .config
            .exempt_packages
            .iter()
            .any(|pkg| pkg == calling_package)
        {
            return true;
        }

        let now = clock.now();
        let gap = self.config.background_exec_gap;
        let permitted = work_source.all_uids().any(|uid| match self.records.get(&uid) {
            None => true,
            Some(record) => now.duration_since(record.last_execution) >= gap,
        });

        if permitted {
            for uid in work_source.all_uids() {
                self.records.insert(uid, RequesterRecord { last_execution: now });
            }
        } else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                ?work_source,
                "dispatch rejected: background execution gap not elapsed"
            );
        }

        #[cfg(feature = "metrics")]
        counter!(
            "rtt_ranging_throttle_dispatches_total",
            "outcome" => if permitted { "permitted" } else { "rejected" }
        )
        .increment(1);

        permitted
    }
}
