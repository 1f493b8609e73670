//! Request queue: FIFO of pending `RequestInfo`, head-only dispatch.
//!
//! Owned exclusively by the [`crate::engine::Engine`]; nothing outside the scheduler
//! context ever touches this directly.

use std::collections::VecDeque;

use rtt_ranging_types::{RequestInfo, Uid, WorkSource};

#[derive(Default)]
pub struct RequestQueue {
    entries: VecDeque<RequestInfo>,
}

impl RequestQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn push_back(&mut self, entry: RequestInfo) {
        self.entries.push_back(entry);
    }

    pub fn head(&self) -> Option<&RequestInfo> {
        self.entries.front()
    }

    pub fn head_mut(&mut self) -> Option<&mut RequestInfo> {
        self.entries.front_mut()
    }

    pub fn pop_head(&mut self) -> Option<RequestInfo> {
        self.entries.pop_front()
    }

    pub fn work_sources(&self) -> impl Iterator<Item = &WorkSource> {
        self.entries.iter().map(|entry| &entry.work_source)
    }

    /// Current queue depth, reported as a gauge under the `metrics` feature.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `cancel(work_source)`: removes entries whose work-source, after subtracting
    /// `work_source`, is empty. Surviving entries keep the subtracted (smaller)
    /// work-source, so a later cancel by the remainder also tears them down.
    pub fn cancel_subtract(&mut self, work_source: &WorkSource) -> Vec<RequestInfo> {
        let previous = std::mem::take(&mut self.entries);
        let mut removed = Vec::new();
        for mut entry in previous {
            let remaining = entry.work_source.subtract(work_source);
            if remaining.is_empty() {
                removed.push(entry);
            } else {
                entry.work_source = remaining;
                self.entries.push_back(entry);
            }
        }
        removed
    }

    /// `on_client_death`: every non-dispatched entry submitted by `uid` is torn down.
    pub fn remove_non_dispatched_by_requester(&mut self, uid: Uid) -> Vec<RequestInfo> {
        let previous = std::mem::take(&mut self.entries);
        let mut removed = Vec::new();
        for entry in previous {
            if !entry.dispatched && entry.requester_uid == uid {
                removed.push(entry);
            } else {
                self.entries.push_back(entry);
            }
        }
        removed
    }

    /// `on_availability_change(false)`: the whole queue is abandoned.
    pub fn clear(&mut self) -> Vec<RequestInfo> {
        self.entries.drain(..).collect()
    }
}
