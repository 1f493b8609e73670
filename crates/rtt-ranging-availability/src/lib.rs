//! Tracks whether ranging is currently available.
//!
//! `available = controller_present ∧ ¬device_idle ∧ location_mode_enabled`. Transitions
//! are idempotent and only fire an edge event when the computed value actually changes,
//! the same swap-and-compare shape used for windowed counters elsewhere in this
//! workspace.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rtt_ranging_types::events::{EventListeners, RangingEvent};

/// Which way availability just flipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityEdge {
    /// The core may now attempt to dispatch the head of the queue.
    Enabled,
    /// All queued work must be failed with not-available and the queue emptied.
    Disabled,
}

#[derive(Debug)]
pub struct AvailabilityEvent {
    pub edge: AvailabilityEdge,
    pub timestamp: Instant,
}

impl RangingEvent for AvailabilityEvent {
    fn event_type(&self) -> &'static str {
        match self.edge {
            AvailabilityEdge::Enabled => "availability_enabled",
            AvailabilityEdge::Disabled => "availability_disabled",
        }
    }

    fn timestamp(&self) -> Instant {
        self.timestamp
    }
}

/// Tracks the three availability inputs and exposes the derived boolean.
///
/// `is_available` is safe to call from any thread; the three `note_*` setters are
/// intended to be called only from the scheduler context, same as every other mutation
/// in this workspace.
pub struct AvailabilityMonitor {
    controller_present: AtomicBool,
    device_idle: AtomicBool,
    location_mode_enabled: AtomicBool,
    available: AtomicBool,
    listeners: EventListeners<AvailabilityEvent>,
}

impl AvailabilityMonitor {
    pub fn builder() -> AvailabilityMonitorBuilder {
        AvailabilityMonitorBuilder::new()
    }

    pub fn note_controller_present(&self, present: bool) {
        self.controller_present.store(present, Ordering::SeqCst);
        self.recompute();
    }

    pub fn note_idle(&self, is_idle: bool) {
        self.device_idle.store(is_idle, Ordering::SeqCst);
        self.recompute();
    }

    pub fn note_location_mode(&self, enabled: bool) {
        self.location_mode_enabled.store(enabled, Ordering::SeqCst);
        self.recompute();
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn recompute(&self) {
        let computed = self.controller_present.load(Ordering::SeqCst)
            && !self.device_idle.load(Ordering::SeqCst)
            && self.location_mode_enabled.load(Ordering::SeqCst);

        let previous = self.available.swap(computed, Ordering::SeqCst);
        if previous != computed {
            let edge = if computed {
                AvailabilityEdge::Enabled
            } else {
                AvailabilityEdge::Disabled
            };

            #[cfg(feature = "tracing")]
            tracing::debug!(?edge, "ranging availability changed");

            self.listeners.emit(&AvailabilityEvent {
                edge,
                timestamp: Instant::now(),
            });
        }
    }
}

pub struct AvailabilityMonitorBuilder {
    listeners: EventListeners<AvailabilityEvent>,
}

impl AvailabilityMonitorBuilder {
    pub fn new() -> Self {
        Self {
            listeners: EventListeners::new(),
        }
    }

    /// Registers a listener invoked on every availability edge.
    pub fn on_edge<F>(mut self, f: F) -> Self
    where
        F: Fn(&AvailabilityEvent) + Send + Sync + 'static,
    {
        self.listeners
            .add(rtt_ranging_types::events::FnListener::new(f));
        self
    }

    pub fn build(self) -> AvailabilityMonitor {
        AvailabilityMonitor {
            controller_present: AtomicBool::new(false),
            device_idle: AtomicBool::new(false),
            location_mode_enabled: AtomicBool::new(false),
            available: AtomicBool::new(false),
            listeners: self.listeners,
        }
    }
}

impl Default for AvailabilityMonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
