//! A small in-process event bus for observability.
//!
//! This module only emits events to in-process listeners; it never builds a sink of its
//! own. A binder-layer integrator wires a listener here to produce a system-wide
//! state-changed notification.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// An event emitted by some part of the ranging scheduler.
pub trait RangingEvent: Send + Sync + fmt::Debug {
    fn event_type(&self) -> &'static str;
    fn timestamp(&self) -> Instant;
}

/// Receives [`RangingEvent`]s.
pub trait EventListener<E: RangingEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

/// A collection of event listeners for one event type.
#[derive(Clone)]
pub struct EventListeners<E: RangingEvent> {
    listeners: Vec<Arc<dyn EventListener<E>>>,
}

impl<E: RangingEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    /// Emits `event` to every listener. A panicking listener is caught so it cannot take
    /// down the scheduler task or stop the remaining listeners from running.
    pub fn emit(&self, event: &E) {
        for listener in &self.listeners {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));

            if let Err(panic_payload) = result {
                #[cfg(feature = "tracing")]
                {
                    let panic_message = panic_payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "<non-string panic payload>".to_string());
                    tracing::warn!(
                        event_type = event.event_type(),
                        panic_message,
                        "ranging event listener panicked"
                    );
                }
                #[cfg(not(feature = "tracing"))]
                let _ = panic_payload;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E: RangingEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

/// A function-based listener, for tests and simple hooks.
pub struct FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    f: F,
    _phantom: std::marker::PhantomData<E>,
}

impl<E, F> FnListener<E, F>
where
    F: Fn(&E) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<E, F> EventListener<E> for FnListener<E, F>
where
    E: RangingEvent,
    F: Fn(&E) + Send + Sync,
{
    fn on_event(&self, event: &E) {
        (self.f)(event)
    }
}
