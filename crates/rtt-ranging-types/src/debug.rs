//! Debug shell parameter store: a side-channel command handler that mutates a small
//! `<name, int>` parameter map read by the scheduler on the fast path, and must never
//! mutate queue state — a runtime switch an operator can flip without going through the
//! request path.

use std::collections::HashMap;
use std::sync::Mutex;

/// The one switch callers are expected to flip directly by name.
pub const OVERRIDE_ASSUME_NO_PRIVILEGE: &str = "override-assume-no-privilege";

/// A `<name, int>` parameter map, mutated by `reset`/`get`/`set` and read directly by
/// the fast path. Never touches queue state.
#[derive(Debug, Default)]
pub struct DebugParameters {
    values: Mutex<HashMap<String, i64>>,
}

impl DebugParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.values.lock().unwrap().get(name).copied()
    }

    pub fn set(&self, name: &str, value: i64) {
        self.values.lock().unwrap().insert(name.to_string(), value);
        #[cfg(feature = "tracing")]
        tracing::info!(name, value, "debug shell parameter set");
    }

    /// Clears every parameter back to its unset (default) state.
    pub fn reset(&self) {
        self.values.lock().unwrap().clear();
    }

    /// Convenience read of [`OVERRIDE_ASSUME_NO_PRIVILEGE`]: unset or zero means "off".
    pub fn assume_no_privilege(&self) -> bool {
        self.get(OVERRIDE_ASSUME_NO_PRIVILEGE).unwrap_or(0) != 0
    }
}
