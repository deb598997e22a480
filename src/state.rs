use alloy::primitives::U256;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Process-wide mutable state shared by all agents. Lives for the whole
/// process and is never persisted; a restart starts from empty maps.
#[derive(Debug, Default)]
pub struct MonitorState {
    last_reported: Mutex<HashMap<String, u64>>,
    tracked_values: Mutex<HashMap<String, U256>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackedChange {
    /// First observation for the key, recorded as the baseline.
    Initialized,
    Increased { previous: U256 },
    Unchanged,
}

// A panic while holding the lock cannot leave the maps half-written (every
// critical section is a single insert/remove), so poisoning is ignored.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read-compare-write under one lock: returns true and records `now` when
    /// `key` was never reported or its last report is at least `cooldown`
    /// old. Concurrent callers for the same key cannot both win.
    pub fn try_claim_report(&self, key: &str, now: u64, cooldown: u64) -> bool {
        let mut reports = lock(&self.last_reported);
        let due = match reports.get(key) {
            Some(last) => now.saturating_sub(*last) >= cooldown,
            None => true,
        };
        if due {
            reports.insert(key.to_string(), now);
        }
        due
    }

    pub fn clear_report(&self, key: &str) {
        lock(&self.last_reported).remove(key);
    }

    pub fn last_reported(&self, key: &str) -> Option<u64> {
        lock(&self.last_reported).get(key).copied()
    }

    pub fn set_tracked(&self, key: &str, value: U256) {
        lock(&self.tracked_values).insert(key.to_string(), value);
    }

    pub fn tracked(&self, key: &str) -> Option<U256> {
        lock(&self.tracked_values).get(key).copied()
    }

    /// Raises the tracked value if `value` is strictly greater.
    pub fn raise_tracked(&self, key: &str, value: U256) -> TrackedChange {
        let mut values = lock(&self.tracked_values);
        match values.get(key).copied() {
            None => {
                values.insert(key.to_string(), value);
                TrackedChange::Initialized
            }
            Some(previous) if value > previous => {
                values.insert(key.to_string(), value);
                TrackedChange::Increased { previous }
            }
            Some(_) => TrackedChange::Unchanged,
        }
    }
}
