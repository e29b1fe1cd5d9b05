//! A single named monotonic counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Check a name against the exposition naming rule: ASCII letters, digits
/// and underscores, not starting with a digit.
pub fn is_valid_metric_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// A named counter whose value only goes up.
#[derive(Debug)]
pub struct Counter {
    help: String,
    value: AtomicU64,
}

impl Counter {
    /// Create a counter at zero with help text derived from its name.
    pub fn new(name: &str) -> Self {
        Self {
            help: format!("Counter metric for {}", name),
            value: AtomicU64::new(0),
        }
    }

    /// Help text fixed at creation.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Add `amount`, returning the new value, or `None` if the sum would
    /// overflow. On overflow the value is left untouched.
    pub fn inc_by(&self, amount: u64) -> Option<u64> {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |v| v.checked_add(amount))
            .ok()
            .map(|prev| prev + amount)
    }
}

/// Point-in-time view of one counter, as taken by a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterSample {
    pub name: String,
    pub help: String,
    pub value: u64,
}
