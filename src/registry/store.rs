//! Concurrent name -> counter map.

use crate::registry::counter::{Counter, CounterSample, is_valid_metric_name};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use thiserror::Error;
use tracing::debug;

/// Errors returned by registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("invalid metric name '{0}': must match [a-zA-Z_][a-zA-Z0-9_]*")]
    InvalidName(String),

    #[error("incrementing '{name}' by {amount} would overflow the counter")]
    Overflow { name: String, amount: u64 },
}

/// Outcome of a successful increment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Increment {
    /// Amount that was added.
    pub amount: u64,
    /// Counter value after the increment.
    pub value: u64,
    /// Whether this increment created the counter.
    pub created: bool,
}

/// Registry owning every counter in the process.
///
/// Lookups and updates on distinct names proceed in parallel; the map is
/// sharded and each counter value is atomic.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<String, Counter>,
}

impl CounterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` to the counter `name`, creating it at zero first if it
    /// does not exist yet.
    pub fn increment(&self, name: &str, amount: u64) -> Result<Increment, RegistryError> {
        if !is_valid_metric_name(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }

        let overflow = || RegistryError::Overflow {
            name: name.to_string(),
            amount,
        };

        // Fast path: existing counter, shard read lock only.
        if let Some(counter) = self.counters.get(name) {
            let value = counter.inc_by(amount).ok_or_else(overflow)?;
            return Ok(Increment {
                amount,
                value,
                created: false,
            });
        }

        // The entry guard holds the shard write lock, so creation and the
        // first increment cannot interleave with another first use.
        match self.counters.entry(name.to_string()) {
            Entry::Occupied(entry) => {
                let value = entry.get().inc_by(amount).ok_or_else(overflow)?;
                Ok(Increment {
                    amount,
                    value,
                    created: false,
                })
            }
            Entry::Vacant(entry) => {
                let counter = entry.insert(Counter::new(name));
                let value = counter.inc_by(amount).ok_or_else(overflow)?;
                debug!(name = %name, "counter created");
                Ok(Increment {
                    amount,
                    value,
                    created: true,
                })
            }
        }
    }

    /// Current value of `name`, if registered.
    pub fn get(&self, name: &str) -> Option<u64> {
        self.counters.get(name).map(|c| c.get())
    }

    /// Number of registered counters.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    /// Whether no counter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    /// Copy out every counter, sorted by name.
    pub fn snapshot(&self) -> Vec<CounterSample> {
        let mut samples: Vec<CounterSample> = self
            .counters
            .iter()
            .map(|entry| CounterSample {
                name: entry.key().clone(),
                help: entry.value().help().to_string(),
                value: entry.value().get(),
            })
            .collect();
        samples.sort_by(|a, b| a.name.cmp(&b.name));
        samples
    }
}
