//! In-memory counter registry.
//!
//! Counters are created lazily on first increment and live for the lifetime
//! of the process.

mod counter;
mod store;

pub use counter::{Counter, CounterSample, is_valid_metric_name};
pub use store::{CounterRegistry, Increment, RegistryError};
