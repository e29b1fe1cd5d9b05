//! promcount - named monotonic counters over HTTP
//!
//! This crate provides:
//! - A concurrent counter registry with lazy, race-free creation
//! - Prometheus text exposition of the registry
//! - A small HTTP service to increment and scrape counters
//! - Optional self-instrumentation of the service

pub mod config;
pub mod exposition;
pub mod metrics;
pub mod registry;
pub mod server;
pub mod state;
pub mod util;

pub use config::Config;
pub use registry::CounterRegistry;
pub use state::AppState;
