//! Self-instrumentation of the HTTP service.

mod collector;

pub use collector::{MetricsCollector, RequestTimer, Route, SELF_METRICS_PREFIX};
