//! Shared application state.

use crate::config::Config;
use crate::metrics::MetricsCollector;
use crate::registry::CounterRegistry;
use std::sync::Arc;

/// State handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// The counter registry, created once at startup.
    registry: Arc<CounterRegistry>,

    /// Service self-instrumentation.
    metrics: MetricsCollector,

    /// Whether scrapes include the service's own metrics.
    include_self_metrics: bool,
}

impl AppState {
    /// Create state with an empty registry.
    pub fn new(config: &Config) -> Self {
        Self {
            registry: Arc::new(CounterRegistry::new()),
            metrics: MetricsCollector::new(),
            include_self_metrics: config.exposition.include_self_metrics,
        }
    }

    /// Get the counter registry.
    pub fn registry(&self) -> &Arc<CounterRegistry> {
        &self.registry
    }

    /// Get the metrics collector.
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Whether scrapes include the service's own metrics.
    pub fn include_self_metrics(&self) -> bool {
        self.include_self_metrics
    }
}
