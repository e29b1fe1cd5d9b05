//! Service metrics collector using prometheus-client.
//!
//! Tracks requests served per route and status, request latency, and the
//! size of the counter registry. These are separate from the user counters
//! and only appear in scrapes when explicitly enabled.

use prometheus_client::encoding::{EncodeLabelSet, EncodeLabelValue};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Prefix shared by every service metric family.
pub const SELF_METRICS_PREFIX: &str = "promcount_";

/// Route a request was dispatched to.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, EncodeLabelValue)]
pub enum Route {
    Increment,
    Metrics,
    Unmatched,
}

/// Labels for request metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RequestLabels {
    pub route: Route,
    pub status: String,
}

/// Labels for latency metrics.
#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct RouteLabels {
    pub route: Route,
}

/// Collects and stores service metrics.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<MetricsCollectorInner>,
}

struct MetricsCollectorInner {
    /// Requests served.
    requests_total: Family<RequestLabels, Counter>,
    /// Request duration histogram (in seconds).
    request_duration_seconds: Family<RouteLabels, Histogram>,
    /// Number of user counters registered.
    registered_counters: Gauge,
    registry: Registry,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let requests_total = Family::<RequestLabels, Counter>::default();
        let request_duration_seconds =
            Family::<RouteLabels, Histogram>::new_with_constructor(|| {
                // 100us .. ~0.4s
                Histogram::new(exponential_buckets(0.0001, 2.5, 10))
            });
        let registered_counters = Gauge::default();

        registry.register(
            "promcount_http_requests",
            "Total number of HTTP requests served",
            requests_total.clone(),
        );
        registry.register(
            "promcount_http_request_duration_seconds",
            "HTTP request duration in seconds",
            request_duration_seconds.clone(),
        );
        registry.register(
            "promcount_registered_counters",
            "Number of counters in the registry",
            registered_counters.clone(),
        );

        Self {
            inner: Arc::new(MetricsCollectorInner {
                requests_total,
                request_duration_seconds,
                registered_counters,
                registry,
            }),
        }
    }

    /// Encode all service metrics in text format and append them to `out`.
    pub fn encode_into(&self, out: &mut String) -> Result<(), std::fmt::Error> {
        prometheus_client::encoding::text::encode(out, &self.inner.registry)
    }

    /// Record a completed request.
    pub fn record_request(&self, route: Route, status: u16, duration: Duration) {
        let labels = RequestLabels {
            route,
            status: status.to_string(),
        };
        self.inner.requests_total.get_or_create(&labels).inc();
        self.inner
            .request_duration_seconds
            .get_or_create(&RouteLabels { route })
            .observe(duration.as_secs_f64());
    }

    /// Update the registry size gauge.
    pub fn set_registered_counters(&self, count: usize) {
        self.inner
            .registered_counters
            .set(i64::try_from(count).unwrap_or(i64::MAX));
    }

    /// Number of requests recorded for a route and status, read from the
    /// encoded output so no series is created by asking.
    #[cfg(test)]
    pub(crate) fn requests_served(&self, route: Route, status: u16) -> u64 {
        let mut buffer = String::new();
        if self.encode_into(&mut buffer).is_err() {
            return 0;
        }
        let series = format!(
            "promcount_http_requests_total{{route=\"{:?}\",status=\"{}\"}} ",
            route, status
        );
        buffer
            .lines()
            .find_map(|line| line.strip_prefix(series.as_str()))
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Start timing a request.
    pub fn start_request_timer(&self) -> RequestTimer {
        RequestTimer {
            collector: self.clone(),
            start: Instant::now(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Timer for one request; call [`RequestTimer::record`] once the status is
/// known.
pub struct RequestTimer {
    collector: MetricsCollector,
    start: Instant,
}

impl RequestTimer {
    /// Get the elapsed duration.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record the request and consume the timer.
    pub fn record(self, route: Route, status: u16) {
        let duration = self.start.elapsed();
        self.collector.record_request(route, status, duration);
    }
}
