//! Prometheus instruments for the factorize route.
//!
//! [`ServerMetrics`] owns a private [`Registry`] instead of the process-wide
//! default one, so every router (and every test) gets an isolated set of
//! counters. It is injected into the request path through axum state.
//!
//! ## Instruments
//!
//! - `active_connections` - factorize requests currently being served.
//! - `execution_time_seconds` - wall-clock duration of completed factorize
//!   requests.
//! - `requests_total{status}` - completed factorize requests by HTTP status.

use axum::http::StatusCode;
use prometheus::{
    DEFAULT_BUCKETS, Histogram, HistogramOpts, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::{sync::Arc, time::Instant};

struct Instruments {
    registry: Registry,
    active_connections: IntGauge,
    execution_time: Histogram,
    requests: IntCounterVec,
}

/// Concurrency-safe handle to the service's metrics.
#[derive(Clone)]
pub struct ServerMetrics {
    inner: Arc<Instruments>,
}

impl ServerMetrics {
    /// Creates and registers every instrument in a fresh registry.
    ///
    /// # Errors
    ///
    /// Returns an error if an instrument is rejected by the registry.
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let active_connections = IntGauge::new(
            "active_connections",
            "Current number of active connections.",
        )?;
        let execution_time = Histogram::with_opts(
            HistogramOpts::new(
                "execution_time_seconds",
                "Execution time of /factorize API requests.",
            )
            .buckets(DEFAULT_BUCKETS.to_vec()),
        )?;
        let requests = IntCounterVec::new(
            Opts::new("requests_total", "Completed /factorize API requests."),
            &["status"],
        )?;

        registry.register(Box::new(active_connections.clone()))?;
        registry.register(Box::new(execution_time.clone()))?;
        registry.register(Box::new(requests.clone()))?;

        Ok(Self {
            inner: Arc::new(Instruments {
                registry,
                active_connections,
                execution_time,
                requests,
            }),
        })
    }

    /// Marks the start of a factorize request.
    ///
    /// The returned guard keeps `active_connections` incremented until it is
    /// dropped, including when the request future is cancelled.
    pub fn track(&self) -> RequestGuard {
        self.inner.active_connections.inc();
        RequestGuard {
            metrics: self.clone(),
            started: Instant::now(),
        }
    }

    pub fn active_connections(&self) -> i64 {
        self.inner.active_connections.get()
    }

    pub fn completed_requests(&self) -> u64 {
        self.inner.execution_time.get_sample_count()
    }

    /// Encodes the registry in the Prometheus text exposition format.
    pub fn render(&self) -> prometheus::Result<String> {
        TextEncoder::new().encode_to_string(&self.inner.registry.gather())
    }
}

/// In-flight marker returned by [`ServerMetrics::track`].
pub struct RequestGuard {
    metrics: ServerMetrics,
    started: Instant,
}

impl RequestGuard {
    /// Records a completed request. The gauge is released on drop.
    pub fn complete(self, status: StatusCode) {
        let instruments = &self.metrics.inner;
        instruments
            .execution_time
            .observe(self.started.elapsed().as_secs_f64());
        instruments
            .requests
            .with_label_values(&[status.as_str()])
            .inc();
    }
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.metrics.inner.active_connections.dec();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_holds_gauge_until_dropped() {
        let metrics = ServerMetrics::new().unwrap();
        let first = metrics.track();
        let second = metrics.track();
        assert_eq!(metrics.active_connections(), 2);

        first.complete(StatusCode::OK);
        assert_eq!(metrics.active_connections(), 1);
        assert_eq!(metrics.completed_requests(), 1);

        // Abandoned requests release the gauge without being observed.
        drop(second);
        assert_eq!(metrics.active_connections(), 0);
        assert_eq!(metrics.completed_requests(), 1);
    }

    #[test]
    fn render_exposes_route_instruments() {
        let metrics = ServerMetrics::new().unwrap();
        metrics.track().complete(StatusCode::BAD_REQUEST);

        let text = metrics.render().unwrap();
        assert!(text.contains("# TYPE active_connections gauge"));
        assert!(text.contains("active_connections 0"));
        assert!(text.contains("execution_time_seconds_count 1"));
        assert!(text.contains(r#"requests_total{status="400"} 1"#));
    }

    #[test]
    fn registries_are_isolated() {
        let a = ServerMetrics::new().unwrap();
        let b = ServerMetrics::new().unwrap();
        let _guard = a.track();
        assert_eq!(a.active_connections(), 1);
        assert_eq!(b.active_connections(), 0);
    }
}
