//! Process-wide proxy metrics on an explicit prometheus registry.
//!
//! [`Metrics`] owns its own [`Registry`] rather than using the crate-global
//! default, so every test and every process root gets an isolated set of
//! series. It is shared as `Arc<Metrics>` by the dispatch engine, the
//! heartbeat poll loop and the metrics listener.
//!
//! | Series | Type | Updated by |
//! |--------|------|------------|
//! | `proxied_requests_total` | counter | every dispatch attempt to a matched upstream |
//! | `request_duration_seconds` | histogram | every dispatch attempt to a matched upstream |
//! | `unmatched_requests_total` | counter | 404s for unknown prefixes |
//! | `heartbeat_healthy` | gauge | heartbeat poll loop |
//! | `heartbeat_consecutive_failures` | gauge | heartbeat poll loop |

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder};

pub const METRICS_PATH: &str = "/metrics";
pub const DEFAULT_METRICS_PORT: u16 = 8091;

pub struct Metrics {
    registry: Registry,
    pub proxied_requests: IntCounter,
    pub request_duration: Histogram,
    pub unmatched_requests: IntCounter,
    pub heartbeat_healthy: IntGauge,
    pub heartbeat_failures: IntGauge,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let proxied_requests = IntCounter::with_opts(Opts::new(
            "proxied_requests_total",
            "Total number of requests dispatched to an upstream",
        ))?;
        let request_duration = Histogram::with_opts(HistogramOpts::new(
            "request_duration_seconds",
            "Duration of proxy dispatches, from dispatch start to response completion",
        ))?;
        let unmatched_requests = IntCounter::with_opts(Opts::new(
            "unmatched_requests_total",
            "Requests whose path prefix matched no upstream",
        ))?;
        let heartbeat_healthy = IntGauge::with_opts(Opts::new(
            "heartbeat_healthy",
            "1 while the heartbeat poll is within its failure threshold, 0 otherwise",
        ))?;
        let heartbeat_failures = IntGauge::with_opts(Opts::new(
            "heartbeat_consecutive_failures",
            "Consecutive failed heartbeat polls",
        ))?;

        registry.register(Box::new(proxied_requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;
        registry.register(Box::new(unmatched_requests.clone()))?;
        registry.register(Box::new(heartbeat_healthy.clone()))?;
        registry.register(Box::new(heartbeat_failures.clone()))?;

        // Healthy until the poll loop says otherwise.
        heartbeat_healthy.set(1);

        Ok(Self {
            registry,
            proxied_requests,
            request_duration,
            unmatched_requests,
            heartbeat_healthy,
            heartbeat_failures,
        })
    }

    /// Record one completed dispatch attempt (success or failure).
    pub fn observe_dispatch(&self, elapsed: Duration) {
        self.proxied_requests.inc();
        self.request_duration.observe(elapsed.as_secs_f64());
    }

    pub fn observe_unmatched(&self) {
        self.unmatched_requests.inc();
    }

    /// Text exposition of every registered series.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

/// Router for the dedicated metrics listener. Only `GET /metrics` exists.
pub fn metrics_router(metrics: Arc<Metrics>) -> Router {
    Router::new()
        .route(METRICS_PATH, get(metrics_handler))
        .with_state(metrics)
}

async fn metrics_handler(State(metrics): State<Arc<Metrics>>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
