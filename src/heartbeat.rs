//! Liveness endpoint and the poll loop that exercises it.
//!
//! [`serve_status`] answers `GET {status_path}` with the configured status
//! text on its own listener. [`poll_loop`] calls [`check_health`] against
//! `status_url` once per interval and feeds the outcome to a
//! [`HealthTracker`], which flips to unhealthy after
//! `retries_before_fail` consecutive failures and back on the next success.
//! The tracker's state is published through the heartbeat gauges; it never
//! changes what the status endpoint or the proxy listeners answer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::http::{Method, Uri};
use axum::response::IntoResponse;
use axum::Router;
use bytes::Bytes;
use http_body_util::Full;
use hyper::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::watch;

use crate::config::model::HeartbeatConfig;
use crate::error::{HeartbeatError, WaypointError};
use crate::metrics::Metrics;
use crate::server::{self, HttpClient};

pub const STATUS_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Poll-loop parameters with durations already resolved.
#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub retries_before_fail: u32,
    pub status_url: String,
}

impl From<&HeartbeatConfig> for HeartbeatSettings {
    fn from(config: &HeartbeatConfig) -> Self {
        Self {
            interval: config.interval(),
            timeout: config.timeout(),
            retries_before_fail: config.retries_before_fail,
            status_url: config.status_url.clone(),
        }
    }
}

/// Answer `GET {status_path}` with `status_text`.
///
/// The path is compared literally, so `:`, `*` and `{` in it carry no
/// routing meaning.
pub fn status_router(status_path: &str, status_text: String) -> Router {
    let path: Arc<str> = status_path.into();
    let text: Arc<str> = status_text.into();
    Router::new().fallback(move |method: Method, uri: Uri| {
        let path = Arc::clone(&path);
        let text = Arc::clone(&text);
        async move {
            if uri.path() != &*path {
                return StatusCode::NOT_FOUND.into_response();
            }
            if method != Method::GET && method != Method::HEAD {
                return StatusCode::METHOD_NOT_ALLOWED.into_response();
            }
            text.to_string().into_response()
        }
    })
}

/// Serve the status endpoint until `shutdown` fires.
pub async fn serve_status(
    config: &HeartbeatConfig,
    shutdown: watch::Receiver<bool>,
) -> Result<(), WaypointError> {
    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| WaypointError::ListenerStart {
            route: "heartbeat".to_string(),
            source,
        })?;
    tracing::info!(addr = %addr, path = %config.status_path, "heartbeat status server started");

    let router = status_router(&config.status_path, config.status_text.clone());
    let outcome = server::serve_with_drain(listener, router, shutdown, STATUS_SHUTDOWN_GRACE).await?;
    server::log_outcome("heartbeat status server", outcome);
    Ok(())
}

/// One GET against `url`, bounded by `timeout`. Only a 200 counts as healthy.
pub async fn check_health(
    client: &HttpClient,
    url: &str,
    timeout: Duration,
) -> Result<(), HeartbeatError> {
    if url.is_empty() {
        return Err(HeartbeatError::EmptyStatusUrl);
    }
    let uri: hyper::Uri = url.parse().map_err(|source| HeartbeatError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;

    let request = hyper::Request::builder()
        .method(hyper::Method::GET)
        .uri(uri)
        .body(Full::new(Bytes::new()))?;

    let response = tokio::time::timeout(timeout, client.request(request))
        .await
        .map_err(|_| HeartbeatError::Timeout(timeout))??;

    match response.status() {
        StatusCode::OK => Ok(()),
        other => Err(HeartbeatError::UnexpectedStatus(other)),
    }
}

/// State change produced by a single poll outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Unchanged,
    BecameUnhealthy,
    Recovered,
}

#[derive(Debug)]
pub struct HealthTracker {
    threshold: u32,
    consecutive_failures: AtomicU32,
    healthy: AtomicBool,
}

impl HealthTracker {
    /// A threshold of 0 is treated as 1.
    #[must_use]
    pub fn new(retries_before_fail: u32) -> Self {
        Self {
            threshold: retries_before_fail.max(1),
            consecutive_failures: AtomicU32::new(0),
            healthy: AtomicBool::new(true),
        }
    }

    pub fn record_success(&self) -> Transition {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.healthy.swap(true, Ordering::Relaxed) {
            Transition::Unchanged
        } else {
            Transition::Recovered
        }
    }

    pub fn record_failure(&self) -> Transition {
        let failures = self
            .consecutive_failures
            .fetch_add(1, Ordering::Relaxed)
            .saturating_add(1);
        if failures >= self.threshold && self.healthy.swap(false, Ordering::Relaxed) {
            Transition::BecameUnhealthy
        } else {
            Transition::Unchanged
        }
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }
}

/// Poll `status_url` every `interval` until `shutdown` fires. The first
/// attempt happens one interval after start.
pub async fn poll_loop(
    client: HttpClient,
    settings: HeartbeatSettings,
    tracker: Arc<HealthTracker>,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
) {
    let cancel = server::cancelled(shutdown);
    tokio::pin!(cancel);

    tracing::info!(
        url = %settings.status_url,
        interval_secs = settings.interval.as_secs_f64(),
        retries_before_fail = settings.retries_before_fail,
        "heartbeat poll started"
    );

    loop {
        tokio::select! {
            () = &mut cancel => break,
            () = tokio::time::sleep(settings.interval) => {}
        }

        let result = tokio::select! {
            () = &mut cancel => break,
            result = check_health(&client, &settings.status_url, settings.timeout) => result,
        };

        let transition = match result {
            Ok(()) => {
                tracing::debug!(url = %settings.status_url, "heartbeat ok");
                tracker.record_success()
            }
            Err(e) => {
                tracing::warn!(
                    url = %settings.status_url,
                    error = %e,
                    consecutive_failures = tracker.consecutive_failures().saturating_add(1),
                    "heartbeat failed"
                );
                tracker.record_failure()
            }
        };

        match transition {
            Transition::BecameUnhealthy => tracing::error!(
                url = %settings.status_url,
                failures = tracker.consecutive_failures(),
                "heartbeat unhealthy"
            ),
            Transition::Recovered => {
                tracing::info!(url = %settings.status_url, "heartbeat recovered");
            }
            Transition::Unchanged => {}
        }

        metrics
            .heartbeat_failures
            .set(i64::from(tracker.consecutive_failures()));
        metrics.heartbeat_healthy.set(i64::from(tracker.is_healthy()));
    }

    tracing::info!("heartbeat poll stopped");
}
