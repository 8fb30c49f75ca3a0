//! Route listeners, shared HTTP client types, and graceful shutdown.
//!
//! Contains [`RouteState`] (the `Arc`-shared per-route state holding the
//! upstream registry and metrics), [`build_router`] for the Axum router
//! with middleware layers, [`serve_route`] for one route's listener
//! (plain or TLS), [`spawn_route_listeners`] which reports start failures
//! on a per-route error channel, [`supervise`] which runs every listener
//! of a process under one cancellation root, and the cancellation helpers
//! ([`cancelled`], [`shutdown_signal`], [`serve_with_drain`],
//! [`serve_tls_with_drain`]).

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tower::ServiceBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::model::{Config, Protocol, Route};
use crate::error::WaypointError;
use crate::heartbeat::{self, HealthTracker, HeartbeatSettings};
use crate::metrics::{self, Metrics};
use crate::middleware;
use crate::proxy;
use crate::proxy::upstream::UpstreamRegistry;

pub type HttpsConnector =
    hyper_rustls::HttpsConnector<hyper_util::client::legacy::connect::HttpConnector>;
pub type HttpClient = Client<HttpsConnector, http_body_util::Full<bytes::Bytes>>;

pub const DEFAULT_MAX_BODY: usize = 1_048_576;
pub const DEFAULT_DRAIN: Duration = Duration::from_secs(10);

/// Whether a listener finished draining inside its grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    Clean,
    Forced,
}

#[derive(Debug, Clone, Copy)]
pub struct ListenerOptions {
    pub max_body: usize,
    pub drain: Duration,
}

impl Default for ListenerOptions {
    fn default() -> Self {
        Self {
            max_body: DEFAULT_MAX_BODY,
            drain: DEFAULT_DRAIN,
        }
    }
}

/// Process-level listener settings for [`supervise`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub metrics_addr: String,
    pub listener: ListenerOptions,
}

/// Immutable state shared by every request on one route listener.
pub struct RouteState {
    pub route_name: String,
    pub protocol: Protocol,
    pub listen_port: u16,
    pub pattern: String,
    pub registry: UpstreamRegistry,
    pub metrics: Arc<Metrics>,
}

impl RouteState {
    /// Build the state for a validated route, including its upstream registry.
    pub fn new(route: &Route, metrics: Arc<Metrics>) -> Result<Self, WaypointError> {
        Ok(Self {
            route_name: route.name.clone(),
            protocol: route.scheme().unwrap_or(Protocol::Http),
            listen_port: u16::try_from(route.listen_port).unwrap_or(0),
            pattern: route.pattern.clone(),
            registry: UpstreamRegistry::build(route)?,
            metrics,
        })
    }
}

/// A route listener that could not start or stopped with an error.
#[derive(Debug)]
pub struct ListenerFailure {
    pub route: String,
    pub error: WaypointError,
}

/// Install `ring` as the process crypto provider.
///
/// When several rustls providers are compiled in, rustls cannot pick one
/// on its own. Repeated calls are harmless.
pub fn install_crypto_provider() {
    let _ = rustls::crypto::ring::default_provider().install_default();
}

/// General-purpose client, used by the heartbeat poll and the `health` command.
#[must_use]
pub fn build_http_client() -> HttpClient {
    install_crypto_provider();

    let https = hyper_rustls::HttpsConnectorBuilder::new()
        .with_webpki_roots()
        .https_or_http()
        .enable_http1()
        .build();
    Client::builder(TokioExecutor::new())
        .pool_idle_timeout(Duration::from_secs(30))
        .build(https)
}

pub fn build_router(state: Arc<RouteState>, max_body: usize) -> Router {
    Router::new()
        .fallback(proxy::forward_handler)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                // `max_body` is the only limit; axum's 2 MiB extractor default is off.
                .layer(DefaultBodyLimit::disable())
                .layer(RequestBodyLimitLayer::new(max_body)),
        )
        // Outermost, so rejections from the inner layers carry CORS headers too.
        .layer(axum::middleware::from_fn(middleware::cors))
        .with_state(state)
}

/// Resolve once the shutdown channel flips to `true` or its sender is gone.
pub async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Serve `router` on `listener` until `shutdown` fires, then drain for at
/// most `grace` before abandoning in-flight connections.
pub async fn serve_with_drain(
    listener: TcpListener,
    router: Router,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> std::io::Result<ShutdownOutcome> {
    let signal = cancelled(shutdown.clone());
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
    });

    tokio::select! {
        res = &mut server => {
            return flatten(res).map(|()| ShutdownOutcome::Clean);
        }
        () = cancelled(shutdown) => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => flatten(res).map(|()| ShutdownOutcome::Clean),
        Err(_) => {
            server.abort();
            Ok(ShutdownOutcome::Forced)
        }
    }
}

fn flatten(res: Result<std::io::Result<()>, tokio::task::JoinError>) -> std::io::Result<()> {
    res.map_err(std::io::Error::other)?
}

/// TLS counterpart of [`serve_with_drain`], on an axum-server listener.
pub async fn serve_tls_with_drain(
    addr: SocketAddr,
    tls: RustlsConfig,
    router: Router,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> std::io::Result<ShutdownOutcome> {
    let handle = axum_server::Handle::new();
    let server_handle = handle.clone();
    let mut server = tokio::spawn(async move {
        axum_server::bind_rustls(addr, tls)
            .handle(server_handle)
            .serve(router.into_make_service_with_connect_info::<SocketAddr>())
            .await
    });

    tokio::select! {
        res = &mut server => {
            return flatten(res).map(|()| ShutdownOutcome::Clean);
        }
        () = cancelled(shutdown) => {}
    }

    handle.graceful_shutdown(None);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(res) => flatten(res).map(|()| ShutdownOutcome::Clean),
        Err(_) => {
            handle.shutdown();
            server.abort();
            Ok(ShutdownOutcome::Forced)
        }
    }
}

/// Resolve `host:port` to one bind address, IPv4 first when the host has both.
pub async fn resolve_listen_addr(listen_addr: &str) -> std::io::Result<SocketAddr> {
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host(listen_addr).await?.collect();
    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("{listen_addr} did not resolve to any address"),
            )
        })
}

/// Run one route's listener until shutdown. https routes terminate TLS
/// with the route's own certificate and key.
pub async fn serve_route(
    route: Route,
    metrics: Arc<Metrics>,
    options: ListenerOptions,
    shutdown: watch::Receiver<bool>,
) -> Result<(), WaypointError> {
    let state = Arc::new(RouteState::new(&route, metrics)?);
    let router = build_router(Arc::clone(&state), options.max_body);
    let listen_addr = route.listen_addr();
    let listener_error = |source: std::io::Error| WaypointError::ListenerStart {
        route: route.name.clone(),
        source,
    };

    match state.protocol {
        Protocol::Http => {
            let listener = TcpListener::bind(&listen_addr)
                .await
                .map_err(listener_error)?;
            tracing::info!(
                addr = %listen_addr,
                pattern = %route.pattern,
                targets = state.registry.len(),
                "proxy listener started"
            );
            let outcome = serve_with_drain(listener, router, shutdown, options.drain)
                .await
                .map_err(listener_error)?;
            log_outcome("proxy listener", outcome);
        }
        Protocol::Https => {
            install_crypto_provider();
            let addr = resolve_listen_addr(&listen_addr)
                .await
                .map_err(listener_error)?;
            let tls = RustlsConfig::from_pem_file(&route.cert_file, &route.key_file)
                .await
                .map_err(listener_error)?;

            tracing::info!(
                addr = %addr,
                pattern = %route.pattern,
                targets = state.registry.len(),
                "proxy listener started (tls)"
            );
            let outcome = serve_tls_with_drain(addr, tls, router, shutdown, options.drain)
                .await
                .map_err(listener_error)?;
            log_outcome("proxy listener", outcome);
        }
    }

    Ok(())
}

pub fn log_outcome(listener: &str, outcome: ShutdownOutcome) {
    match outcome {
        ShutdownOutcome::Clean => tracing::info!(listener, "shut down cleanly"),
        ShutdownOutcome::Forced => {
            tracing::warn!(listener, "drain deadline reached, connections dropped");
        }
    }
}

/// Spawn one listener task per route. Failures are reported on the
/// returned channel, tagged with the route name; other routes keep serving.
pub fn spawn_route_listeners(
    routes: Vec<Route>,
    metrics: &Arc<Metrics>,
    options: ListenerOptions,
    shutdown: &watch::Receiver<bool>,
) -> (JoinSet<()>, mpsc::UnboundedReceiver<ListenerFailure>) {
    let (failures_tx, failures_rx) = mpsc::unbounded_channel();
    let mut tasks = JoinSet::new();

    for route in routes {
        let name = route.name.clone();
        let span = tracing::info_span!("route", route = %name);
        let metrics = Arc::clone(metrics);
        let shutdown = shutdown.clone();
        let failures_tx = failures_tx.clone();

        tasks.spawn(
            async move {
                if let Err(error) = serve_route(route, metrics, options, shutdown).await {
                    let _ = failures_tx.send(ListenerFailure { route: name, error });
                }
            }
            .instrument(span),
        );
    }

    (tasks, failures_rx)
}

/// Serve the `/metrics` listener until shutdown.
pub async fn serve_metrics(
    addr: String,
    metrics: Arc<Metrics>,
    shutdown: watch::Receiver<bool>,
    drain: Duration,
) -> Result<(), WaypointError> {
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| WaypointError::ListenerStart {
            route: "metrics".to_string(),
            source,
        })?;
    tracing::info!(addr = %addr, path = metrics::METRICS_PATH, "metrics listener started");

    let outcome = serve_with_drain(listener, metrics::metrics_router(metrics), shutdown, drain).await?;
    log_outcome("metrics listener", outcome);
    Ok(())
}

/// Run every listener for `config` until `signal` resolves.
///
/// Route listeners are independent: one failing to bind is logged and the
/// rest keep serving. If every route listener fails, the process shuts
/// down with [`WaypointError::NoRouteListeners`]. On shutdown all tasks
/// are awaited, bounded by their drain deadlines.
pub async fn supervise<F>(config: Config, options: RunOptions, signal: F) -> Result<(), WaypointError>
where
    F: Future<Output = ()> + Send,
{
    let metrics = Arc::new(Metrics::new()?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let route_count = config.routes.len();
    tracing::info!(
        routes = route_count,
        targets = config.total_targets(),
        heartbeat = config.heartbeat.enabled,
        "waypoint starting"
    );

    let (mut routes, mut failures) =
        spawn_route_listeners(config.routes, &metrics, options.listener, &shutdown_rx);

    let mut background: JoinSet<Result<(), WaypointError>> = JoinSet::new();
    background.spawn(serve_metrics(
        options.metrics_addr.clone(),
        Arc::clone(&metrics),
        shutdown_rx.clone(),
        options.listener.drain,
    ));

    if config.heartbeat.enabled {
        let heartbeat_config = config.heartbeat.clone();
        let rx = shutdown_rx.clone();
        background.spawn(async move { heartbeat::serve_status(&heartbeat_config, rx).await });

        let settings = HeartbeatSettings::from(&config.heartbeat);
        let tracker = Arc::new(HealthTracker::new(settings.retries_before_fail));
        let poll_metrics = Arc::clone(&metrics);
        let rx = shutdown_rx.clone();
        background.spawn(async move {
            heartbeat::poll_loop(build_http_client(), settings, tracker, poll_metrics, rx).await;
            Ok(())
        });
    }

    tokio::pin!(signal);
    let mut failed_routes = 0usize;
    let mut result = Ok(());

    loop {
        tokio::select! {
            () = &mut signal => break,
            Some(failure) = failures.recv() => {
                failed_routes += 1;
                tracing::error!(
                    route = %failure.route,
                    error = %failure.error,
                    "route listener failed"
                );
                if failed_routes >= route_count {
                    tracing::error!(failed = failed_routes, "no route listener is running, shutting down");
                    result = Err(WaypointError::NoRouteListeners(failed_routes));
                    break;
                }
            }
            Some(joined) = background.join_next() => log_background_exit(joined),
        }
    }

    let _ = shutdown_tx.send(true);

    while let Some(joined) = routes.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "route listener task panicked");
        }
    }
    while let Some(joined) = background.join_next().await {
        log_background_exit(joined);
    }

    tracing::info!("waypoint stopped");
    result
}

fn log_background_exit(joined: Result<Result<(), WaypointError>, tokio::task::JoinError>) {
    match joined {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "listener failed"),
        Err(e) => tracing::error!(error = %e, "listener task panicked"),
    }
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!(signal = "SIGINT", "received signal"),
        () = terminate => tracing::info!(signal = "SIGTERM", "received signal"),
    }
}
