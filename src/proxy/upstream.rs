//! Upstream registry: the immutable path-prefix → upstream table.
//!
//! One [`Upstream`] is built per configured target when a route starts.
//! Each owns a pooled hyper client with fixed dial, keep-alive, idle and
//! response-header limits, plus the target's client TLS configuration for
//! https. TLS material that fails to load does not abort construction:
//! the error is parked on the upstream and returned on every dispatch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::config::model::{Route, Target};
use crate::error::{TlsError, UpstreamError, WaypointError};
use crate::server::{self, HttpClient, HttpsConnector};
use crate::tls;

pub const MAX_IDLE_CONNS_PER_HOST: usize = 10;
pub const IDLE_CONN_TIMEOUT: Duration = Duration::from_secs(30);
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const KEEP_ALIVE: Duration = Duration::from_secs(10);
pub const RESPONSE_HEADER_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum Transport {
    Ready(HttpClient),
    Unavailable(Arc<TlsError>),
}

#[derive(Clone)]
pub struct Upstream {
    pub name: String,
    pub path_prefix: String,
    /// `{scheme}://{host}:{port}`, no trailing slash.
    pub base_url: String,
    /// `host:port`, used for the outgoing `Host` header.
    pub authority: String,
    transport: Transport,
}

impl std::fmt::Debug for Upstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Upstream")
            .field("name", &self.name)
            .field("path_prefix", &self.path_prefix)
            .field("base_url", &self.base_url)
            .field("ready", &self.is_ready())
            .finish()
    }
}

impl Upstream {
    pub fn from_target(target: &Target) -> Result<Self, WaypointError> {
        let base_url = target.base_url();
        let parsed = url::Url::parse(&base_url).map_err(|source| WaypointError::InvalidTarget {
            target: target.name.clone(),
            url: base_url.clone(),
            source,
        })?;
        let authority = match (parsed.host_str(), parsed.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{host}:{port}"),
            _ => {
                return Err(WaypointError::InvalidTarget {
                    target: target.name.clone(),
                    url: base_url,
                    source: url::ParseError::EmptyHost,
                })
            }
        };

        let transport = match tls::load_client_config(target) {
            Ok(tls_config) => Transport::Ready(build_upstream_client(tls_config)),
            Err(e) => {
                tracing::error!(
                    target = %target.name,
                    upstream = %base_url,
                    error = %e,
                    "failed to load upstream TLS material; requests to this target will fail"
                );
                Transport::Unavailable(Arc::new(e))
            }
        };

        Ok(Self {
            name: target.name.clone(),
            path_prefix: target.path_prefix.clone(),
            base_url: base_url.trim_end_matches('/').to_string(),
            authority,
            transport,
        })
    }

    #[must_use]
    pub const fn is_ready(&self) -> bool {
        matches!(self.transport, Transport::Ready(_))
    }

    pub fn client(&self) -> Result<&HttpClient, UpstreamError> {
        match &self.transport {
            Transport::Ready(client) => Ok(client),
            Transport::Unavailable(e) => Err(UpstreamError::Tls(Arc::clone(e))),
        }
    }
}

/// Connection-pooled client for one upstream. `tls` carries the mTLS
/// configuration for https targets; http targets fall back to webpki roots.
#[must_use]
pub fn build_upstream_client(tls: Option<rustls::ClientConfig>) -> HttpClient {
    server::install_crypto_provider();

    let mut http = HttpConnector::new();
    http.enforce_http(false);
    http.set_connect_timeout(Some(DIAL_TIMEOUT));
    http.set_keepalive(Some(KEEP_ALIVE));
    http.set_nodelay(true);

    let builder = hyper_rustls::HttpsConnectorBuilder::new();
    let https: HttpsConnector = match tls {
        Some(config) => builder
            .with_tls_config(config)
            .https_or_http()
            .enable_http1()
            .wrap_connector(http),
        None => builder
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .wrap_connector(http),
    };

    Client::builder(TokioExecutor::new())
        .pool_max_idle_per_host(MAX_IDLE_CONNS_PER_HOST)
        .pool_idle_timeout(IDLE_CONN_TIMEOUT)
        .build(https)
}

/// Immutable prefix → upstream map for one route. Built before the route
/// listener accepts traffic and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct UpstreamRegistry {
    upstreams: HashMap<String, Upstream>,
}

impl UpstreamRegistry {
    pub fn build(route: &Route) -> Result<Self, WaypointError> {
        let mut upstreams = HashMap::with_capacity(route.targets.len());
        for target in &route.targets {
            let upstream = Upstream::from_target(target)?;
            tracing::debug!(
                route = %route.name,
                prefix = %upstream.path_prefix,
                upstream = %upstream.base_url,
                ready = upstream.is_ready(),
                "registered upstream"
            );
            upstreams.insert(upstream.path_prefix.clone(), upstream);
        }
        Ok(Self { upstreams })
    }

    /// Exact, first-segment lookup. No fallback target.
    #[must_use]
    pub fn get(&self, prefix: &str) -> Option<&Upstream> {
        self.upstreams.get(prefix)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.upstreams.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upstreams.is_empty()
    }
}
