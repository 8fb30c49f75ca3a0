//! Unified error types for Waypoint.
//!
//! Defines [`WaypointError`] (the main crate error enum),
//! [`ValidationError`] for config validation failures, and the narrower
//! enums raised at request time: [`TlsError`] while loading upstream TLS
//! material, [`UpstreamError`] while dispatching to an upstream and
//! [`HeartbeatError`] while polling the status endpoint. All use
//! `thiserror` for `Display` and `Error` derives.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationError {
    pub route: String,
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "  route {}: {} — {}",
            self.route, self.field, self.message
        )?;
        if let Some(ref suggestion) = self.suggestion {
            write!(f, " ({suggestion})")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

fn format_errors(errors: &[ValidationError]) -> String {
    use std::fmt::Write;
    let mut buf = String::new();
    for (i, e) in errors.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        // write! to String is infallible (only fails on OOM which is unrecoverable)
        let _ = write!(buf, "{e}");
    }
    buf
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum WaypointError {
    #[error("Config file not found: {}", path.display())]
    ConfigFileNotFound { path: PathBuf },

    #[error("Config parse error in {path}:\n  {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Config validation failed:\n{}", format_errors(.errors))]
    ConfigValidation { errors: Vec<ValidationError> },

    #[error("Unsupported config format: '{0}'")]
    UnsupportedFormat(String),

    #[error("Invalid upstream URL '{url}' for target {target}: {source}")]
    InvalidTarget {
        target: String,
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Listener for route {route} failed: {source}")]
    ListenerStart {
        route: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("All {0} route listeners failed to start")]
    NoRouteListeners(usize),

    #[error("Heartbeat check failed: {0}")]
    Heartbeat(#[from] HeartbeatError),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}

/// Failure to turn a target's certificate, key and CA paths into a client
/// TLS configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TlsError {
    #[error("certificate file not found: {}", .0.display())]
    MissingCertFile(PathBuf),

    #[error("private key file not found: {}", .0.display())]
    MissingKeyFile(PathBuf),

    #[error("CA certificate file not found: {}", .0.display())]
    MissingCaFile(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("no private key found in {}", .0.display())]
    NoPrivateKey(PathBuf),

    #[error("invalid CA certificate in {}: {source}", path.display())]
    InvalidCa {
        path: PathBuf,
        #[source]
        source: rustls::Error,
    },

    #[error("TLS client configuration rejected: {0}")]
    Config(#[from] rustls::Error),
}

/// Dispatch-time failure reaching an upstream. Every variant becomes a
/// `502 Bad Gateway` at the HTTP boundary.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum UpstreamError {
    #[error("TLS material unavailable: {0}")]
    Tls(Arc<TlsError>),

    #[error("invalid upstream URI '{uri}': {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("failed to build upstream request: {0}")]
    Request(#[from] http::Error),

    #[error("upstream unreachable: {0}")]
    Dial(#[from] hyper_util::client::legacy::Error),

    #[error("no response headers within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("failed reading upstream body: {0}")]
    Body(#[from] hyper::Error),
}

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum HeartbeatError {
    #[error("server status URL is empty")]
    EmptyStatusUrl,

    #[error("invalid status URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: http::uri::InvalidUri,
    },

    #[error("failed to create heartbeat request: {0}")]
    Request(#[from] http::Error),

    #[error("heartbeat request failed: {0}")]
    Transport(#[from] hyper_util::client::legacy::Error),

    #[error("heartbeat timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("unexpected status code: {0}")]
    UnexpectedStatus(hyper::StatusCode),
}
