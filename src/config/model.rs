//! Serde data structures for the Waypoint configuration file.
//!
//! Contains [`Config`] (the root), [`Route`], [`Target`] and
//! [`HeartbeatConfig`]. All types derive `Serialize` and `Deserialize`
//! with `deny_unknown_fields` for strict parsing. Ports are kept as `u32`
//! so out-of-range values reach the validator instead of failing to parse.
//! The flattened legacy key spellings (`listenport`, `certfile`, ...) are
//! accepted as aliases.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

const fn default_interval_secs() -> u64 {
    60
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_retries() -> u32 {
    3
}

const fn default_heartbeat_port() -> u32 {
    9090
}

fn default_status_text() -> String {
    "healthy".to_string()
}

fn default_status_path() -> String {
    "/heartbeat".to_string()
}

fn default_listen_host() -> String {
    "0.0.0.0".to_string()
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_pattern() -> String {
    "/".to_string()
}

fn is_default_heartbeat(v: &HeartbeatConfig) -> bool {
    !v.enabled
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default, skip_serializing_if = "is_default_heartbeat")]
    pub heartbeat: HeartbeatConfig,

    pub routes: Vec<Route>,
}

impl Config {
    #[must_use]
    pub fn total_targets(&self) -> usize {
        self.routes.iter().map(|r| r.targets.len()).sum()
    }
}

/// The two schemes a route or target may speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "http" => Ok(Self::Http),
            "https" => Ok(Self::Https),
            other => Err(format!(
                "unsupported protocol '{other}' (expected http or https)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Route {
    pub name: String,

    #[serde(default = "default_listen_host", alias = "listenhost")]
    pub listen_host: String,

    #[serde(alias = "listenport")]
    pub listen_port: u32,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    #[serde(default = "default_pattern")]
    pub pattern: String,

    #[serde(default, alias = "certfile", skip_serializing_if = "String::is_empty")]
    pub cert_file: String,

    #[serde(default, alias = "keyfile", skip_serializing_if = "String::is_empty")]
    pub key_file: String,

    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Route {
    /// Parsed protocol. Only `None` for configs that skipped validation.
    #[must_use]
    pub fn scheme(&self) -> Option<Protocol> {
        self.protocol.parse().ok()
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    pub name: String,

    #[serde(alias = "pathprefix")]
    pub path_prefix: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub host: String,

    pub port: u32,

    #[serde(default, alias = "certfile", skip_serializing_if = "String::is_empty")]
    pub cert_file: String,

    #[serde(default, alias = "keyfile", skip_serializing_if = "String::is_empty")]
    pub key_file: String,

    #[serde(default, alias = "cacert", skip_serializing_if = "String::is_empty")]
    pub ca_cert: String,
}

impl Target {
    #[must_use]
    pub fn scheme(&self) -> Option<Protocol> {
        self.protocol.parse().ok()
    }

    /// `{protocol}://{host}:{port}` without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HeartbeatConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_secs", alias = "interval")]
    pub interval_secs: u64,

    #[serde(default = "default_timeout_secs", alias = "timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retries", alias = "retriesbeforefail")]
    pub retries_before_fail: u32,

    #[serde(default = "default_status_text", alias = "statustext")]
    pub status_text: String,

    #[serde(default = "default_status_path", alias = "statuspath")]
    pub status_path: String,

    #[serde(default, alias = "statusurl")]
    pub status_url: String,

    #[serde(default = "default_listen_host", alias = "listenhost")]
    pub listen_host: String,

    #[serde(default = "default_heartbeat_port", alias = "listenport")]
    pub listen_port: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_interval_secs(),
            timeout_secs: default_timeout_secs(),
            retries_before_fail: default_retries(),
            status_text: default_status_text(),
            status_path: default_status_path(),
            status_url: String::new(),
            listen_host: default_listen_host(),
            listen_port: default_heartbeat_port(),
        }
    }
}

impl HeartbeatConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    #[must_use]
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.listen_host, self.listen_port)
    }
}
