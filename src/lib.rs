//! Waypoint is a path-prefix reverse proxy.
//!
//! Each configured route listens on its own address and forwards every
//! request to one of its named targets, chosen by the first path segment
//! of the request URL. That segment is stripped before forwarding. https
//! targets are reached over mutually-authenticated TLS with per-target
//! certificate material. A heartbeat monitor serves a liveness endpoint
//! and polls it, and request counts and latencies are exported on a
//! separate metrics listener.
//!
//! # Architecture
//!
//! - [`cli`] -- Command-line argument parsing with clap derive macros.
//! - [`cmd`] -- Subcommand dispatch and execution (run, validate, health).
//! - [`config`] -- Configuration loading and validation.
//! - [`error`] -- Unified error types using `thiserror`.
//! - [`heartbeat`] -- Liveness endpoint, poll loop, and health tracker.
//! - [`logging`] -- Structured tracing setup with JSON and pretty-print output.
//! - [`metrics`] -- Prometheus registry and the `/metrics` router.
//! - [`middleware`] -- CORS policy applied to every route listener.
//! - [`proxy`] -- Dispatch engine: prefix routing, forwarded headers, and
//!   per-target upstream clients.
//! - [`server`] -- Route listeners, HTTP client types, the supervisor, and
//!   graceful shutdown.
//! - [`tls`] -- Loading client certificates, keys, and CA roots for https
//!   targets.
//!
//! # Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `yaml` | YAML config file support _(enabled by default)_ |
//! | `json` | JSON config file support |
//! | `toml` | TOML config file support |

// Binary crate — public functions are internal, not consumed by external users.
#![allow(clippy::missing_errors_doc)]

pub mod cli;
pub mod cmd;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod proxy;
pub mod server;
pub mod tls;
