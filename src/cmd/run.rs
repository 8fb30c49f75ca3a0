//! `waypoint run` — start the proxy.
//!
//! Installs the logging subscriber, loads and validates the config file,
//! then hands over to [`server::supervise`] until SIGINT or SIGTERM.

use std::time::Duration;

use crate::cli::RunArgs;
use crate::config;
use crate::error::WaypointError;
use crate::logging;
use crate::server::{self, ListenerOptions, RunOptions};

pub async fn execute(args: RunArgs) -> Result<(), WaypointError> {
    let log_format = logging::resolve_format(args.pretty, args.json);
    logging::init(&args.log_level, log_format);

    let config = config::load_file(&args.config).await?;
    tracing::info!(config = %args.config.display(), "configuration loaded");

    let options = RunOptions {
        metrics_addr: format!("{}:{}", args.metrics_host, args.metrics_port),
        listener: ListenerOptions {
            max_body: args.max_body,
            drain: Duration::from_secs(args.drain_secs),
        },
    };

    server::supervise(config, options, server::shutdown_signal()).await
}
