//! Command-line interface definitions using clap derive macros.
//!
//! Contains the top-level [`Cli`] parser, the [`Commands`] enum for
//! subcommands (run, validate, health), and their associated argument
//! structs. Every `run` flag has an environment variable equivalent for
//! container deployments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "waypoint",
    version,
    about = "Path-prefix reverse proxy with upstream mTLS and a heartbeat monitor",
    propagate_version = true,
    after_help = "\x1b[1mQuick start:\x1b[0m\n  \
        waypoint run                         Start with ./config/config.yaml\n  \
        waypoint run -c routes.yaml          Start with a specific config\n  \
        waypoint validate routes.yaml        Check a config without starting"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy
    Run(Box<RunArgs>),

    /// Validate a config file without starting
    Validate(ValidateArgs),

    /// Poll a heartbeat status URL once
    Health(HealthArgs),
}

#[derive(Args)]
#[command(after_help = "\x1b[1mExamples:\x1b[0m\n  \
        waypoint run                                   Default config path\n  \
        waypoint run -c routes.yaml --pretty           Local dev mode\n  \
        waypoint run -c routes.yaml --metrics-port 0   Metrics on a random port")]
pub struct RunArgs {
    /// Config file path (.yaml, .json, .toml)
    #[arg(short, long, env = "CONFIG_FILE", default_value = "config/config.yaml")]
    pub config: PathBuf,

    // -- Logging --
    /// Log level
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: LogLevel,

    /// Force pretty (human-readable) log output
    #[arg(long)]
    pub pretty: bool,

    /// Force JSON log output (overrides TTY detection)
    #[arg(long, conflicts_with = "pretty")]
    pub json: bool,

    // -- Observability --
    /// Metrics listener address
    #[arg(
        long,
        env = "METRICS_HOST",
        default_value = "0.0.0.0",
        help_heading = "Observability"
    )]
    pub metrics_host: String,

    /// Metrics listener port
    #[arg(
        long,
        env = "METRICS_PORT",
        default_value_t = crate::metrics::DEFAULT_METRICS_PORT,
        help_heading = "Observability"
    )]
    pub metrics_port: u16,

    // -- Tuning --
    /// Max request body size in bytes
    #[arg(
        long,
        env = "MAX_BODY_SIZE",
        default_value_t = crate::server::DEFAULT_MAX_BODY,
        help_heading = "Tuning"
    )]
    pub max_body: usize,

    /// Seconds listeners may spend draining in-flight requests on shutdown
    #[arg(
        long,
        env = "DRAIN_TIMEOUT_SECS",
        default_value_t = 10,
        help_heading = "Tuning"
    )]
    pub drain_secs: u64,
}

#[derive(Args)]
pub struct ValidateArgs {
    /// Config file to validate
    #[arg(default_value = "config/config.yaml")]
    pub config: PathBuf,

    /// Output format
    #[arg(long, default_value = "text")]
    pub format: ValidateFormat,
}

#[derive(Args)]
pub struct HealthArgs {
    /// Heartbeat status URL
    #[arg(default_value = "http://localhost:9090/heartbeat")]
    pub url: String,

    /// Request timeout in seconds
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    #[must_use]
    pub const fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Clone, Debug, ValueEnum)]
pub enum ValidateFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_defaults() {
        let cli = Cli::try_parse_from(["waypoint", "run"]).unwrap();
        let Some(Commands::Run(args)) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.config, PathBuf::from("config/config.yaml"));
        assert_eq!(args.metrics_port, 8091);
        assert_eq!(args.max_body, 1_048_576);
        assert_eq!(args.drain_secs, 10);
    }

    #[test]
    fn pretty_and_json_conflict() {
        assert!(Cli::try_parse_from(["waypoint", "run", "--pretty", "--json"]).is_err());
    }

    #[test]
    fn trace_level_is_not_accepted() {
        assert!(Cli::try_parse_from(["waypoint", "run", "-l", "trace"]).is_err());
    }
}
