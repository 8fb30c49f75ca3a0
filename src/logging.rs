//! Structured logging setup using the `tracing` ecosystem.
//!
//! Builds a `tracing-subscriber` with either JSON output (for production)
//! or pretty-printed output (for TTY / local dev). Format is auto-detected
//! from the terminal but can be forced via `--json` or `--pretty`.
//!
//! [`subscriber`] returns the subscriber as a value for any writer; only
//! the binary installs one globally through [`init`]. Tests attach their
//! own with `tracing::subscriber::with_default`.

use tracing::Subscriber;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::fmt::{self, MakeWriter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::LogLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[must_use]
pub fn resolve_format(pretty: bool, json: bool) -> LogFormat {
    if json {
        LogFormat::Json
    } else if pretty || std::io::IsTerminal::is_terminal(&std::io::stdout()) {
        LogFormat::Pretty
    } else {
        LogFormat::Json
    }
}

pub fn subscriber<W>(level: &LogLevel, format: LogFormat, writer: W) -> Box<dyn Subscriber + Send + Sync>
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let filter = Targets::new().with_default(level.to_tracing_level());

    match format {
        LogFormat::Json => Box::new(
            tracing_subscriber::registry().with(filter).with(
                fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(true)
                    .with_writer(writer),
            ),
        ),
        LogFormat::Pretty => Box::new(
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty().with_writer(writer)),
        ),
    }
}

/// Install the process-wide subscriber writing to stdout.
pub fn init(level: &LogLevel, format: LogFormat) {
    subscriber(level, format, std::io::stdout).init();
}
