//! Subcommand dispatch and execution.
//!
//! The [`dispatch`] function routes the parsed CLI to the appropriate
//! subcommand handler: [`run`], [`validate`], or [`health`]. Each handler
//! lives in its own submodule.

pub mod health;
pub mod run;
pub mod validate;

use crate::cli::{Cli, Commands};
use crate::error::WaypointError;

pub async fn dispatch(cli: Cli) -> Result<(), WaypointError> {
    match cli.command {
        Some(Commands::Run(args)) => run::execute(*args).await,
        Some(Commands::Validate(ref args)) => validate::execute(args),
        Some(Commands::Health(args)) => health::execute(args).await,
        None => {
            print_welcome();
            Ok(())
        }
    }
}

fn print_welcome() {
    let version = env!("CARGO_PKG_VERSION");
    println!(
        "\n  waypoint v{version}: path-prefix reverse proxy\n\n  \
         No command provided. To get started:\n\n    \
         waypoint validate config/config.yaml   Check a config file\n    \
         waypoint run                           Start the proxy (./config/config.yaml)\n    \
         waypoint run -c routes.yaml            Start with a specific config file\n    \
         waypoint --help                        See all commands and options\n"
    );
}
