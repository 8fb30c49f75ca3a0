//! `waypoint health` — poll a heartbeat status URL once.
//!
//! Runs the same check as the heartbeat poll loop and reports the result.
//! A failed check exits non-zero.

use std::time::Duration;

use crate::cli::HealthArgs;
use crate::error::WaypointError;
use crate::heartbeat;
use crate::server;

pub async fn execute(args: HealthArgs) -> Result<(), WaypointError> {
    let client = server::build_http_client();
    let timeout = Duration::from_secs(args.timeout_secs);

    heartbeat::check_health(&client, &args.url, timeout).await?;

    println!("\u{2713} {} is live", args.url);
    Ok(())
}
