//! # do-replay
//!
//! Replays a JSON-lines stream of object lifecycle events through the
//! distributed-object hierarchy and reports what the dispatcher would have
//! left registered.
//!
//! ```bash
//! # Replay a capture with the default configuration
//! do-replay --events capture.jsonl
//!
//! # Tolerate deletes of ids the capture never generated, print the result
//! do-replay --events capture.jsonl --tolerant --dump
//!
//! # Structured output for log shipping
//! do-replay --events capture.jsonl --json-logs --log-level debug
//! ```
//!
//! Each line is one event:
//!
//! ```json
//! {"event":"generated","id":7,"parent":100,"zone":2000,"dclass":"DistributedToon"}
//! {"event":"relocated","id":7,"old_parent":100,"old_zone":2000,"new_parent":200,"new_zone":3000}
//! {"event":"deleted","id":7,"parent":200,"zone":3000}
//! ```

pub mod app;
pub mod cli;
pub mod logging;
pub mod replica;

use app::Application;
use cli::CliArgs;
use tracing::{info, warn};

/// Parses arguments, installs logging and runs one replay.
///
/// # Returns
///
/// `Ok(())` once the event stream has been replayed, or the first error
/// from configuration, logging setup or reading the stream. Events the
/// hierarchy rejects are counted and reported, not returned.
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();
    let config_path = args.config_path.clone();
    let json_logs = args.json_logs;

    let app = Application::new(args)?;
    logging::setup_logging(&app.config().logging, json_logs)?;
    info!("Configuration loaded from {}", config_path.display());

    let summary = app.run().await?;
    if summary.failed > 0 {
        warn!("{} events were rejected by the hierarchy", summary.failed);
    }
    Ok(())
}
