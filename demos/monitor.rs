//! Connect to a running Open Ephys GUI and log everything it streams.
//!
//! ```text
//! cargo run --example monitor -- [config.yaml]
//! RUST_LOG=ephys_link=debug cargo run --example monitor
//! ```
//!
//! Every five seconds the monitor also toggles a TTL line on the controller.

use anyhow::{Context, Result};
use ephys_link::{EphysLink, LinkConfig, LinkError, LoggingConsumer, OutgoingCommand};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const CYCLE: Duration = Duration::from_millis(10);
const TTL_EVERY: Duration = Duration::from_secs(5);

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => LinkConfig::from_file(&path).with_context(|| format!("loading {}", path))?,
        None => LinkConfig::default(),
    };
    info!(
        data = %config.data_endpoint,
        command = %config.command_endpoint,
        channels = config.channel_count,
        "Starting monitor"
    );

    let mut engine = EphysLink::connect(config, LoggingConsumer::new())?;
    let mut cycle = tokio::time::interval(CYCLE);
    let mut ttl = tokio::time::interval(TTL_EVERY);
    let mut ttl_id = 0i64;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cycle.tick() => {
                if let Err(e) = engine.run_cycle().await {
                    report(&e)?;
                }
            }
            _ = ttl.tick() => {
                ttl_id += 1;
                match engine.send_event(&OutgoingCommand::ttl(ttl_id, 1)).await {
                    Ok(()) => info!(event_id = ttl_id, "TTL sent"),
                    Err(e) => report(&e)?,
                }
            }
        }
    }

    info!(frames = engine.consumer().frames(), "Shutting down");
    engine.close().await;
    Ok(())
}

fn report(e: &LinkError) -> Result<()> {
    if e.is_retryable() {
        warn!(error = %e, "Recoverable failure");
        return Ok(());
    }
    error!(error = %e, "Giving up");
    for suggestion in e.recovery_suggestions() {
        error!("  - {}", suggestion);
    }
    Err(anyhow::anyhow!("{}", e))
}
