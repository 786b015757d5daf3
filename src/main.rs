/*!
 * sighook - Main Entry Point
 *
 * Holds the process open until a shutdown signal (or one of the signals
 * named on the command line) arrives, logging every delivery on the way.
 *
 * Usage: sighook [SIGNAL...]
 */

use miette::Result;
use tracing::info;

use sighook::{init_tracing, HandlerConfig, Signal, SignalHandler, SHUTDOWN_SIGNALS};

fn parse_signals(args: impl Iterator<Item = String>) -> Result<Vec<Signal>> {
    let signals = args
        .map(|arg| arg.parse::<Signal>())
        .collect::<Result<Vec<_>, _>>()?;

    if signals.is_empty() {
        Ok(SHUTDOWN_SIGNALS.to_vec())
    } else {
        Ok(signals)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let signals = parse_signals(std::env::args().skip(1))?;
    let config = HandlerConfig::from_env();
    info!(
        pid = std::process::id(),
        signals = ?signals,
        channel_capacity = config.channel_capacity,
        "sighook starting"
    );

    let handler = SignalHandler::with_config(config);
    handler.add(
        |signal| info!(signal = %signal, description = signal.description(), "Signal received"),
        &signals,
    );

    let received = if signals == SHUTDOWN_SIGNALS {
        handler.wait_for_shutdown().await
    } else {
        handler.wait(&signals).await
    };

    if let Some(signal) = received {
        info!(signal = %signal, "Stopping");
    }

    let stats = handler.stats();
    match serde_json::to_string_pretty(&stats) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::warn!(error = %e, "Failed to serialize stats"),
    }

    handler.shutdown();
    Ok(())
}
