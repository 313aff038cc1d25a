/* deckd — user-space manager daemon for a 14-button USB-HID stream deck.
 * Owns the sole HID connection to the device and mediates between it and
 * local clients connected over a Unix domain socket. */

mod command;
mod config;
mod daemon;
mod error;
mod events;
mod frame;
mod hid;
mod manifest;
mod mitigate;
mod page;
mod server;
mod telemetry;
mod zip;

use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::daemon::Daemon;

fn init_logging(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn install_signal_handler(running: Arc<AtomicBool>) -> anyhow::Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::Relaxed);
    })
    .map_err(|e| anyhow::anyhow!("failed to install signal handler: {e}"))
}

fn main() -> ExitCode {
    let config = Config::from_env();
    init_logging(config.debug);

    let running = Arc::new(AtomicBool::new(true));
    if let Err(e) = install_signal_handler(Arc::clone(&running)) {
        tracing::error!(error = %e, "failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let mut daemon = match Daemon::new(config, running) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(error = %e, "fatal error during daemon init");
            return ExitCode::FAILURE;
        }
    };

    match daemon.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "daemon exited with error");
            ExitCode::FAILURE
        }
    }
}
