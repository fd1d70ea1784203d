//! # Termination signals.
//!
//! [`wait_for_shutdown_signal`] completes on the first of:
//! - unix: `SIGINT`, `SIGTERM`, `SIGQUIT`;
//! - elsewhere: Ctrl-C.
//!
//! Listeners are registered per call, so the bootstrap can be run more than
//! once in the same process.

use tracing::debug;

/// Waits for a termination signal.
///
/// Returns `Err` if a listener cannot be registered.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    let name = tokio::select! {
        _ = sigint.recv() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sigquit.recv() => "SIGQUIT",
    };
    debug!(signal = name, "termination signal received");
    Ok(())
}

/// Waits for a termination signal.
///
/// Returns `Err` if the Ctrl-C listener cannot be registered.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await?;
    debug!(signal = "ctrl_c", "termination signal received");
    Ok(())
}
