//! OS signal handling.
//!
//! # Responsibilities
//! - Listen for SIGTERM/SIGINT (Ctrl-C on non-Unix)
//! - Translate every signal into a [`Shutdown`] trigger
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - The first signal starts the drain, a second one forces it to finish

use crate::lifecycle::Shutdown;

/// Resolve on the next termination signal.
pub async fn termination_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::select! {
            _ = sigterm.recv() => Ok("SIGTERM"),
            _ = sigint.recv() => Ok("SIGINT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}

/// Forward termination signals to `shutdown` until signal handling fails.
pub fn spawn_signal_forwarder(shutdown: Shutdown) {
    tokio::spawn(async move {
        loop {
            match termination_signal().await {
                Ok(name) => {
                    tracing::info!(signal = name, "Shutdown signal received");
                    shutdown.trigger();
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install signal handler");
                    break;
                }
            }
        }
    });
}
