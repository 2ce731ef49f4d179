//! OS signal handling.

use renderq_models::Shutdown;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::WorkerResult;

/// Trigger `shutdown` on every SIGINT or SIGTERM.
///
/// Only the first signal is logged at info; later ones are no-ops. The
/// handlers are registered before this returns, so a signal delivered right
/// after the call is never lost.
pub fn listen_for_signals(shutdown: Shutdown) -> WorkerResult<JoinHandle<()>> {
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    Ok(tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                received = sigint.recv() => match received {
                    Some(()) => "SIGINT",
                    None => break,
                },
                received = sigterm.recv() => match received {
                    Some(()) => "SIGTERM",
                    None => break,
                },
            };

            if shutdown.trigger() {
                info!("Received {}, finishing current task and shutting down", name);
            } else {
                debug!("Received {} again, shutdown already in progress", name);
            }
        }
    }))
}
