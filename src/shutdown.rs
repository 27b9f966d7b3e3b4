use std::time::Duration;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::{CancellationToken, DropGuard};

/// Install a shutdown handler that listens for SIGTERM and SIGINT.
///
/// Returns a `CancellationToken` that is cancelled when either signal is received.
/// The run stops launching triggers and writes whatever it has collected.
pub fn install_shutdown_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(term), Ok(int)) => (term, int),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "Failed to install signal handlers");
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM, stopping after in-flight triggers");
            }
            _ = sigint.recv() => {
                tracing::info!("Received SIGINT, stopping after in-flight triggers");
            }
        }

        token_clone.cancel();
    });

    token
}

/// Cancel `token` once `timeout` elapses.
///
/// The timer stops when the returned guard is dropped.
#[must_use = "dropping the guard stops the deadline timer"]
pub fn cancel_after(token: &CancellationToken, timeout: Duration) -> DropGuard {
    let token = token.clone();
    let stop = CancellationToken::new();
    let guard = stop.clone().drop_guard();
    tokio::spawn(async move {
        tokio::select! {
            _ = token.cancelled() => {}
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(timeout) => {
                tracing::warn!(timeout_secs = timeout.as_secs_f64(), "Run deadline reached");
                token.cancel();
            }
        }
    });
    guard
}
