//! Shutdown signal handling.
//!
//! The first SIGINT, SIGTERM or SIGHUP cancels a [`CancellationToken`]; the
//! sync loop stops taking new entries once it sees the cancellation. A second
//! signal exits immediately.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Exit status for a forced exit, matching the shell convention for SIGINT.
const FORCE_EXIT_CODE: i32 = 130;

/// Spawn the signal listener and return the token it cancels.
pub(crate) fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let count = Arc::new(AtomicU32::new(0));

    let handler_token = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut extra = {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::terminate()),
                signal(SignalKind::hangup()),
            ) {
                (Ok(term), Ok(hup)) => Some((term, hup)),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::warn!(error = %e, "Only Ctrl+C will trigger a graceful shutdown");
                    None
                }
            }
        };

        loop {
            #[cfg(unix)]
            let received = match extra.as_mut() {
                Some((term, hup)) => tokio::select! {
                    r = tokio::signal::ctrl_c() => r.is_ok(),
                    _ = term.recv() => true,
                    _ = hup.recv() => true,
                },
                None => tokio::signal::ctrl_c().await.is_ok(),
            };

            #[cfg(not(unix))]
            let received = tokio::signal::ctrl_c().await.is_ok();

            if !received {
                tracing::warn!("Cannot listen for Ctrl+C; graceful shutdown disabled");
                return;
            }

            if count.fetch_add(1, Ordering::SeqCst) == 0 {
                tracing::info!("Received shutdown signal, finishing the current file...");
                tracing::info!("Press Ctrl+C again to force exit");
                handler_token.cancel();
            } else {
                tracing::warn!("Force exit requested");
                std::process::exit(FORCE_EXIT_CODE);
            }
        }
    });

    token
}
