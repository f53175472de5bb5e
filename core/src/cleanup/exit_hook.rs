//! Process-exit signals: the native counterpart of a page unload.

use tracing::debug;

/// Resolves on Ctrl-C, or on SIGTERM where available. Never resolves if no
/// signal handler can be installed.
pub(crate) async fn wait_for_exit_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = term.recv() => {}
                }
                return;
            }
            Err(e) => debug!("SIGTERM handler unavailable: {}", e),
        }
    }

    ctrl_c().await;
}

async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        debug!("Ctrl-C handler unavailable: {}", e);
        std::future::pending::<()>().await;
    }
}
