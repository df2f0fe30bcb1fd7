//! Interrupt handling for SIGTERM and SIGINT.
//!
//! A signal cancels the returned token; the pipeline reacts at its next
//! cancellation point and still restarts any stack it stopped.

use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancel `token` on the first SIGINT or SIGTERM.
pub async fn wait_for_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received SIGINT (Ctrl+C), stopping after the current step...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, stopping after the current step...");
        }
        _ = token.cancelled() => return,
    }

    token.cancel();
    info!("Cancellation requested; stacks stopped by this run will be restarted");
}

/// Spawn the signal watcher and return the token it cancels.
pub fn install() -> CancellationToken {
    let token = CancellationToken::new();
    tokio::spawn(wait_for_signal(token.clone()));
    token
}
