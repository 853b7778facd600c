//! Process shutdown handling

use std::future::Future;
use tracing::{error, info};

/// Resolve on Ctrl+C or SIGTERM
pub async fn signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

/// Drive `work` to completion unless `shutdown` resolves first
///
/// `shutdown` is borrowed so one signal future can guard several phases.
pub async fn or_shutdown<F, S>(work: F, shutdown: &mut S) -> Option<F::Output>
where
    F: Future,
    S: Future<Output = ()> + Unpin,
{
    tokio::select! {
        output = work => Some(output),
        () = shutdown => None,
    }
}
