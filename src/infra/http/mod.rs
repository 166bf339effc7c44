mod admin;
mod middleware;
mod public;

pub use admin::{CacheTarget, INVALIDATE_PATH, WARMUP_PATH, WarmupSummary};
pub use middleware::RequestContext;
pub use public::{HttpState, build_router};

use std::{future::IntoFuture, net::SocketAddr, time::Duration};

use tokio::{net::TcpListener, sync::watch};
use tracing::{info, warn};

use super::error::InfraError;

/// Serve the sitemap surface until ctrl-c, then drain in-flight requests for at most `grace`.
pub async fn serve(addr: SocketAddr, state: HttpState, grace: Duration) -> Result<(), InfraError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|err| InfraError::bind(addr, err))?;
    info!(target = "sitemill::http", %addr, "Listening for sitemap requests");

    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = axum::serve(listener, build_router(state).into_make_service())
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            let _ = stop_tx.send(true);
        });

    tokio::select! {
        result = server.into_future() => result.map_err(InfraError::Serve),
        _ = async {
            if stop_rx.wait_for(|stopped| *stopped).await.is_ok() {
                tokio::time::sleep(grace).await;
            } else {
                std::future::pending::<()>().await;
            }
        } => {
            warn!(
                target = "sitemill::http",
                grace_secs = grace.as_secs(),
                "Graceful shutdown timed out; dropping open connections"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!(target = "sitemill::http", "Shutdown requested"),
        Err(err) => warn!(
            target = "sitemill::http",
            error = %err,
            "Failed to listen for ctrl-c; shutting down"
        ),
    }
}
