//! Listener binding and graceful serving.

use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::router::build_router;
use crate::state::AppState;

/// Bind the listener. Done before backends start so a taken port fails fast.
pub async fn bind(addr: &str) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "listening");
    Ok(listener)
}

/// Serve the gateway on `listener` until `shutdown` fires.
///
/// Returns the bound address (useful with port 0) and the server task.
pub fn spawn(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> io::Result<(SocketAddr, JoinHandle<()>)> {
    let addr = listener.local_addr()?;
    let app = build_router(state);
    let handle = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown.cancelled().await;
                info!("HTTP server shutting down");
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "HTTP server failed");
        }
    });
    Ok((addr, handle))
}
