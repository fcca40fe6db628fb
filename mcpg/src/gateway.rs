//! Process orchestration.
//!
//! Bind first, then start backends while the server already answers
//! `/health`, print the configuration document once startup settles, and
//! run until SIGINT or SIGTERM.

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use mcpg_core::backend::BackendManager;
use mcpg_core::config::GatewayConfig;
use mcpg_core::lifecycle::Lifecycle;
use mcpg_core::session::ApiKey;
use mcpg_core::transport::{DefaultConnector, TransportConnector};
use mcpg_server::emitter::{build_document, write_document};
use mcpg_server::{GatewayMode, GatewayState, serve};

use crate::error::CliError;

/// Inputs to one gateway run.
pub struct RunOptions {
    pub config: GatewayConfig,
    pub listen: String,
    pub mode: GatewayMode,
}

pub async fn run(options: RunOptions) -> Result<(), CliError> {
    run_with(options, Arc::new(DefaultConnector)).await
}

pub async fn run_with(
    options: RunOptions,
    connector: Arc<dyn TransportConnector>,
) -> Result<(), CliError> {
    let RunOptions {
        config,
        listen,
        mode,
    } = options;

    let listener = serve::bind(&listen).await.map_err(|source| CliError::Bind {
        addr: listen.clone(),
        source,
    })?;

    let manager = Arc::new(BackendManager::new(&config, connector));
    let lifecycle = Arc::new(Lifecycle::new());
    let state = GatewayState::new(
        manager.clone(),
        lifecycle.clone(),
        ApiKey::new(config.gateway.api_key.clone()),
        mode,
    );

    let shutdown = CancellationToken::new();
    setup_signal_handlers(shutdown.clone());
    let (addr, server) = serve::spawn(listener, state.clone(), shutdown.clone())?;
    info!(
        addr = %addr,
        mode = %mode,
        backends = config.servers.len(),
        auth = state.api_key.is_enabled(),
        "gateway started"
    );

    let started = tokio::select! {
        summary = manager.start_all() => Some(summary),
        _ = shutdown.cancelled() => None,
    };

    if let Some(summary) = started {
        lifecycle.mark_settled();
        if summary.ready == 0 {
            warn!(failed = summary.failed, "no backend is ready");
        }
        let document = build_document(&config, addr, mode);
        write_document(&document, std::io::stdout().lock()).map_err(CliError::Emit)?;

        let closed = lifecycle.shutdown_token();
        tokio::select! {
            _ = shutdown.cancelled() => {}
            _ = closed.cancelled() => {
                info!("gateway closed, serving /health until signalled");
                shutdown.cancelled().await;
            }
        }
    }

    let terminated = state.shutdown().await;
    info!(terminated, "shutting down");
    if let Err(e) = server.await {
        error!(error = %e, "server task failed");
    }
    Ok(())
}

/// SIGINT and SIGTERM cancel `shutdown`.
fn setup_signal_handlers(shutdown: CancellationToken) {
    let shutdown_sigint = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, shutting down");
                shutdown_sigint.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    {
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, shutting down");
                    shutdown.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
            }
        });
    }

    #[cfg(not(unix))]
    let _ = shutdown;
}
