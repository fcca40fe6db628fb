//! Owns every backend connection for the lifetime of the gateway.
//!
//! Startup makes exactly one attempt per backend, all in parallel. Each
//! attempt is bounded by the configured startup timeout; a backend that
//! fails or times out is left Failed and never retried. Startup settles
//! when every attempt has resolved.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{info, warn};

use super::connection::BackendConnection;
use crate::config::GatewayConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::registry::{CapabilityRegistry, Registry};
use crate::transport::TransportConnector;

/// Outcome of [`BackendManager::start_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StartupSummary {
    pub ready: usize,
    pub failed: usize,
}

pub struct BackendManager {
    connections: Vec<Arc<BackendConnection>>,
    index: HashMap<String, usize>,
    connector: Arc<dyn TransportConnector>,
    registry: Arc<CapabilityRegistry>,
    startup_timeout: Duration,
    closing: AtomicBool,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl BackendManager {
    pub fn new(config: &GatewayConfig, connector: Arc<dyn TransportConnector>) -> Self {
        let connections: Vec<Arc<BackendConnection>> = config
            .servers
            .iter()
            .map(|def| Arc::new(BackendConnection::new(def.clone(), config.gateway.tool_timeout)))
            .collect();
        let index = connections
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name().to_string(), i))
            .collect();
        let registry = Arc::new(CapabilityRegistry::new(
            config.server_names().map(str::to_string).collect(),
        ));
        Self {
            connections,
            index,
            connector,
            registry,
            startup_timeout: config.gateway.startup_timeout,
            closing: AtomicBool::new(false),
            watchers: Mutex::new(Vec::new()),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BackendConnection>> {
        self.index.get(name).map(|&i| &self.connections[i])
    }

    /// Look up a backend for routing.
    ///
    /// # Errors
    ///
    /// `UnknownBackend` if no backend has this name.
    pub fn require(&self, name: &str) -> GatewayResult<&Arc<BackendConnection>> {
        self.get(name).ok_or_else(|| GatewayError::UnknownBackend {
            name: name.to_string(),
        })
    }

    /// Backends in configuration order.
    pub fn connections(&self) -> &[Arc<BackendConnection>] {
        &self.connections
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.connections.iter().map(|c| c.name())
    }

    /// True once every backend finished its startup attempt.
    pub fn is_settled(&self) -> bool {
        self.connections.iter().all(|c| c.state().is_settled())
    }

    /// Connect every backend concurrently and publish their capabilities.
    pub async fn start_all(&self) -> StartupSummary {
        let mut attempts = JoinSet::new();
        for conn in &self.connections {
            let conn = conn.clone();
            let connector = self.connector.clone();
            let registry = self.registry.clone();
            let timeout = self.startup_timeout;
            attempts.spawn(async move { start_one(conn, connector, registry, timeout).await });
        }

        let mut summary = StartupSummary::default();
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(Some(conn)) => {
                    summary.ready += 1;
                    self.watch_exit(conn);
                }
                Ok(None) => summary.failed += 1,
                Err(e) => {
                    warn!(error = %e, "backend startup task panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            ready = summary.ready,
            failed = summary.failed,
            "backend startup complete"
        );
        summary
    }

    /// Move a Ready backend to Failed when its transport dies.
    fn watch_exit(&self, conn: Arc<BackendConnection>) {
        let Some(mut exit_rx) = conn.exit_signal() else {
            return;
        };
        let handle = tokio::spawn(async move {
            loop {
                let reason = exit_rx.borrow_and_update().clone();
                if let Some(reason) = reason {
                    conn.mark_failed(reason);
                    return;
                }
                if exit_rx.changed().await.is_err() {
                    return;
                }
            }
        });
        self.watchers.lock().push(handle);
    }

    /// Terminate every backend. Only the first call does any work; it
    /// returns how many live transports were released.
    pub async fn close_all(&self) -> usize {
        if self.closing.swap(true, Ordering::AcqRel) {
            return 0;
        }
        for watcher in self.watchers.lock().drain(..) {
            watcher.abort();
        }

        let mut closing = JoinSet::new();
        for conn in &self.connections {
            let conn = conn.clone();
            closing.spawn(async move { conn.close().await });
        }
        let mut terminated = 0;
        while let Some(joined) = closing.join_next().await {
            if matches!(joined, Ok(true)) {
                terminated += 1;
            }
        }
        info!(terminated, "all backends stopped");
        terminated
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }
}

/// One startup attempt. Returns the connection if it reached Ready.
async fn start_one(
    conn: Arc<BackendConnection>,
    connector: Arc<dyn TransportConnector>,
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
) -> Option<Arc<BackendConnection>> {
    let discovery = match tokio::time::timeout(timeout, conn.connect(connector.as_ref())).await {
        Ok(Ok(discovery)) => discovery,
        Ok(Err(_)) => return None,
        Err(_) => {
            conn.mark_failed(format!(
                "startup did not complete within {}s",
                timeout.as_secs()
            ));
            conn.release_transport().await;
            return None;
        }
    };

    let name = conn.name().to_string();
    registry.publish(&name, Registry::from_discovery(&name, &discovery));
    match conn.mark_ready() {
        Ok(()) => Some(conn),
        Err(e) => {
            warn!(backend = %name, error = %e, "backend stopped during startup");
            None
        }
    }
}
