//! Shared state behind every handler.

use std::fmt;
use std::sync::Arc;

use mcpg_core::backend::BackendManager;
use mcpg_core::lifecycle::Lifecycle;
use mcpg_core::session::ApiKey;

/// How backends are exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayMode {
    /// One endpoint per backend at `/mcp/{name}`.
    Routed,
    /// One merged endpoint at `/mcp`.
    #[default]
    Unified,
}

impl GatewayMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Routed => "routed",
            Self::Unified => "unified",
        }
    }
}

impl fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct GatewayState {
    pub manager: Arc<BackendManager>,
    pub lifecycle: Arc<Lifecycle>,
    pub api_key: ApiKey,
    pub mode: GatewayMode,
}

impl GatewayState {
    pub fn new(
        manager: Arc<BackendManager>,
        lifecycle: Arc<Lifecycle>,
        api_key: ApiKey,
        mode: GatewayMode,
    ) -> AppState {
        Arc::new(Self {
            manager,
            lifecycle,
            api_key,
            mode,
        })
    }

    /// Stop every backend once. Later calls report zero.
    pub async fn shutdown(&self) -> usize {
        if !self.lifecycle.begin_close() {
            return 0;
        }
        self.manager.close_all().await
    }
}

pub type AppState = Arc<GatewayState>;
