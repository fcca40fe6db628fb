//! `/health`: gateway status plus one entry per configured backend.
//!
//! Always answers 200. The overall `status` only turns `healthy` once
//! every backend finished its startup attempt and the gateway is not closed.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use mcpg_core::GATEWAY_VERSION;
use mcpg_core::backend::{BackendConnection, BackendState};

use crate::state::{AppState, GatewayState};

/// Version of the gateway HTTP contract reported as `specVersion`.
pub const GATEWAY_SPEC_VERSION: &str = "1.0.0";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    /// "healthy" or "unhealthy"
    pub status: &'static str,
    pub spec_version: &'static str,
    pub gateway_version: &'static str,
    pub servers: BTreeMap<String, ServerHealth>,
}

#[derive(Debug, Serialize)]
pub struct ServerHealth {
    /// "running", "starting", "error" or "stopped"
    pub status: &'static str,
    pub state: &'static str,
    pub tools: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let response = build_health(&state);
    debug!(status = response.status, servers = response.servers.len(), "health check");
    Json(response)
}

pub fn build_health(state: &GatewayState) -> HealthResponse {
    let registry = state.manager.registry();
    let servers = state
        .manager
        .connections()
        .iter()
        .map(|conn| {
            let health = server_health(conn, registry.tool_count(conn.name()));
            (conn.name().to_string(), health)
        })
        .collect();

    let healthy = state.manager.is_settled() && !state.lifecycle.is_closed();
    HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" },
        spec_version: GATEWAY_SPEC_VERSION,
        gateway_version: GATEWAY_VERSION,
        servers,
    }
}

fn server_health(conn: &BackendConnection, tools: usize) -> ServerHealth {
    let state = conn.state();
    let status = match state {
        BackendState::Ready => "running",
        BackendState::Failed => "error",
        BackendState::Stopped => "stopped",
        BackendState::Disconnected | BackendState::Connecting | BackendState::Initializing => {
            "starting"
        }
    };
    ServerHealth {
        status,
        state: state.as_str(),
        tools,
        error: conn.error(),
    }
}
