//! `/close`: terminate every backend.
//!
//! The first call stops all backends; later calls answer with the same shape
//! and `serversTerminated: 0`.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::{info, warn};

use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub servers_terminated: usize,
}

pub async fn close_handler(State(state): State<AppState>) -> Json<CloseResponse> {
    if state.lifecycle.is_closed() {
        warn!("close requested but gateway is already closed");
    }
    let servers_terminated = state.shutdown().await;
    info!(servers_terminated, "Gateway shutdown initiated");
    Json(CloseResponse {
        status: "closed",
        message: "Gateway shutdown initiated",
        servers_terminated,
    })
}
