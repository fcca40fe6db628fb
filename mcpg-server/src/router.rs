//! Route table.
//!
//! - `GET /health`: unauthenticated
//! - `POST /mcp` (unified) or `POST /mcp/{name}` (routed): authenticated
//! - `POST /close`: authenticated
//!
//! Anything else, including OAuth discovery probes, is 404.

use axum::Router;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::auth::require_api_key;
use crate::close::close_handler;
use crate::dispatch::{routed, unified};
use crate::health::health_handler;
use crate::state::{AppState, GatewayMode};

pub fn build_router(state: AppState) -> Router {
    let mcp = match state.mode {
        GatewayMode::Routed => Router::new().route("/mcp/{name}", post(routed::handle)),
        GatewayMode::Unified => Router::new().route("/mcp", post(unified::handle)),
    };

    let protected = mcp
        .route("/close", post(close_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health_handler))
        .merge(protected)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}
