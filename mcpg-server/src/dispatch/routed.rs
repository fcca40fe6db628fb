//! Routed mode: one backend per `POST /mcp/{name}`.
//!
//! `initialize`, `ping` and notifications are answered locally and
//! `tools/list` is served from the backend's registry. Everything else is
//! forwarded unchanged.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use std::sync::Arc;
use serde_json::json;
use tracing::{debug, warn};

use mcpg_core::backend::{BackendConnection, BackendState};
use mcpg_core::jsonrpc::JsonRpcRequest;
use mcpg_core::registry::{CapabilityKind, ListingView, Registry};
use mcpg_core::transport::Reply;
use mcpg_core::{GatewayError, GatewayResult};

use super::{Inbound, error_response, finish, initialize_result, local, screen};
use crate::state::AppState;
use crate::streaming::{self, ResponsePreference};

pub async fn handle(
    State(state): State<AppState>,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let preference = ResponsePreference::from_headers(&headers);
    let backend = match state.manager.require(&name) {
        Ok(backend) => backend.clone(),
        Err(e) => {
            warn!(backend = %name, "request for unknown backend");
            return error_response(None, &e, preference, StatusCode::NOT_FOUND);
        }
    };

    let request = match screen(&state, &headers, &body) {
        Inbound::Request(request) => request,
        Inbound::Notification(notification) => {
            if let Err(e) = backend.forward_notification(notification).await {
                debug!(backend = %name, error = %e, "failed to forward notification");
            }
            return streaming::accepted();
        }
        Inbound::Done(response) => return response,
    };

    let id = request.id.clone();
    let method = request.method.clone();
    let outcome = dispatch(&state, &backend, request).await;
    finish(id, &method, outcome, preference)
}

async fn dispatch(
    state: &AppState,
    backend: &BackendConnection,
    request: JsonRpcRequest,
) -> GatewayResult<Reply> {
    match request.method.as_str() {
        "initialize" => Ok(local(
            &request,
            initialize_result(&format!("mcpg-{}", backend.name())),
        )),
        "ping" => Ok(local(&request, json!({}))),
        "tools/list" => {
            let registry = match state.manager.registry().backend(backend.name()) {
                Some(registry) => registry,
                None if backend.state() == BackendState::Ready => Arc::new(Registry::default()),
                None => {
                    return Err(GatewayError::BackendUnavailable {
                        backend: backend.name().to_string(),
                        state: backend.state().to_string(),
                    });
                }
            };
            Ok(local(
                &request,
                registry.listing(CapabilityKind::Tool, ListingView::Routed),
            ))
        }
        _ => backend.call(request).await,
    }
}
