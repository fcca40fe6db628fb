//! Unified mode: every backend behind `POST /mcp`.
//!
//! Listings come straight from the merged registry snapshot. Invocations
//! are resolved by namespaced key, the prefix is stripped, and the call is
//! forwarded to the owning backend.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use bytes::Bytes;
use serde_json::{Value, json};
use tracing::debug;

use mcpg_core::{GatewayError, GatewayResult};
use mcpg_core::jsonrpc::JsonRpcRequest;
use mcpg_core::registry::{CapabilityKind, ListingView};
use mcpg_core::transport::Reply;

use super::{Inbound, finish, initialize_result, local, screen};
use crate::state::AppState;
use crate::streaming::{self, ResponsePreference};

pub const UNIFIED_SERVER_NAME: &str = "mcpg-unified";

pub async fn handle(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let preference = ResponsePreference::from_headers(&headers);
    let request = match screen(&state, &headers, &body) {
        Inbound::Request(request) => request,
        Inbound::Notification(notification) => {
            debug!(method = %notification.method, "notification accepted");
            return streaming::accepted();
        }
        Inbound::Done(response) => return response,
    };

    let id = request.id.clone();
    let method = request.method.clone();
    let outcome = dispatch(&state, request).await;
    finish(id, &method, outcome, preference)
}

async fn dispatch(state: &AppState, request: JsonRpcRequest) -> GatewayResult<Reply> {
    match request.method.as_str() {
        "initialize" => Ok(local(&request, initialize_result(UNIFIED_SERVER_NAME))),
        "ping" => Ok(local(&request, json!({}))),
        "tools/list" => Ok(listing(state, &request, CapabilityKind::Tool)),
        "resources/list" => Ok(listing(state, &request, CapabilityKind::Resource)),
        "prompts/list" => Ok(listing(state, &request, CapabilityKind::Prompt)),
        "resources/templates/list" => Ok(local(&request, json!({"resourceTemplates": []}))),
        "tools/call" => forward(state, request, CapabilityKind::Tool).await,
        "prompts/get" => forward(state, request, CapabilityKind::Prompt).await,
        "resources/read" => forward(state, request, CapabilityKind::Resource).await,
        other => Err(GatewayError::MethodNotFound {
            method: other.to_string(),
        }),
    }
}

fn listing(state: &AppState, request: &JsonRpcRequest, kind: CapabilityKind) -> Reply {
    let merged = state.manager.registry().merged();
    local(request, merged.listing(kind, ListingView::Unified))
}

/// Resolve a namespaced capability and forward the call to its owner with
/// the bare name substituted.
async fn forward(state: &AppState, mut request: JsonRpcRequest, kind: CapabilityKind) -> GatewayResult<Reply> {
    let field = kind.id_field();
    let key = request
        .param_str(field)
        .ok_or_else(|| GatewayError::InvalidParams {
            details: format!("params.{field} is required"),
        })?
        .to_string();

    let merged = state.manager.registry().merged();
    let capability = merged.resolve(kind, &key)?;
    let backend = state.manager.require(&capability.backend)?.clone();

    if let Some(Value::Object(params)) = request.params.as_mut() {
        params.insert(field.to_string(), Value::String(capability.name.clone()));
    }
    debug!(
        backend = %capability.backend,
        key = %key,
        name = %capability.name,
        "forwarding {kind}"
    );
    backend.call(request).await
}
