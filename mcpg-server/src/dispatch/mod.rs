//! JSON-RPC dispatch for the MCP endpoints.
//!
//! Both modes share the same envelope handling: parse the body, refuse work
//! once the gateway is closed, accept notifications with 202, and render
//! every outcome (backend reply or gateway error) with the client's id in
//! the framing the client asked for.

pub mod routed;
pub mod unified;

use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use serde_json::{Value, json};
use tracing::{debug, warn};

use mcpg_core::jsonrpc::{JsonRpcId, JsonRpcRequest, JsonRpcResponse, parse_request};
use mcpg_core::transport::Reply;
use mcpg_core::{GATEWAY_VERSION, GatewayError, MCP_PROTOCOL_VERSION};

use crate::state::AppState;
use crate::streaming::{self, ResponsePreference};

/// A request that passed envelope checks.
pub(crate) enum Inbound {
    Request(JsonRpcRequest),
    Notification(JsonRpcRequest),
    /// Already answered (parse error or closed gateway).
    Done(Response),
}

/// Parse and screen a body.
pub(crate) fn screen(state: &AppState, headers: &HeaderMap, body: &Bytes) -> Inbound {
    let preference = ResponsePreference::from_headers(headers);
    let request = match parse_request(body) {
        Ok(request) => request,
        Err(e) => {
            debug!(error = %e, "rejecting malformed request");
            return Inbound::Done(error_response(None, &e, preference, StatusCode::OK));
        }
    };

    if state.lifecycle.is_closed() {
        if request.is_notification() {
            return Inbound::Done(streaming::accepted());
        }
        return Inbound::Done(error_response(
            request.id.clone(),
            &GatewayError::Closed,
            preference,
            StatusCode::OK,
        ));
    }

    if request.is_notification() {
        Inbound::Notification(request)
    } else {
        Inbound::Request(request)
    }
}

/// Render a dispatch outcome.
pub(crate) fn finish(
    id: Option<JsonRpcId>,
    method: &str,
    outcome: Result<Reply, GatewayError>,
    preference: ResponsePreference,
) -> Response {
    match outcome {
        Ok(reply) => {
            debug!(method, framing = ?reply.framing, "relaying reply");
            streaming::respond(&reply.message, preference)
        }
        Err(e) => {
            warn!(method, error = %e, code = e.to_jsonrpc_code(), "request failed");
            let status = if e.is_not_found() {
                StatusCode::NOT_FOUND
            } else {
                StatusCode::OK
            };
            error_response(id, &e, preference, status)
        }
    }
}

pub(crate) fn error_response(
    id: Option<JsonRpcId>,
    error: &GatewayError,
    preference: ResponsePreference,
    status: StatusCode,
) -> Response {
    let correlation_id = uuid::Uuid::new_v4().to_string();
    let message = JsonRpcResponse::error(id, error.to_jsonrpc_error(&correlation_id)).into_value();
    streaming::respond_with_status(status, &message, preference)
}

/// A locally produced success reply.
pub(crate) fn local(request: &JsonRpcRequest, result: Value) -> Reply {
    Reply::json(JsonRpcResponse::success(request.id.clone(), result).into_value())
}

/// `initialize` answered by the gateway itself.
pub(crate) fn initialize_result(server_name: &str) -> Value {
    json!({
        "protocolVersion": MCP_PROTOCOL_VERSION,
        "capabilities": {
            "tools": {"listChanged": false},
            "resources": {"listChanged": false},
            "prompts": {"listChanged": false},
        },
        "serverInfo": {"name": server_name, "version": GATEWAY_VERSION},
    })
}
