//! Error handling for the gateway.
//!
//! `GatewayError` covers every failure that can be reported to an MCP client
//! and maps each one to a JSON-RPC error code. Configuration problems have
//! their own type in [`crate::config::ConfigError`] because they stop the
//! process before any client is served.

pub mod jsonrpc;

use jsonrpc::{ErrorData, JsonRpcError};
use thiserror::Error;

/// Convenience alias used throughout the core crate.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// All request-path errors the gateway can produce.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GatewayError {
    // ─────────────────────────────────────────────────────────────────────
    // Protocol errors
    // ─────────────────────────────────────────────────────────────────────
    /// Request body is not valid JSON.
    #[error("Invalid JSON: {details}")]
    ParseError { details: String },

    /// Body is JSON but not a valid JSON-RPC 2.0 message.
    #[error("Invalid JSON-RPC request: {details}")]
    InvalidRequest { details: String },

    /// The method is not served by this endpoint.
    #[error("Method '{method}' not found")]
    MethodNotFound { method: String },

    /// Parameters are missing or have the wrong shape.
    #[error("Invalid parameters: {details}")]
    InvalidParams { details: String },

    // ─────────────────────────────────────────────────────────────────────
    // Routing errors
    // ─────────────────────────────────────────────────────────────────────
    /// No backend is configured under this name.
    #[error("Unknown backend '{name}'")]
    UnknownBackend { name: String },

    /// A namespaced tool, resource or prompt does not resolve to a registered capability.
    #[error("Unknown {kind} '{name}'")]
    UnknownCapability { kind: &'static str, name: String },

    // ─────────────────────────────────────────────────────────────────────
    // Backend errors
    // ─────────────────────────────────────────────────────────────────────
    /// Backend exists but is not serving requests.
    #[error("backend '{backend}' is not ready ({state})")]
    BackendUnavailable { backend: String, state: String },

    /// The handshake with a backend failed.
    #[error("FAILED to connect to backend '{backend}': {reason}")]
    BackendConnect { backend: String, reason: String },

    /// Subprocess crash, broken pipe, or network failure mid-flight.
    #[error("transport error on backend '{backend}': {reason}")]
    Transport { backend: String, reason: String },

    /// Backend did not answer within the call deadline.
    #[error("backend '{backend}' did not respond to '{method}' within {timeout_secs}s")]
    Timeout {
        backend: String,
        method: String,
        timeout_secs: u64,
    },

    /// An HTTP backend answered with a non-success status.
    #[error("backend '{backend}' returned HTTP {status}")]
    UpstreamStatus {
        backend: String,
        status: u16,
        body: String,
    },

    /// The gateway has been closed through `/close`.
    #[error("gateway is closed")]
    Closed,

    /// Internal failure that should not happen.
    #[error("Internal error: {details}")]
    Internal { details: String },
}

impl GatewayError {
    /// Maps the error to a JSON-RPC 2.0 error code.
    ///
    /// Standard codes (-32700 to -32603) cover protocol and routing errors;
    /// -32000 to -32002 are gateway-specific.
    pub fn to_jsonrpc_code(&self) -> i32 {
        match self {
            Self::ParseError { .. } => -32700,
            Self::InvalidRequest { .. } => -32600,
            Self::MethodNotFound { .. }
            | Self::UnknownBackend { .. }
            | Self::UnknownCapability { .. } => -32601,
            Self::InvalidParams { .. } => -32602,
            Self::Internal { .. } => -32603,

            Self::BackendUnavailable { .. }
            | Self::BackendConnect { .. }
            | Self::Transport { .. }
            | Self::Closed => -32000,
            Self::Timeout { .. } => -32001,
            Self::UpstreamStatus { .. } => -32002,
        }
    }

    /// Machine-readable name used in `data.errorType` and in logs.
    pub fn error_type_name(&self) -> &'static str {
        match self {
            Self::ParseError { .. } => "parse_error",
            Self::InvalidRequest { .. } => "invalid_request",
            Self::MethodNotFound { .. } => "method_not_found",
            Self::InvalidParams { .. } => "invalid_params",
            Self::UnknownBackend { .. } => "unknown_backend",
            Self::UnknownCapability { .. } => "unknown_capability",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::BackendConnect { .. } => "backend_connect",
            Self::Transport { .. } => "transport_error",
            Self::Timeout { .. } => "timeout",
            Self::UpstreamStatus { .. } => "upstream_status",
            Self::Closed => "gateway_closed",
            Self::Internal { .. } => "internal_error",
        }
    }

    /// Backend the error is attributed to, if any.
    pub fn backend(&self) -> Option<&str> {
        match self {
            Self::UnknownBackend { name } => Some(name),
            Self::BackendUnavailable { backend, .. }
            | Self::BackendConnect { backend, .. }
            | Self::Transport { backend, .. }
            | Self::Timeout { backend, .. }
            | Self::UpstreamStatus { backend, .. } => Some(backend),
            _ => None,
        }
    }

    /// True for routing failures that the routed frontend reports as HTTP 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::UnknownBackend { .. })
    }

    /// Converts to a JSON-RPC error object.
    pub fn to_jsonrpc_error(&self, correlation_id: &str) -> JsonRpcError {
        let (status, body) = match self {
            Self::UpstreamStatus { status, body, .. } => (Some(*status), Some(body.clone())),
            _ => (None, None),
        };
        let details = match self {
            Self::Transport { reason, .. } | Self::BackendConnect { reason, .. } => {
                Some(reason.clone())
            }
            _ => None,
        };

        JsonRpcError {
            code: self.to_jsonrpc_code(),
            message: self.to_string(),
            data: Some(ErrorData {
                correlation_id: correlation_id.to_string(),
                error_type: self.error_type_name().to_string(),
                backend: self.backend().map(str::to_string),
                details,
                status,
                body,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_codes() {
        let cases = [
            (
                GatewayError::ParseError {
                    details: "x".into(),
                },
                -32700,
            ),
            (
                GatewayError::InvalidRequest {
                    details: "x".into(),
                },
                -32600,
            ),
            (
                GatewayError::MethodNotFound {
                    method: "x".into(),
                },
                -32601,
            ),
            (
                GatewayError::InvalidParams {
                    details: "x".into(),
                },
                -32602,
            ),
            (
                GatewayError::Internal {
                    details: "x".into(),
                },
                -32603,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.to_jsonrpc_code(), code, "{err}");
        }
    }

    #[test]
    fn test_routing_errors_are_method_not_found() {
        let err = GatewayError::UnknownCapability {
            kind: "tool",
            name: "nope___t".into(),
        };
        assert_eq!(err.to_jsonrpc_code(), -32601);
        assert!(!err.is_not_found());

        let err = GatewayError::UnknownBackend {
            name: "ghost".into(),
        };
        assert_eq!(err.to_jsonrpc_code(), -32601);
        assert!(err.is_not_found());
    }

    #[test]
    fn test_backend_codes() {
        let timeout = GatewayError::Timeout {
            backend: "b".into(),
            method: "tools/call".into(),
            timeout_secs: 30,
        };
        assert_eq!(timeout.to_jsonrpc_code(), -32001);
        assert_eq!(
            timeout.to_string(),
            "backend 'b' did not respond to 'tools/call' within 30s"
        );

        let closed = GatewayError::Closed;
        assert_eq!(closed.to_jsonrpc_code(), -32000);
    }

    #[test]
    fn test_upstream_status_preserves_body() {
        let err = GatewayError::UpstreamStatus {
            backend: "remote".into(),
            status: 503,
            body: "{\"detail\":\"maintenance\"}".into(),
        };
        let rpc = err.to_jsonrpc_error("cid");
        assert_eq!(rpc.code, -32002);
        let data = rpc.data.unwrap();
        assert_eq!(data.status, Some(503));
        assert_eq!(data.body.as_deref(), Some("{\"detail\":\"maintenance\"}"));
        assert_eq!(data.backend.as_deref(), Some("remote"));
        assert_eq!(data.error_type, "upstream_status");
    }

    #[test]
    fn test_transport_error_carries_reason() {
        let err = GatewayError::Transport {
            backend: "fs".into(),
            reason: "process exited".into(),
        };
        let rpc = err.to_jsonrpc_error("cid");
        assert_eq!(rpc.code, -32000);
        assert_eq!(rpc.data.unwrap().details.as_deref(), Some("process exited"));
    }
}
