//! JSON-RPC 2.0 error objects produced by the gateway itself.
//!
//! Errors relayed from a backend are passed through as raw JSON and never
//! pass through these types.

use serde::{Deserialize, Serialize};

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code (standard JSON-RPC or gateway-specific)
    pub code: i32,

    /// Human-readable error message
    pub message: String,

    /// Additional error data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ErrorData>,
}

/// Additional error context attached to gateway-generated errors.
///
/// Every field is safe to hand to a client: no credentials, no
/// configuration secrets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    /// Identifier for finding this error in the gateway log
    pub correlation_id: String,

    /// Machine-readable error type name
    pub error_type: String,

    /// Backend the failing call was routed to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Type-specific details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// HTTP status returned by an HTTP backend
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,

    /// Response body returned by an HTTP backend alongside a non-2xx status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}
