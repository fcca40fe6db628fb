//! JSON-RPC 2.0 types, parsing and classification.
//!
//! # JSON-RPC 2.0 Compliance
//!
//! - Requests have `id`, `method`, and optional `params`
//! - Notifications are requests without `id`
//! - `id` type (string or integer) MUST be preserved in responses
//! - Batches are rejected: MCP does not use them
//!
//! Inbound HTTP bodies go through [`parse_request`]. Lines read from a stdio
//! backend and frames decoded from an SSE stream are already parsed into a
//! `Value` and go through [`classify_jsonrpc`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;

use crate::error::GatewayError;
use crate::error::jsonrpc::JsonRpcError;

/// JSON-RPC 2.0 version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC 2.0 request ID.
///
/// The exact type is preserved so that a response carries the same id type
/// as the request. Never coerce between types: a client that sends `"id": 1`
/// gets `"id": 1` back, not `"id": "1"`.
///
/// `Null` is an explicit `"id": null`, which is distinct from a missing `id`
/// (a notification).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JsonRpcId {
    /// Integer ID (e.g., `"id": 1`)
    Number(i64),
    /// String ID (e.g., `"id": "abc-123"`)
    String(String),
    /// Explicit null ID
    Null,
}

impl JsonRpcId {
    /// Render the id as a JSON value.
    pub fn to_value(&self) -> Value {
        match self {
            JsonRpcId::Number(n) => Value::from(*n),
            JsonRpcId::String(s) => Value::String(s.clone()),
            JsonRpcId::Null => Value::Null,
        }
    }

    /// Parse a JSON value into an id. Floats, booleans, arrays and objects are rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(JsonRpcId::Number),
            Value::String(s) => Some(JsonRpcId::String(s.clone())),
            Value::Null => Some(JsonRpcId::Null),
            _ => None,
        }
    }
}

impl fmt::Display for JsonRpcId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonRpcId::Number(n) => write!(f, "{n}"),
            JsonRpcId::String(s) => write!(f, "\"{s}\""),
            JsonRpcId::Null => f.write_str("null"),
        }
    }
}

impl From<i64> for JsonRpcId {
    fn from(n: i64) -> Self {
        JsonRpcId::Number(n)
    }
}

impl Serialize for JsonRpcId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            JsonRpcId::Number(n) => serializer.serialize_i64(*n),
            JsonRpcId::String(s) => serializer.serialize_str(s),
            JsonRpcId::Null => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for JsonRpcId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        JsonRpcId::from_value(&value).ok_or_else(|| {
            serde::de::Error::custom("JSON-RPC ID must be string, integer, or null")
        })
    }
}

/// Distinguishes a missing field from an explicit `null`.
#[derive(Debug, Clone, Default)]
enum MaybeNull<T> {
    #[default]
    Absent,
    Null,
    Present(T),
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for MaybeNull<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        if value.is_null() {
            Ok(MaybeNull::Null)
        } else {
            T::deserialize(value)
                .map(MaybeNull::Present)
                .map_err(serde::de::Error::custom)
        }
    }
}

/// Explicit `"id": null` becomes `Some(JsonRpcId::Null)`; an absent id stays `None`.
fn deserialize_optional_id<'de, D>(deserializer: D) -> Result<Option<JsonRpcId>, D::Error>
where
    D: Deserializer<'de>,
{
    match MaybeNull::deserialize(deserializer)? {
        MaybeNull::Absent => Ok(None),
        MaybeNull::Null => Ok(Some(JsonRpcId::Null)),
        MaybeNull::Present(id) => Ok(Some(id)),
    }
}

/// Wire shape before validation. Every field is optional so that a precise
/// error can be reported for malformed requests.
#[derive(Debug, Clone, Deserialize)]
struct RawJsonRpcRequest {
    jsonrpc: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    id: Option<JsonRpcId>,
    method: Option<String>,
    params: Option<Value>,
}

/// Validated JSON-RPC 2.0 request or notification.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID (None for notifications)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<JsonRpcId>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request that expects a response.
    pub fn new(id: impl Into<JsonRpcId>, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: Some(id.into()),
            method: method.into(),
            params,
        }
    }

    /// Build a notification.
    pub fn notification(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Returns true if this is a notification (no ID).
    #[inline]
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// String parameter lookup, e.g. `params.name` for `tools/call`.
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.as_ref()?.get(key)?.as_str()
    }
}

/// JSON-RPC 2.0 response built by the gateway itself.
///
/// The `id` field always serializes: `None` becomes `"id": null`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: Cow<'static, str>,
    /// Request ID (null if it could not be determined)
    pub id: Option<JsonRpcId>,
    /// Result (mutually exclusive with error)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (mutually exclusive with result)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response.
    pub fn success(id: Option<JsonRpcId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: Option<JsonRpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Serialize to a JSON value.
    pub fn into_value(self) -> Value {
        // Serialization of these types cannot fail: ids, strings and Values only.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Parse an inbound HTTP body into a single JSON-RPC request.
///
/// # Errors
///
/// - `ParseError` (-32700) for empty input or malformed JSON
/// - `InvalidRequest` (-32600) for batches, a missing or wrong `jsonrpc`
///   version, a missing `method`, or an id of the wrong type
pub fn parse_request(bytes: &[u8]) -> Result<JsonRpcRequest, GatewayError> {
    // Peek at the first non-whitespace byte to reject batches before parsing.
    let first_byte = bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .ok_or_else(|| GatewayError::ParseError {
            details: "empty input".to_string(),
        })?;

    match first_byte {
        b'{' => {
            let raw: RawJsonRpcRequest = serde_json::from_slice(bytes).map_err(|e| {
                if e.is_syntax() || e.is_eof() {
                    GatewayError::ParseError {
                        details: e.to_string(),
                    }
                } else {
                    GatewayError::InvalidRequest {
                        details: e.to_string(),
                    }
                }
            })?;
            validate_raw(raw)
        }
        b'[' => {
            // Still distinguish malformed JSON from a well-formed batch.
            serde_json::from_slice::<Value>(bytes).map_err(|e| GatewayError::ParseError {
                details: e.to_string(),
            })?;
            Err(GatewayError::InvalidRequest {
                details: "batch requests are not supported".to_string(),
            })
        }
        _ => match serde_json::from_slice::<Value>(bytes) {
            Ok(_) => Err(GatewayError::InvalidRequest {
                details: "request must be a JSON object".to_string(),
            }),
            Err(e) => Err(GatewayError::ParseError {
                details: e.to_string(),
            }),
        },
    }
}

fn validate_raw(raw: RawJsonRpcRequest) -> Result<JsonRpcRequest, GatewayError> {
    match raw.jsonrpc.as_deref() {
        Some(JSONRPC_VERSION) => {}
        Some(other) => {
            return Err(GatewayError::InvalidRequest {
                details: format!("unsupported jsonrpc version '{other}'"),
            });
        }
        None => {
            return Err(GatewayError::InvalidRequest {
                details: "missing jsonrpc field".to_string(),
            });
        }
    }

    let method = match raw.method {
        Some(m) if !m.is_empty() => m,
        _ => {
            return Err(GatewayError::InvalidRequest {
                details: "missing method".to_string(),
            });
        }
    };

    if let Some(params) = &raw.params
        && !(params.is_object() || params.is_array())
    {
        return Err(GatewayError::InvalidRequest {
            details: "params must be an object or array".to_string(),
        });
    }

    Ok(JsonRpcRequest {
        jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
        id: raw.id,
        method,
        params: raw.params,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Classification of already-parsed messages
// ─────────────────────────────────────────────────────────────────────────────

/// JSON-RPC 2.0 message kind, determined by presence of `id` and `method`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonRpcMessageKind {
    /// Has both `id` and `method`: a request expecting a response.
    Request { id: JsonRpcId, method: String },
    /// Has `id` but no `method`: a response to a previous request.
    Response { id: JsonRpcId },
    /// Has `method` but no `id`: a fire-and-forget notification.
    Notification { method: String },
}

/// Errors that can occur during JSON-RPC message classification.
#[derive(Debug, thiserror::Error)]
pub enum JsonRpcClassifyError {
    /// The `jsonrpc` field is missing or not `"2.0"`.
    #[error("missing or invalid jsonrpc version field")]
    InvalidVersion,
    /// The `id` field is present but not a string, integer, or null.
    #[error("invalid id field")]
    InvalidId,
    /// Neither `id` nor `method` is present.
    #[error("message has neither id nor method")]
    Unclassifiable,
}

/// Classify a parsed JSON-RPC value without taking ownership.
pub fn classify_jsonrpc(value: &Value) -> Result<JsonRpcMessageKind, JsonRpcClassifyError> {
    let version = value.get("jsonrpc").and_then(|v| v.as_str());
    if version != Some(JSONRPC_VERSION) {
        return Err(JsonRpcClassifyError::InvalidVersion);
    }

    let id = value
        .get("id")
        .map(|v| JsonRpcId::from_value(v).ok_or(JsonRpcClassifyError::InvalidId))
        .transpose()?;
    let method = value
        .get("method")
        .and_then(|v| v.as_str())
        .map(String::from);

    match (id, method) {
        (Some(id), Some(method)) => Ok(JsonRpcMessageKind::Request { id, method }),
        (Some(id), None) => Ok(JsonRpcMessageKind::Response { id }),
        (None, Some(method)) => Ok(JsonRpcMessageKind::Notification { method }),
        (None, None) => Err(JsonRpcClassifyError::Unclassifiable),
    }
}

/// Overwrite the `id` of a response value with the client-visible id.
///
/// A `None` id (the caller's id could not be determined) becomes `null`.
pub fn restore_id(message: &mut Value, id: Option<&JsonRpcId>) {
    if let Some(obj) = message.as_object_mut() {
        obj.insert(
            "id".to_string(),
            id.map(JsonRpcId::to_value).unwrap_or(Value::Null),
        );
    }
}

/// True if a response value carries a JSON-RPC `error` member.
pub fn is_error_response(message: &Value) -> bool {
    message.get("error").is_some_and(|e| !e.is_null())
}
