//! RPC message log.
//!
//! Every JSON-RPC message exchanged with a backend is emitted as a `tracing`
//! event on [`RPC_LOG_TARGET`]. The CLI routes that target to its own JSONL
//! file. Payloads are sanitized before they reach the event: string values
//! under secret-looking keys become `[REDACTED]`, and token-shaped
//! substrings anywhere else are masked.

use regex::Regex;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::LazyLock;
use tracing::Level;

use crate::error::GatewayResult;
use crate::jsonrpc::JsonRpcRequest;
use crate::transport::Reply;

/// `tracing` target carrying RPC message events.
pub const RPC_LOG_TARGET: &str = "mcpg::rpc";

pub const REDACTED: &str = "[REDACTED]";

/// Key fragments whose string values are always redacted.
const SECRET_KEY_PARTS: &[&str] = &[
    "password",
    "passwd",
    "pwd",
    "token",
    "apikey",
    "api_key",
    "api-key",
    "secret",
    "authorization",
    "auth",
    "key",
    "credential",
];

// SAFETY: .expect() on LazyLock with compile-time literal regex patterns.
// The patterns are known-valid and tested by test_patterns_compile().
static SECRET_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)(token|key|secret|password|auth)[=:]\s*\S{8,}", "$1=[REDACTED]"),
        (r"(?i)\bbearer\s+[A-Za-z0-9\-._~+/]+=*", "Bearer [REDACTED]"),
        (r"ghp_[A-Za-z0-9]{36,}", REDACTED),
        (r"github_pat_[A-Za-z0-9_]{40,}", REDACTED),
        (r"[A-Za-z0-9_-]{20,}\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+", REDACTED),
        (r"\b[a-f0-9]{32,}\b", REDACTED),
    ]
    .into_iter()
    .map(|(pattern, replacement)| {
        let regex = Regex::new(pattern).expect("BUG: secret pattern is invalid");
        (regex, replacement)
    })
    .collect()
});

/// Which way a message travelled, seen from the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inbound => "IN",
            Self::Outbound => "OUT",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Request,
    Response,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Request => "REQUEST",
            Self::Response => "RESPONSE",
        }
    }
}

/// Whether any subscriber wants RPC events. Sanitizing is skipped otherwise.
pub fn enabled() -> bool {
    tracing::enabled!(target: RPC_LOG_TARGET, Level::INFO)
}

/// Log a request or notification sent to (or received from) `server`.
pub fn log_request(direction: Direction, server: &str, request: &JsonRpcRequest) {
    if !enabled() {
        return;
    }
    let payload = serde_json::to_value(request).unwrap_or(Value::Null);
    emit(direction, MessageType::Request, server, &request.method, &payload, None);
}

/// Log the outcome of a request to `server`.
pub fn log_response(direction: Direction, server: &str, method: &str, outcome: &GatewayResult<Reply>) {
    if !enabled() {
        return;
    }
    match outcome {
        Ok(reply) => {
            let error = reply.message.get("error").map(Value::to_string);
            emit(
                direction,
                MessageType::Response,
                server,
                method,
                &reply.message,
                error.as_deref(),
            );
        }
        Err(e) => emit(
            direction,
            MessageType::Response,
            server,
            method,
            &Value::Null,
            Some(&e.to_string()),
        ),
    }
}

fn emit(
    direction: Direction,
    kind: MessageType,
    server: &str,
    method: &str,
    payload: &Value,
    error: Option<&str>,
) {
    let payload = sanitize(payload);
    let error = error.map(sanitize_str);
    tracing::info!(
        target: RPC_LOG_TARGET,
        direction = direction.as_str(),
        "type" = kind.as_str(),
        server_id = server,
        method = method,
        error = error.as_deref(),
        payload = %payload,
    );
}

fn is_secret_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SECRET_KEY_PARTS.iter().any(|part| key.contains(part))
}

/// Copy of `value` with secrets removed.
pub fn sanitize(value: &Value) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize_str(text)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| {
                    let value = match value {
                        Value::String(text) if !text.is_empty() && is_secret_key(key) => {
                            Value::String(REDACTED.to_string())
                        }
                        other => sanitize(other),
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Mask token-shaped substrings.
pub fn sanitize_str(text: &str) -> String {
    let mut text = text.to_string();
    for (pattern, replacement) in SECRET_PATTERNS.iter() {
        if let Cow::Owned(replaced) = pattern.replace_all(&text, *replacement) {
            text = replaced;
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patterns_compile() {
        assert_eq!(SECRET_PATTERNS.len(), 6);
    }

    #[test]
    fn test_secret_keys_are_redacted_at_any_depth() {
        let payload = json!({
            "method": "tools/call",
            "params": {
                "name": "deploy",
                "arguments": {
                    "api_key": "sk-live-123",
                    "Authorization": "whatever",
                    "region": "eu-west-1",
                    "nested": [{"password": "hunter2"}, {"count": 3}]
                }
            }
        });
        let clean = sanitize(&payload);
        let args = &clean["params"]["arguments"];
        assert_eq!(args["api_key"], REDACTED);
        assert_eq!(args["Authorization"], REDACTED);
        assert_eq!(args["nested"][0]["password"], REDACTED);
        assert_eq!(args["region"], "eu-west-1");
        assert_eq!(args["nested"][1]["count"], 3);
        assert_eq!(clean["params"]["name"], "deploy");
    }

    #[test]
    fn test_empty_secret_values_are_kept() {
        let clean = sanitize(&json!({"token": ""}));
        assert_eq!(clean["token"], "");
    }

    #[test]
    fn test_token_shapes_in_free_text_are_masked() {
        let pat = format!("ghp_{}", "a".repeat(36));
        let text = format!("clone with {pat} please");
        assert_eq!(sanitize_str(&text), "clone with [REDACTED] please");

        assert_eq!(
            sanitize_str("header was Bearer abc.def-123"),
            "header was Bearer [REDACTED]"
        );
        assert_eq!(sanitize_str("token=supersecretvalue"), "token=[REDACTED]");
        assert_eq!(
            sanitize_str("sha 0123456789abcdef0123456789abcdef"),
            "sha [REDACTED]"
        );
        assert_eq!(sanitize_str("nothing to hide here"), "nothing to hide here");
    }

    #[test]
    fn test_labels() {
        assert_eq!(Direction::Outbound.as_str(), "OUT");
        assert_eq!(Direction::Inbound.as_str(), "IN");
        assert_eq!(MessageType::Request.as_str(), "REQUEST");
        assert_eq!(MessageType::Response.as_str(), "RESPONSE");
    }
}
