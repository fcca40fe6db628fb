//! Response framing toward the client.
//!
//! A client whose `Accept` allows `text/event-stream` gets every answer as
//! one SSE `message` event, whether the backend replied with plain JSON or
//! over SSE. Everyone else gets plain JSON. Either way the body carries the
//! client's original id.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::Value;

use mcpg_core::transport::sse::encode_event;

const EVENT_STREAM: &str = "text/event-stream";

/// What the caller said it can receive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponsePreference {
    pub accepts_json: bool,
    pub accepts_event_stream: bool,
}

impl Default for ResponsePreference {
    fn default() -> Self {
        Self {
            accepts_json: true,
            accepts_event_stream: false,
        }
    }
}

impl ResponsePreference {
    /// Parse every `Accept` header. A missing header means JSON.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut accepts_json = false;
        let mut accepts_event_stream = false;
        let mut seen = false;
        for value in headers.get_all(header::ACCEPT) {
            let Ok(value) = value.to_str() else { continue };
            for media in value.split(',') {
                seen = true;
                let media = media.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
                match media.as_str() {
                    "application/json" | "application/*" | "*/*" => accepts_json = true,
                    EVENT_STREAM | "text/*" => accepts_event_stream = true,
                    _ => {}
                }
            }
        }
        if !seen || (!accepts_json && !accepts_event_stream) {
            return Self::default();
        }
        Self {
            accepts_json,
            accepts_event_stream,
        }
    }

    pub fn use_event_stream(self) -> bool {
        self.accepts_event_stream
    }
}

/// Render a JSON-RPC message in the framing the caller prefers.
pub fn respond(message: &Value, preference: ResponsePreference) -> Response {
    respond_with_status(StatusCode::OK, message, preference)
}

pub fn respond_with_status(
    status: StatusCode,
    message: &Value,
    preference: ResponsePreference,
) -> Response {
    let json = message.to_string();
    if preference.use_event_stream() {
        let mut response = (status, Body::from(encode_event("message", &json))).into_response();
        let headers = response.headers_mut();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(EVENT_STREAM));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        response
    } else {
        (status, [(header::CONTENT_TYPE, "application/json")], json).into_response()
    }
}

/// 202 with no body, used for notifications.
pub fn accepted() -> Response {
    StatusCode::ACCEPTED.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::json;

    fn headers(accept: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::ACCEPT, HeaderValue::from_str(accept).unwrap());
        map
    }

    #[test]
    fn test_preference_parsing() {
        let both = ResponsePreference::from_headers(&headers("application/json, text/event-stream"));
        assert!(both.accepts_json && both.accepts_event_stream);
        assert!(both.use_event_stream());

        let sse_only = ResponsePreference::from_headers(&headers("text/event-stream"));
        assert!(sse_only.use_event_stream());

        let none = ResponsePreference::from_headers(&HeaderMap::new());
        assert!(!none.use_event_stream());

        let json_only = ResponsePreference::from_headers(&headers("application/json"));
        assert!(!json_only.use_event_stream());

        let wildcard = ResponsePreference::from_headers(&headers("*/*;q=0.8"));
        assert!(!wildcard.use_event_stream());
    }

    #[tokio::test]
    async fn test_event_stream_wraps_single_message() {
        let message = json!({"jsonrpc": "2.0", "id": 3, "result": {}});
        let preference =
            ResponsePreference::from_headers(&headers("application/json, text/event-stream"));
        let response = respond(&message, preference);

        assert_eq!(response.headers()[header::CONTENT_TYPE], EVENT_STREAM);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(text, format!("event: message\ndata: {message}\n\n"));
    }

    #[tokio::test]
    async fn test_json_response() {
        let message = json!({"jsonrpc": "2.0", "id": "a", "result": {"ok": true}});
        let response = respond(&message, ResponsePreference::default());
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, message);
    }
}
