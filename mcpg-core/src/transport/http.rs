//! HTTP transport: one POST per JSON-RPC message.
//!
//! A backend may answer with a plain `application/json` body or with a
//! `text/event-stream` body. Event streams are decoded lazily and reading
//! stops at the first frame whose id matches the request.
//!
//! The session id captured during `initialize` is replayed on every later
//! request in the `Mcp-Session-Id` header.

use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Response, Url};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::sse::SseDecoder;
use super::{Reply, Transport};
use crate::config::{HttpSpec, TransportKind};
use crate::error::{GatewayError, GatewayResult};
use crate::jsonrpc::{JsonRpcId, JsonRpcRequest, restore_id};
use crate::session::{SESSION_HEADER, SyntheticSession};

/// Largest JSON body accepted from a backend (10 MB).
const MAX_RESPONSE_BYTES: usize = 10 * 1024 * 1024;

/// Error bodies are truncated to this many bytes before being surfaced.
const MAX_ERROR_BODY_BYTES: usize = 4096;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for notifications, which carry no caller-supplied timeout.
const NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

const ACCEPT_VALUE: &str = "application/json, text/event-stream";

/// Transport over HTTP (optionally SSE-framed) to a remote MCP server.
pub struct HttpTransport {
    backend: String,
    url: Url,
    headers: HeaderMap,
    client: RwLock<Option<Client>>,
    session_id: RwLock<Option<String>>,
    closed: AtomicBool,
}

/// What came back from one POST.
struct Exchange {
    message: Option<Reply>,
    session_id: Option<String>,
}

impl HttpTransport {
    /// Prepare the HTTP client. No request is made until the first `send`.
    ///
    /// # Errors
    ///
    /// Returns `BackendConnect` if the URL or a configured header is
    /// invalid, or the client cannot be built.
    pub fn new(backend: &str, spec: &HttpSpec) -> GatewayResult<Self> {
        let connect_error = |reason: String| GatewayError::BackendConnect {
            backend: backend.to_string(),
            reason,
        };

        let url = Url::parse(&spec.url)
            .map_err(|e| connect_error(format!("invalid url '{}': {e}", spec.url)))?;

        let mut headers = HeaderMap::with_capacity(spec.headers.len());
        for (name, value) in &spec.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| connect_error(format!("invalid header name '{name}': {e}")))?;
            let mut value = HeaderValue::from_str(value)
                .map_err(|e| connect_error(format!("invalid value for header '{name}': {e}")))?;
            value.set_sensitive(true);
            headers.insert(name, value);
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| connect_error(format!("failed to create HTTP connection: {e}")))?;

        info!(backend, url = %url, "prepared HTTP backend");

        Ok(Self {
            backend: backend.to_string(),
            url,
            headers,
            client: RwLock::new(Some(client)),
            session_id: RwLock::new(None),
            closed: AtomicBool::new(false),
        })
    }

    /// Session id currently replayed toward the backend.
    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    fn transport_error(&self, reason: impl Into<String>) -> GatewayError {
        GatewayError::Transport {
            backend: self.backend.clone(),
            reason: reason.into(),
        }
    }

    fn classify_error(&self, error: reqwest::Error, method: &str, timeout: Duration) -> GatewayError {
        if error.is_timeout() {
            warn!(backend = %self.backend, method, timeout_secs = timeout.as_secs(), "HTTP backend timed out");
            GatewayError::Timeout {
                backend: self.backend.clone(),
                method: method.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else if error.is_connect() {
            warn!(backend = %self.backend, url = %self.url, error = %error, "failed to connect to HTTP backend");
            self.transport_error(format!("connection to {} failed: {error}", self.url))
        } else {
            warn!(backend = %self.backend, method, error = %error, "HTTP backend request failed");
            self.transport_error(error.to_string())
        }
    }

    /// POST one message and decode whatever comes back.
    async fn exchange(
        &self,
        message: &JsonRpcRequest,
        session: Option<&str>,
        timeout: Duration,
    ) -> GatewayResult<Exchange> {
        if self.closed.load(Ordering::Acquire) {
            return Err(self.transport_error("backend closed"));
        }
        let Some(client) = self.client.read().clone() else {
            return Err(self.transport_error("backend closed"));
        };

        let mut builder = client
            .post(self.url.clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_VALUE)
            .headers(self.headers.clone())
            .json(message);
        if let Some(session) = session {
            builder = builder.header(SESSION_HEADER, session);
        }

        debug!(backend = %self.backend, method = %message.method, "sending HTTP request");
        let response = builder
            .send()
            .await
            .map_err(|e| self.classify_error(e, &message.method, timeout))?;

        let status = response.status();
        let session_id = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string);

        if !status.is_success() {
            let body = self.read_error_body(response).await;
            warn!(
                backend = %self.backend,
                method = %message.method,
                status = status.as_u16(),
                "HTTP backend returned error status"
            );
            return Err(GatewayError::UpstreamStatus {
                backend: self.backend.clone(),
                status: status.as_u16(),
                body,
            });
        }

        let Some(id) = message.id.as_ref() else {
            return Ok(Exchange {
                message: None,
                session_id,
            });
        };

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.trim_start().starts_with("text/event-stream"));

        let reply = if is_event_stream {
            let mut value = self
                .read_matching_event(response, id, &message.method, timeout)
                .await?;
            restore_id(&mut value, Some(id));
            Reply::event_stream(value)
        } else {
            let body = self
                .read_body_limited(response, &message.method, timeout)
                .await?;
            let mut value: Value = serde_json::from_slice(&body).map_err(|e| {
                self.transport_error(format!("invalid JSON in response to '{}': {e}", message.method))
            })?;
            if !value.is_object() {
                return Err(self.transport_error(format!(
                    "response to '{}' is not a JSON-RPC object",
                    message.method
                )));
            }
            restore_id(&mut value, Some(id));
            Reply::json(value)
        };

        Ok(Exchange {
            message: Some(reply),
            session_id,
        })
    }

    async fn read_body_limited(
        &self,
        mut response: Response,
        method: &str,
        timeout: Duration,
    ) -> GatewayResult<Vec<u8>> {
        if let Some(len) = response.content_length()
            && len as usize > MAX_RESPONSE_BYTES
        {
            return Err(self.transport_error(format!(
                "response too large: {len} bytes exceeds {MAX_RESPONSE_BYTES} byte limit"
            )));
        }

        let capacity = response
            .content_length()
            .map_or(8192, |len| len as usize)
            .min(MAX_RESPONSE_BYTES);
        let mut buf = Vec::with_capacity(capacity);
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| self.classify_error(e, method, timeout))?
        {
            if buf.len() + chunk.len() > MAX_RESPONSE_BYTES {
                return Err(self.transport_error(format!(
                    "response too large: exceeds {MAX_RESPONSE_BYTES} byte limit"
                )));
            }
            buf.extend_from_slice(&chunk);
        }
        Ok(buf)
    }

    /// Decode the event stream until a frame carries `id`. Frames for other
    /// ids, server requests and notifications are skipped.
    async fn read_matching_event(
        &self,
        mut response: Response,
        id: &JsonRpcId,
        method: &str,
        timeout: Duration,
    ) -> GatewayResult<Value> {
        let wanted = id.to_value();
        let mut decoder = SseDecoder::new();
        let mut skipped = 0usize;

        loop {
            let chunk = response
                .chunk()
                .await
                .map_err(|e| self.classify_error(e, method, timeout))?;
            let done = match &chunk {
                Some(bytes) => {
                    decoder.feed(bytes);
                    false
                }
                None => true,
            };

            loop {
                let event = if done {
                    decoder.finish()
                } else {
                    decoder.next_event()
                }
                .map_err(|e| self.transport_error(e.to_string()))?;
                let Some(event) = event else {
                    break;
                };
                if event.event_type() != "message" {
                    skipped += 1;
                    continue;
                }
                match serde_json::from_str::<Value>(&event.data) {
                    Ok(value) if value.get("id") == Some(&wanted) && value.get("method").is_none() => {
                        debug!(backend = %self.backend, method, skipped, "matched event stream frame");
                        return Ok(value);
                    }
                    Ok(_) => skipped += 1,
                    Err(e) => {
                        debug!(backend = %self.backend, error = %e, "skipping non-JSON event frame");
                        skipped += 1;
                    }
                }
            }

            if done {
                return Err(self.transport_error(format!(
                    "event stream ended without a response for id {id} ({skipped} frames skipped)"
                )));
            }
        }
    }

    async fn read_error_body(&self, mut response: Response) -> String {
        let mut buf = Vec::new();
        while let Ok(Some(chunk)) = response.chunk().await {
            buf.extend_from_slice(&chunk);
            if buf.len() >= MAX_ERROR_BODY_BYTES {
                buf.truncate(MAX_ERROR_BODY_BYTES);
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Http
    }

    async fn send(&self, request: JsonRpcRequest, timeout: Duration) -> GatewayResult<Reply> {
        let session = self.session_id();
        let exchange = self.exchange(&request, session.as_deref(), timeout).await?;
        exchange
            .message
            .ok_or_else(|| self.transport_error(format!("no response to '{}'", request.method)))
    }

    /// Sends `initialize` with the synthetic session id and keeps whichever
    /// id the backend returns. Backends that return none keep the synthetic one.
    async fn handshake(
        &self,
        request: JsonRpcRequest,
        session: &SyntheticSession,
        timeout: Duration,
    ) -> GatewayResult<Reply> {
        let exchange = self.exchange(&request, Some(session.as_str()), timeout).await?;
        let captured = match exchange.session_id {
            Some(id) => {
                debug!(backend = %self.backend, session_id = %id, "captured backend session id");
                id
            }
            None => {
                debug!(backend = %self.backend, "backend returned no session id, keeping synthetic id");
                session.as_str().to_string()
            }
        };
        *self.session_id.write() = Some(captured);
        exchange
            .message
            .ok_or_else(|| self.transport_error("no response to 'initialize'"))
    }

    async fn notify(&self, notification: JsonRpcRequest) -> GatewayResult<()> {
        let session = self.session_id();
        self.exchange(&notification, session.as_deref(), NOTIFY_TIMEOUT)
            .await
            .map(|_| ())
    }

    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.client.write().take();
        self.session_id.write().take();
        debug!(backend = %self.backend, "HTTP backend closed");
        true
    }
}
