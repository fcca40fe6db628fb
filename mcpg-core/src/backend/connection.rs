//! One backend: its transport, its state and the startup handshake.

use parking_lot::RwLock;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::state::{BackendState, StateCell};
use crate::config::{BackendDefinition, TransportKind};
use crate::error::{GatewayError, GatewayResult};
use crate::jsonrpc::{JsonRpcRequest, is_error_response};
use crate::registry::{CapabilityKind, Discovery};
use crate::rpc_log::{self, Direction};
use crate::session::SyntheticSession;
use crate::transport::{Reply, Transport, TransportConnector};
use crate::{GATEWAY_VERSION, MCP_PROTOCOL_VERSION};

/// Deadline for `initialize` and each discovery page.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for forwarded requests other than `tools/call` and `ping`.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Upper bound on `nextCursor` pages followed for one list.
const MAX_LIST_PAGES: usize = 100;

/// Client name sent in `clientInfo`.
pub const CLIENT_NAME: &str = "mcpg";

/// A configured backend and everything the gateway knows about it.
pub struct BackendConnection {
    definition: BackendDefinition,
    state: StateCell,
    transport: RwLock<Option<Arc<dyn Transport>>>,
    next_id: AtomicI64,
    tool_timeout: Duration,
    server_info: RwLock<Option<Value>>,
}

impl std::fmt::Debug for BackendConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnection")
            .field("name", &self.definition.name)
            .field("kind", &self.definition.kind())
            .field("state", &self.state.get())
            .finish()
    }
}

impl BackendConnection {
    pub fn new(definition: BackendDefinition, tool_timeout: Duration) -> Self {
        Self {
            definition,
            state: StateCell::default(),
            transport: RwLock::new(None),
            next_id: AtomicI64::new(1),
            tool_timeout,
            server_info: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn kind(&self) -> TransportKind {
        self.definition.kind()
    }

    pub fn state(&self) -> BackendState {
        self.state.get()
    }

    /// Reason the backend failed, if it did.
    pub fn error(&self) -> Option<String> {
        self.state.error()
    }

    /// `serverInfo` from the backend's `initialize` result.
    pub fn server_info(&self) -> Option<Value> {
        self.server_info.read().clone()
    }

    /// Establish the transport, run the handshake and discover capabilities.
    ///
    /// On success the backend is left in `Initializing`; the caller publishes
    /// the returned discovery and then calls [`mark_ready`](Self::mark_ready).
    /// On failure the backend is `Failed` with the reason recorded.
    ///
    /// # Errors
    ///
    /// `BackendConnect` describing the first fatal problem.
    pub async fn connect(&self, connector: &dyn TransportConnector) -> GatewayResult<Discovery> {
        self.advance(BackendState::Connecting)?;
        info!(backend = %self.name(), kind = %self.kind(), "connecting to backend");

        let transport = match connector.connect(&self.definition).await {
            Ok(t) => t,
            Err(e) => return Err(self.fail_handshake(&e)),
        };
        *self.transport.write() = Some(transport.clone());

        if let Err(e) = self.advance(BackendState::Initializing) {
            // Closed while the transport was being set up.
            self.release_transport().await;
            return Err(e);
        }
        match self.handshake(transport.as_ref()).await {
            Ok(discovery) => Ok(discovery),
            Err(e) => Err(self.fail_handshake(&e)),
        }
    }

    async fn handshake(&self, transport: &dyn Transport) -> GatewayResult<Discovery> {
        let session = SyntheticSession::generate(self.name());
        debug!(backend = %self.name(), session_id = %session, "sending initialize");

        let request = JsonRpcRequest::new(
            self.next_id(),
            "initialize",
            Some(json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {"name": CLIENT_NAME, "version": GATEWAY_VERSION},
            })),
        );
        rpc_log::log_request(Direction::Outbound, self.name(), &request);
        let outcome = transport.handshake(request, &session, HANDSHAKE_TIMEOUT).await;
        rpc_log::log_response(Direction::Inbound, self.name(), "initialize", &outcome);
        let reply = outcome?;
        if let Some(error) = reply.message.get("error") {
            return Err(GatewayError::BackendConnect {
                backend: self.name().to_string(),
                reason: format!("initialize rejected: {}", describe_rpc_error(error)),
            });
        }
        let result = reply.message.get("result").cloned().unwrap_or(Value::Null);
        if let Some(info) = result.get("serverInfo") {
            debug!(backend = %self.name(), server_info = %info, "backend initialized");
            *self.server_info.write() = Some(info.clone());
        }

        let initialized = JsonRpcRequest::notification("notifications/initialized", None);
        rpc_log::log_request(Direction::Outbound, self.name(), &initialized);
        transport.notify(initialized).await?;

        let advertised = result.get("capabilities");
        let mut discovery = Discovery::default();
        for kind in CapabilityKind::ALL {
            let optional = kind != CapabilityKind::Tool;
            if optional && advertised.is_some_and(|caps| caps.get(kind.result_key()).is_none()) {
                debug!(backend = %self.name(), "backend does not advertise {}", kind.result_key());
                continue;
            }
            match self.list_all(transport, kind).await {
                Ok(items) => *discovery.list_mut(kind) = items,
                Err(ListError::Rpc(message)) => warn!(
                    backend = %self.name(),
                    method = kind.list_method(),
                    error = %message,
                    "backend rejected list request, treating as empty"
                ),
                Err(ListError::Gateway(e)) if optional => warn!(
                    backend = %self.name(),
                    method = kind.list_method(),
                    error = %e,
                    "optional discovery failed, treating as empty"
                ),
                Err(ListError::Gateway(e)) => return Err(e),
            }
        }
        Ok(discovery)
    }

    /// Follow `nextCursor` until the list is exhausted.
    async fn list_all(&self, transport: &dyn Transport, kind: CapabilityKind) -> Result<Vec<Value>, ListError> {
        let mut items = Vec::new();
        let mut cursor: Option<String> = None;
        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({"cursor": c}));
            let request = JsonRpcRequest::new(self.next_id(), kind.list_method(), params);
            let reply = self
                .exchange(transport, request, HANDSHAKE_TIMEOUT)
                .await
                .map_err(ListError::Gateway)?;
            if let Some(error) = reply.message.get("error") {
                return Err(ListError::Rpc(describe_rpc_error(error)));
            }
            let result = reply.message.get("result");
            match result.and_then(|r| r.get(kind.result_key())) {
                Some(Value::Array(page)) => items.extend(page.iter().cloned()),
                Some(other) => warn!(
                    backend = %self.name(),
                    method = kind.list_method(),
                    found = %other,
                    "list result is not an array, ignoring page"
                ),
                None => {}
            }
            cursor = result
                .and_then(|r| r.get("nextCursor"))
                .and_then(Value::as_str)
                .filter(|c| !c.is_empty())
                .map(str::to_string);
            if cursor.is_none() {
                return Ok(items);
            }
        }
        warn!(backend = %self.name(), method = kind.list_method(), pages = MAX_LIST_PAGES, "pagination limit reached");
        Ok(items)
    }

    /// Complete the startup attempt.
    pub fn mark_ready(&self) -> GatewayResult<()> {
        self.advance(BackendState::Ready)?;
        info!(backend = %self.name(), "backend ready");
        Ok(())
    }

    /// Record a fatal error. Has no effect once the backend is Stopped.
    pub fn mark_failed(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.state.transition(BackendState::Failed, Some(reason.clone())).is_ok() {
            error!(backend = %self.name(), reason = %reason, "backend failed");
        }
    }

    fn fail_handshake(&self, e: &GatewayError) -> GatewayError {
        let reason = describe_failure(e);
        let kind = match self.kind() {
            TransportKind::Http => "HTTP",
            TransportKind::Stdio => "stdio",
        };
        error!(backend = %self.name(), "FAILED to create {kind} connection: {reason}");
        let _ = self.state.transition(BackendState::Failed, Some(reason.clone()));
        GatewayError::BackendConnect {
            backend: self.name().to_string(),
            reason,
        }
    }

    fn advance(&self, next: BackendState) -> GatewayResult<()> {
        self.state
            .transition(next, None)
            .map(|_| ())
            .map_err(|e| GatewayError::BackendConnect {
                backend: self.name().to_string(),
                reason: e.to_string(),
            })
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Deadline applied to a forwarded request.
    pub fn timeout_for(&self, method: &str) -> Duration {
        match method {
            "tools/call" => self.tool_timeout,
            "ping" => PING_TIMEOUT,
            _ => DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Forward a client request. The reply carries the client's id.
    ///
    /// # Errors
    ///
    /// `BackendUnavailable` unless the backend is Ready, otherwise whatever
    /// the transport reports.
    pub async fn call(&self, request: JsonRpcRequest) -> GatewayResult<Reply> {
        let state = self.state();
        let transport = self.transport.read().clone();
        let transport = match (state, transport) {
            (BackendState::Ready, Some(t)) => t,
            _ => {
                return Err(GatewayError::BackendUnavailable {
                    backend: self.name().to_string(),
                    state: state.to_string(),
                });
            }
        };
        let timeout = self.timeout_for(&request.method);
        let method = request.method.clone();
        let reply = self.exchange(transport.as_ref(), request, timeout).await?;
        if is_error_response(&reply.message) {
            debug!(backend = %self.name(), method = %method, "backend returned JSON-RPC error");
        }
        Ok(reply)
    }

    /// Forward a client notification. Dropped unless Ready.
    pub async fn forward_notification(&self, notification: JsonRpcRequest) -> GatewayResult<()> {
        let transport = self.transport.read().clone();
        match transport {
            Some(t) if self.state() == BackendState::Ready => {
                rpc_log::log_request(Direction::Outbound, self.name(), &notification);
                t.notify(notification).await
            }
            _ => Ok(()),
        }
    }

    /// One request/response round trip, recorded in the RPC log.
    async fn exchange(
        &self,
        transport: &dyn Transport,
        request: JsonRpcRequest,
        timeout: Duration,
    ) -> GatewayResult<Reply> {
        let method = request.method.clone();
        rpc_log::log_request(Direction::Outbound, self.name(), &request);
        let outcome = transport.send(request, timeout).await;
        rpc_log::log_response(Direction::Inbound, self.name(), &method, &outcome);
        outcome
    }

    /// Fires when the transport dies on its own.
    pub fn exit_signal(&self) -> Option<watch::Receiver<Option<String>>> {
        self.transport.read().as_ref().and_then(|t| t.exit_signal())
    }

    /// Stop the backend. Returns true if this call released a live transport.
    pub async fn close(&self) -> bool {
        let _ = self.state.transition(BackendState::Stopped, None);
        self.release_transport().await
    }

    /// Tear down the transport without changing state, e.g. after an
    /// abandoned startup attempt.
    pub async fn release_transport(&self) -> bool {
        let transport = self.transport.write().take();
        match transport {
            Some(t) => {
                let released = t.close().await;
                if released {
                    info!(backend = %self.name(), "backend terminated");
                }
                released
            }
            None => false,
        }
    }
}

enum ListError {
    /// The backend answered with a JSON-RPC error.
    Rpc(String),
    Gateway(GatewayError),
}

fn describe_rpc_error(error: &Value) -> String {
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error.get("message").and_then(Value::as_str).unwrap_or("unknown error");
    format!("code={code}, message={message}")
}

/// Human-readable cause for a failed handshake.
fn describe_failure(e: &GatewayError) -> String {
    match e {
        GatewayError::UpstreamStatus { status, body, .. } => {
            let body = body.trim();
            if body.is_empty() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {body}")
            }
        }
        GatewayError::Transport { reason, .. } | GatewayError::BackendConnect { reason, .. } => {
            reason.clone()
        }
        GatewayError::Timeout { method, timeout_secs, .. } => {
            format!("{method} timed out after {timeout_secs}s")
        }
        other => other.to_string(),
    }
}
