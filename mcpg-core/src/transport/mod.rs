//! Transport adapters.
//!
//! Every backend is reached through one [`Transport`]: a request/response
//! contract (`send`, `notify`, `close`) implemented once for stdio
//! subprocesses and once for HTTP/SSE servers. The connection manager and
//! the dispatchers only ever see `Arc<dyn Transport>`.

pub mod framing;
pub mod http;
pub mod sse;
pub mod stdio;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::config::{BackendDefinition, TransportKind, TransportSpec};
use crate::error::GatewayResult;
use crate::jsonrpc::JsonRpcRequest;
use crate::session::SyntheticSession;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

/// How a reply travelled on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// A plain `application/json` body or a single NDJSON line.
    Json,
    /// A frame extracted from a `text/event-stream` body.
    EventStream,
}

/// A backend's answer to one request.
///
/// `message` is the raw JSON-RPC response, result or error, with the
/// caller's id already restored.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message: Value,
    pub framing: Framing,
}

impl Reply {
    pub fn json(message: Value) -> Self {
        Self {
            message,
            framing: Framing::Json,
        }
    }

    pub fn event_stream(message: Value) -> Self {
        Self {
            message,
            framing: Framing::EventStream,
        }
    }
}

/// One request/response channel to a backend.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Send a request and wait up to `timeout` for the matching response.
    async fn send(&self, request: JsonRpcRequest, timeout: Duration) -> GatewayResult<Reply>;

    /// Send the `initialize` request. Transports that correlate sessions
    /// attach `session` to it; the default ignores it.
    async fn handshake(
        &self,
        request: JsonRpcRequest,
        session: &SyntheticSession,
        timeout: Duration,
    ) -> GatewayResult<Reply> {
        let _ = session;
        self.send(request, timeout).await
    }

    /// Send a notification. No response is expected.
    async fn notify(&self, notification: JsonRpcRequest) -> GatewayResult<()>;

    /// Tear the transport down. Returns true only for the call that actually
    /// released resources; later calls are no-ops.
    async fn close(&self) -> bool;

    /// Fires with a reason when the transport dies on its own.
    fn exit_signal(&self) -> Option<watch::Receiver<Option<String>>> {
        None
    }
}

/// Turns a backend definition into a live transport.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self, definition: &BackendDefinition) -> GatewayResult<Arc<dyn Transport>>;
}

/// Spawns subprocesses for stdio backends and builds HTTP clients for HTTP backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultConnector;

#[async_trait]
impl TransportConnector for DefaultConnector {
    async fn connect(&self, definition: &BackendDefinition) -> GatewayResult<Arc<dyn Transport>> {
        match &definition.transport {
            TransportSpec::Stdio(spec) => Ok(Arc::new(StdioTransport::spawn(
                &definition.name,
                spec,
            )?)),
            TransportSpec::Http(spec) => Ok(Arc::new(HttpTransport::new(&definition.name, spec)?)),
        }
    }
}
