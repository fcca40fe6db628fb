//! Shared fixtures: an in-memory MCP backend and request helpers.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tower::ServiceExt;

use mcpg_core::backend::BackendManager;
use mcpg_core::config::{BackendDefinition, GatewayConfig, TransportKind, parse_json};
use mcpg_core::jsonrpc::JsonRpcRequest;
use mcpg_core::lifecycle::Lifecycle;
use mcpg_core::session::ApiKey;
use mcpg_core::transport::{Reply, Transport, TransportConnector};
use mcpg_core::{GatewayError, GatewayResult};
use mcpg_server::{AppState, GatewayMode, GatewayState, build_router};

pub const API_KEY: &str = "test-api-key";

/// A backend that serves two tools and echoes calls as `<backend>:<tool>`.
pub struct ScriptedBackend {
    pub name: String,
    pub calls: Mutex<Vec<Value>>,
    pub notifications: Mutex<Vec<String>>,
    pub closed: AtomicBool,
}

impl ScriptedBackend {
    fn answer(&self, request: &JsonRpcRequest) -> Value {
        match request.method.as_str() {
            "initialize" => json!({
                "protocolVersion": "2024-11-05",
                "capabilities": {"tools": {}, "resources": {}},
                "serverInfo": {"name": self.name, "version": "0.0.1"}
            }),
            "tools/list" => json!({"tools": [
                {"name": "t", "description": "does t", "inputSchema": {"type": "object"}},
                {
                    "name": "strict",
                    "inputSchema": {
                        "$schema": "http://json-schema.org/draft-07/schema#",
                        "type": "object",
                        "properties": {"x": {"type": "integer"}}
                    }
                },
                {"name": "loose", "inputSchema": "not a schema"}
            ]}),
            "resources/list" => json!({"resources": [
                {"uri": "file:///readme", "name": "readme"}
            ]}),
            "tools/call" | "resources/read" => {
                self.calls.lock().push(request.params.clone().unwrap_or(Value::Null));
                let target = request
                    .param_str("name")
                    .or_else(|| request.param_str("uri"))
                    .unwrap_or_default();
                json!({"content": [{"type": "text", "text": format!("{}:{target}", self.name)}]})
            }
            other => {
                return json!({
                    "jsonrpc": "2.0",
                    "id": request.id.as_ref().map(|id| id.to_value()),
                    "error": {"code": -32601, "message": format!("Method not found: {other}")}
                });
            }
        }
    }
}

#[async_trait]
impl Transport for ScriptedBackend {
    fn kind(&self) -> TransportKind {
        TransportKind::Stdio
    }

    async fn send(&self, request: JsonRpcRequest, _timeout: Duration) -> GatewayResult<Reply> {
        let answer = self.answer(&request);
        if answer.get("error").is_some() {
            return Ok(Reply::json(answer));
        }
        let id = request.id.as_ref().map(|id| id.to_value()).unwrap_or(Value::Null);
        Ok(Reply::json(json!({"jsonrpc": "2.0", "id": id, "result": answer})))
    }

    async fn notify(&self, notification: JsonRpcRequest) -> GatewayResult<()> {
        self.notifications.lock().push(notification.method);
        Ok(())
    }

    async fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }
}

/// Hands out one [`ScriptedBackend`] per name. Names starting with
/// `broken` fail to connect.
#[derive(Default)]
pub struct ScriptedConnector {
    pub backends: Mutex<Vec<Arc<ScriptedBackend>>>,
}

impl ScriptedConnector {
    pub fn backend(&self, name: &str) -> Arc<ScriptedBackend> {
        self.backends
            .lock()
            .iter()
            .find(|b| b.name == name)
            .cloned()
            .expect("backend was never connected")
    }
}

#[async_trait]
impl TransportConnector for ScriptedConnector {
    async fn connect(&self, definition: &BackendDefinition) -> GatewayResult<Arc<dyn Transport>> {
        if definition.name.starts_with("broken") {
            return Err(GatewayError::Transport {
                backend: definition.name.clone(),
                reason: "exec: no such file or directory".into(),
            });
        }
        let backend = Arc::new(ScriptedBackend {
            name: definition.name.clone(),
            calls: Mutex::new(Vec::new()),
            notifications: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });
        self.backends.lock().push(backend.clone());
        Ok(backend)
    }
}

pub struct TestGateway {
    pub state: AppState,
    pub router: Router,
    pub connector: Arc<ScriptedConnector>,
    pub config: GatewayConfig,
}

/// Start a gateway over scripted backends and wait for startup to settle.
pub async fn start_gateway(names: &[&str], mode: GatewayMode, api_key: Option<&str>) -> TestGateway {
    let servers: serde_json::Map<String, Value> = names
        .iter()
        .map(|name| (name.to_string(), json!({"type": "stdio", "command": "unused"})))
        .collect();
    let mut gateway = json!({});
    if let Some(key) = api_key {
        gateway["apiKey"] = json!(key);
    }
    let config = parse_json(&json!({"mcpServers": servers, "gateway": gateway}).to_string()).unwrap();

    let connector = Arc::new(ScriptedConnector::default());
    let manager = Arc::new(BackendManager::new(&config, connector.clone()));
    manager.start_all().await;
    let lifecycle = Arc::new(Lifecycle::new());
    lifecycle.mark_settled();

    let state = GatewayState::new(
        manager,
        lifecycle,
        ApiKey::new(config.gateway.api_key.clone()),
        mode,
    );
    TestGateway {
        router: build_router(state.clone()),
        state,
        connector,
        config,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).expect("response body is not JSON")
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    TestResponse {
        status,
        content_type,
        body,
    }
}

/// POST a JSON-RPC body with the test API key.
pub async fn post_rpc(router: &Router, path: &str, body: Value) -> TestResponse {
    send(router, rpc_request(path, body, Some(API_KEY))).await
}

pub fn rpc_request(path: &str, body: Value, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub fn initialize(id: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test-client", "version": "1.0"}
        }
    })
}
