//! End-to-end tests: the real `mcpg` binary in front of `mock_mcp_stdio`.

#![cfg(unix)]

use serde_json::{Value, json};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

const GATEWAY: &str = env!("CARGO_BIN_EXE_mcpg");
const MOCK_BACKEND: &str = env!("CARGO_BIN_EXE_mock_mcp_stdio");
const API_KEY: &str = "e2e-secret";

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn stdin_config(names: &[&str]) -> Value {
    let servers: serde_json::Map<String, Value> = names
        .iter()
        .map(|name| {
            (
                name.to_string(),
                json!({"type": "stdio", "command": MOCK_BACKEND, "env": {"MOCK_MCP_NAME": name}}),
            )
        })
        .collect();
    json!({"mcpServers": servers, "gateway": {"apiKey": API_KEY}})
}

struct RunningGateway {
    child: Child,
    document: Value,
    base: String,
}

/// Start the gateway, feed it `config` on stdin and wait for the stdout document.
async fn start(config: &Value, mode: &str, log_dir: &Path) -> RunningGateway {
    let port = free_port();
    let mut child = Command::new(GATEWAY)
        .args(["--config-stdin", mode, "--listen"])
        .arg(format!("127.0.0.1:{port}"))
        .arg("--log-dir")
        .arg(log_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit())
        .kill_on_drop(true)
        .spawn()
        .expect("failed to spawn mcpg");

    let mut stdin = child.stdin.take().unwrap();
    stdin.write_all(config.to_string().as_bytes()).await.unwrap();
    drop(stdin);

    let mut lines = BufReader::new(child.stdout.take().unwrap()).lines();
    let document = tokio::time::timeout(Duration::from_secs(30), async {
        let mut buffer = String::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            buffer.push_str(&line);
            buffer.push('\n');
            if let Ok(document) = serde_json::from_str::<Value>(&buffer) {
                return document;
            }
        }
        panic!("stdout closed before the configuration document was complete: {buffer}");
    })
    .await
    .expect("timed out waiting for the configuration document");

    RunningGateway {
        child,
        document,
        base: format!("http://127.0.0.1:{port}"),
    }
}

fn terminate(child: &Child) {
    use nix::sys::signal::{Signal, kill};
    use nix::unistd::Pid;
    let pid = child.id().expect("gateway already exited");
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM).unwrap();
}

async fn rpc(client: &reqwest::Client, url: &str, key: Option<&str>, body: Value) -> reqwest::Response {
    let mut request = client.post(url).json(&body);
    if let Some(key) = key {
        request = request.header("Authorization", key);
    }
    request.send().await.unwrap()
}

fn initialize(id: u64) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": "initialize",
        "params": {"protocolVersion": "2024-11-05", "capabilities": {}, "clientInfo": {"name": "e2e", "version": "1"}}
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_routed_gateway_end_to_end() {
    let logs = tempfile::tempdir().unwrap();
    let mut gw = start(&stdin_config(&["testserver"]), "--routed", logs.path()).await;
    let client = reqwest::Client::new();

    let server = &gw.document["mcpServers"]["testserver"];
    assert_eq!(server["type"], "http");
    let url = server["url"].as_str().unwrap().to_string();
    assert_eq!(url, format!("{}/mcp/testserver", gw.base));
    assert_eq!(server["headers"]["Authorization"], API_KEY);

    let health: Value = client
        .get(format!("{}/health", gw.base))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["servers"]["testserver"]["status"], "running");
    assert_eq!(health["servers"]["testserver"]["tools"], 2);

    let unauthorized = rpc(&client, &url, None, initialize(1)).await;
    assert_eq!(unauthorized.status(), 401);

    let resp = rpc(&client, &url, Some(API_KEY), initialize(1)).await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["jsonrpc"], "2.0");

    let body: Value = rpc(
        &client,
        &url,
        Some(API_KEY),
        json!({"jsonrpc": "2.0", "id": "call-1", "method": "tools/call",
               "params": {"name": "echo", "arguments": {"message": "hello"}}}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body["id"], "call-1");
    assert_eq!(body["result"]["content"][0]["text"], "hello");

    let log_path = logs.path().join("mcp-gateway.log");
    let size_before = std::fs::metadata(&log_path).unwrap().len();

    terminate(&gw.child);
    let status = tokio::time::timeout(Duration::from_secs(20), gw.child.wait())
        .await
        .expect("gateway did not exit after SIGTERM")
        .unwrap();
    assert_eq!(status.code(), Some(0));

    use std::os::unix::fs::PermissionsExt;
    let meta = std::fs::metadata(&log_path).unwrap();
    assert_eq!(meta.permissions().mode() & 0o777, 0o644);
    assert!(meta.len() >= size_before);
    let log = std::fs::read_to_string(&log_path).unwrap();
    assert!(log.contains("MCP Gateway"));
    assert!(log.contains("Registered 2 tools from testserver"));
    assert!(!log.contains(API_KEY));
    assert!(!log.contains("\"direction\""));

    let rpc_log = std::fs::read_to_string(logs.path().join("rpc-messages.jsonl")).unwrap();
    let entries: Vec<Value> = rpc_log
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let call_out = entries
        .iter()
        .find(|e| e["method"] == "tools/call" && e["direction"] == "OUT")
        .expect("outbound tools/call recorded");
    assert_eq!(call_out["server_id"], "testserver");
    assert_eq!(call_out["type"], "REQUEST");
    assert!(entries
        .iter()
        .any(|e| e["method"] == "tools/call" && e["direction"] == "IN" && e["type"] == "RESPONSE"));
    assert!(entries.iter().any(|e| e["method"] == "initialize"));
}

#[tokio::test]
async fn test_unified_gateway_end_to_end() {
    let logs = tempfile::tempdir().unwrap();
    let mut gw = start(&stdin_config(&["backend1", "backend2"]), "--unified", logs.path()).await;
    let client = reqwest::Client::new();
    let url = format!("{}/mcp", gw.base);

    assert_eq!(gw.document["mcpServers"]["backend1"]["url"], url.as_str());
    assert_eq!(gw.document["mcpServers"]["backend2"]["url"], url.as_str());

    let body: Value = rpc(&client, &url, Some(API_KEY), initialize(1)).await.json().await.unwrap();
    assert_eq!(body["jsonrpc"], "2.0");
    assert_eq!(body["result"]["serverInfo"]["name"], "mcpg-unified");

    let body: Value = rpc(
        &client,
        &url,
        Some(API_KEY),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await
    .json()
    .await
    .unwrap();
    let names: Vec<&str> = body["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(
        names,
        vec!["backend1___echo", "backend1___add", "backend2___echo", "backend2___add"]
    );

    let body: Value = rpc(
        &client,
        &url,
        Some(API_KEY),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "backend2___add", "arguments": {"a": 2, "b": 3}}}),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body["result"]["content"][0]["text"], "5");

    let close = client
        .post(format!("{}/close", gw.base))
        .header("Authorization", API_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(close.status(), 200);
    let close: Value = close.json().await.unwrap();
    assert_eq!(close["status"], "closed");
    assert_eq!(close["serversTerminated"], 2);

    let again: Value = client
        .post(format!("{}/close", gw.base))
        .header("Authorization", API_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(again["serversTerminated"], 0);

    terminate(&gw.child);
    let status = tokio::time::timeout(Duration::from_secs(20), gw.child.wait())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.code(), Some(0));
}

#[tokio::test]
async fn test_invalid_configuration_exits_with_error() {
    let logs = tempfile::tempdir().unwrap();
    let output = Command::new(GATEWAY)
        .args(["--config", "/nonexistent/mcpg.toml", "--log-dir"])
        .arg(logs.path())
        .output()
        .await
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!output.stderr.is_empty());
}

#[tokio::test]
async fn test_port_in_use_exits_with_error() {
    let logs = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap();

    let mut child = Command::new(GATEWAY)
        .args(["--config-stdin", "--listen"])
        .arg(addr.to_string())
        .arg("--log-dir")
        .arg(logs.path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    let mut stdin = child.stdin.take().unwrap();
    stdin
        .write_all(stdin_config(&["testserver"]).to_string().as_bytes())
        .await
        .unwrap();
    drop(stdin);

    let output = tokio::time::timeout(Duration::from_secs(20), child.wait_with_output())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    drop(taken);
}
