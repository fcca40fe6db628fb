//! Mock stdio MCP server for end-to-end tests.
//!
//! Reads newline-delimited JSON-RPC from stdin and answers on stdout.
//! Serves two tools: `echo` returns `arguments.message`, `add` sums
//! `arguments.a` and `arguments.b`. Notifications are ignored.
//!
//! # Environment Variables
//!
//! - `MOCK_MCP_NAME`: `serverInfo.name` (default: `mock-mcp-stdio`)

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

fn tools() -> Value {
    json!([
        {
            "name": "echo",
            "description": "Echo a message back",
            "inputSchema": {
                "$schema": "http://json-schema.org/draft-07/schema#",
                "type": "object",
                "properties": {"message": {"type": "string"}},
                "required": ["message"]
            }
        },
        {
            "name": "add",
            "description": "Add two numbers",
            "inputSchema": {
                "type": "object",
                "properties": {"a": {"type": "number"}, "b": {"type": "number"}}
            }
        }
    ])
}

fn handle(request: &Value) -> Option<Value> {
    let id = request.get("id")?.clone();
    let method = request.get("method").and_then(Value::as_str).unwrap_or_default();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let result = match method {
        "initialize" => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {}},
            "serverInfo": {
                "name": std::env::var("MOCK_MCP_NAME").unwrap_or_else(|_| "mock-mcp-stdio".into()),
                "version": env!("CARGO_PKG_VERSION")
            }
        }),
        "ping" => json!({}),
        "tools/list" => json!({"tools": tools()}),
        "tools/call" => {
            let args = &params["arguments"];
            match params["name"].as_str() {
                Some("echo") => {
                    let message = args["message"].as_str().unwrap_or_default();
                    json!({"content": [{"type": "text", "text": message}]})
                }
                Some("add") => {
                    let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
                    json!({"content": [{"type": "text", "text": sum.to_string()}]})
                }
                other => {
                    return Some(json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32602, "message": format!("unknown tool: {}", other.unwrap_or(""))}
                    }));
                }
            }
        }
        other => {
            return Some(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("Method not found: {other}")}
            }));
        }
    };
    Some(json!({"jsonrpc": "2.0", "id": id, "result": result}))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let Ok(request) = serde_json::from_str::<Value>(&line) else {
            eprintln!("mock_mcp_stdio: ignoring unparseable line");
            continue;
        };
        if let Some(response) = handle(&request) {
            let mut out = response.to_string();
            out.push('\n');
            stdout.write_all(out.as_bytes()).await?;
            stdout.flush().await?;
        }
    }
    Ok(())
}
