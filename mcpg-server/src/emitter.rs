//! Self-describing configuration document.
//!
//! After startup settles the gateway prints one JSON document to stdout that
//! lists every backend as an HTTP server reachable through this gateway, so
//! a supervisor can chain it as a backend of another layer.

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::net::SocketAddr;

use mcpg_core::config::GatewayConfig;

use crate::state::GatewayMode;

#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    pub mcp_servers: BTreeMap<String, AdvertisedServer>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct AdvertisedServer {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<BTreeMap<String, String>>,
}

/// Describe the running gateway. `domain` replaces the listen host in URLs.
pub fn build_document(config: &GatewayConfig, listen: SocketAddr, mode: GatewayMode) -> ConfigDocument {
    let base = match config.gateway.domain.as_deref() {
        Some(domain) => format!("http://{domain}:{}", listen.port()),
        None => format!("http://{listen}"),
    };
    // Raw key, no scheme.
    let headers = config
        .gateway
        .api_key
        .as_ref()
        .filter(|key| !key.is_empty())
        .map(|key| BTreeMap::from([("Authorization".to_string(), key.clone())]));

    let mcp_servers = config
        .server_names()
        .map(|name| {
            let url = match mode {
                GatewayMode::Routed => format!("{base}/mcp/{name}"),
                GatewayMode::Unified => format!("{base}/mcp"),
            };
            let server = AdvertisedServer {
                kind: "http",
                url,
                headers: headers.clone(),
            };
            (name.to_string(), server)
        })
        .collect();

    ConfigDocument { mcp_servers }
}

/// Write the document as pretty JSON followed by a newline, then flush.
pub fn write_document<W: Write>(document: &ConfigDocument, mut out: W) -> std::io::Result<()> {
    serde_json::to_writer_pretty(&mut out, document)?;
    out.write_all(b"\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcpg_core::config::parse_json;
    use serde_json::Value;

    fn config(gateway: &str) -> GatewayConfig {
        parse_json(&format!(
            r#"{{"mcpServers": {{"github": {{"command": "gh-mcp"}}, "fs": {{"command": "fs-mcp"}}}}, "gateway": {gateway}}}"#
        ))
        .unwrap()
    }

    #[test]
    fn test_routed_urls_and_raw_key() {
        let cfg = config(r#"{"apiKey": "secret-key"}"#);
        let doc = build_document(&cfg, "127.0.0.1:8080".parse().unwrap(), GatewayMode::Routed);

        let github = &doc.mcp_servers["github"];
        assert_eq!(github.kind, "http");
        assert_eq!(github.url, "http://127.0.0.1:8080/mcp/github");
        assert_eq!(
            github.headers.as_ref().unwrap()["Authorization"],
            "secret-key"
        );
        assert_eq!(doc.mcp_servers["fs"].url, "http://127.0.0.1:8080/mcp/fs");
    }

    #[test]
    fn test_unified_urls_and_domain() {
        let cfg = config(r#"{"domain": "gateway.internal"}"#);
        let doc = build_document(&cfg, "0.0.0.0:3000".parse().unwrap(), GatewayMode::Unified);

        for server in doc.mcp_servers.values() {
            assert_eq!(server.url, "http://gateway.internal:3000/mcp");
            assert!(server.headers.is_none());
        }
    }

    #[test]
    fn test_written_document_parses() {
        let cfg = config(r#"{"apiKey": "k"}"#);
        let doc = build_document(&cfg, "127.0.0.1:3000".parse().unwrap(), GatewayMode::Routed);
        let mut out = Vec::new();
        write_document(&doc, &mut out).unwrap();

        let parsed: Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["mcpServers"]["github"]["type"], "http");
        assert_eq!(parsed["mcpServers"]["github"]["headers"]["Authorization"], "k");
        assert!(out.ends_with(b"\n"));
    }
}
