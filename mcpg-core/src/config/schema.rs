//! Configuration model.
//!
//! Two layers live here: the raw serde shapes accepted on the wire (stdin JSON
//! in camelCase, TOML files in snake_case, both accepted through aliases) and
//! the validated model the rest of the gateway consumes.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default listen port when neither `--listen` nor `gateway.port` is given.
pub const DEFAULT_PORT: u16 = 3000;

/// Default deadline for one backend's connect + handshake + discovery.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(60);

/// Default deadline for a `tools/call` forwarded to a backend.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);

// ─────────────────────────────────────────────────────────────────────────────
// Raw wire shapes
// ─────────────────────────────────────────────────────────────────────────────

/// Top-level document, shared by the stdin JSON and TOML file formats.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawDocument {
    #[serde(default, alias = "servers")]
    pub mcp_servers: BTreeMap<String, RawServer>,
    #[serde(default)]
    pub gateway: Option<RawGateway>,
}

/// One backend entry as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawServer {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, alias = "working_directory", alias = "cwd")]
    pub working_directory: Option<PathBuf>,
    pub container: Option<String>,
    pub entrypoint: Option<String>,
    #[serde(default, alias = "entrypoint_args")]
    pub entrypoint_args: Vec<String>,
    #[serde(default)]
    pub mounts: Vec<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Gateway section as written by the user.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawGateway {
    pub port: Option<i64>,
    #[serde(alias = "api_key")]
    pub api_key: Option<String>,
    pub domain: Option<String>,
    #[serde(alias = "startup_timeout")]
    pub startup_timeout: Option<u64>,
    #[serde(alias = "tool_timeout")]
    pub tool_timeout: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Validated model
// ─────────────────────────────────────────────────────────────────────────────

/// Fully validated gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Backends sorted by name.
    pub servers: Vec<BackendDefinition>,
    pub gateway: GatewaySettings,
}

impl GatewayConfig {
    /// Look up a backend definition by name.
    pub fn server(&self, name: &str) -> Option<&BackendDefinition> {
        self.servers.iter().find(|s| s.name == name)
    }

    /// Backend names in configuration order.
    pub fn server_names(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|s| s.name.as_str())
    }
}

/// Gateway-wide settings.
#[derive(Clone)]
pub struct GatewaySettings {
    pub port: Option<u16>,
    /// Credential inbound callers must present. `None` disables auth.
    pub api_key: Option<String>,
    /// Host advertised in the self-describing config document.
    pub domain: Option<String>,
    pub startup_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            port: None,
            api_key: None,
            domain: None,
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

impl fmt::Debug for GatewaySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewaySettings")
            .field("port", &self.port)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("domain", &self.domain)
            .field("startup_timeout", &self.startup_timeout)
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

/// One configured backend. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDefinition {
    pub name: String,
    pub transport: TransportSpec,
}

impl BackendDefinition {
    pub fn kind(&self) -> TransportKind {
        self.transport.kind()
    }
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportSpec {
    Stdio(StdioSpec),
    Http(HttpSpec),
}

impl TransportSpec {
    pub fn kind(&self) -> TransportKind {
        match self {
            TransportSpec::Stdio(_) => TransportKind::Stdio,
            TransportSpec::Http(_) => TransportKind::Http,
        }
    }
}

/// A subprocess speaking newline-delimited JSON-RPC on stdin/stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdioSpec {
    pub command: String,
    pub args: Vec<String>,
    /// Added on top of the gateway's own environment.
    pub env: BTreeMap<String, String>,
    pub working_directory: Option<PathBuf>,
}

/// A remote MCP server reached over HTTP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpSpec {
    pub url: String,
    /// Static headers sent on every request.
    pub headers: BTreeMap<String, String>,
}

/// Transport discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stdio,
    Http,
}

impl TransportKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
