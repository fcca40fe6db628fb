//! mcpg core: the transport-agnostic half of the MCP gateway.
//!
//! This library owns everything that talks to backends: JSON-RPC types and
//! classification, the error taxonomy, configuration loading, the stdio and
//! HTTP/SSE transport adapters, the per-backend connection state machine, and
//! the capability registry that feeds routed and unified dispatch.
//!
//! The HTTP frontend (`mcpg-server`) and the CLI (`mcpg`) build on top of it.

pub mod backend;
pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod lifecycle;
pub mod registry;
pub mod rpc_log;
pub mod session;
pub mod transport;

pub use error::{GatewayError, GatewayResult};

/// Protocol version the gateway negotiates with backends and advertises to clients.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Gateway version reported in `clientInfo`, `serverInfo` and `/health`.
pub const GATEWAY_VERSION: &str = env!("CARGO_PKG_VERSION");
