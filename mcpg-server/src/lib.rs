//! HTTP frontend for the mcpg gateway.
//!
//! Exposes the configured backends over one authenticated axum server,
//! either routed (`/mcp/{name}`) or unified (`/mcp`), plus the `/health`
//! and `/close` lifecycle endpoints and the stdout config document.

pub mod auth;
pub mod close;
pub mod dispatch;
pub mod emitter;
pub mod health;
pub mod router;
pub mod serve;
pub mod state;
pub mod streaming;

pub use router::build_router;
pub use state::{AppState, GatewayMode, GatewayState};
