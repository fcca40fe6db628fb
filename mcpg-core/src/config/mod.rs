//! Gateway configuration.
//!
//! Configuration is loaded once at startup and is read-only afterwards.
//! Loading, `${VAR}` expansion and validation happen before any listener is
//! bound, so every [`ConfigError`] is fatal.

mod error;
mod loader;
mod schema;

pub use error::ConfigError;
pub use loader::{load_from_path, load_from_reader, parse_json, parse_toml, substitute_env_vars};
pub use schema::{
    BackendDefinition, DEFAULT_PORT, DEFAULT_STARTUP_TIMEOUT, DEFAULT_TOOL_TIMEOUT, GatewayConfig,
    GatewaySettings, HttpSpec, StdioSpec, TransportKind, TransportSpec,
};
