//! Configuration error types.
//!
//! Every variant is fatal: the process reports it and exits before the HTTP
//! listener is bound.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    // ─────────────────────────────────────────────────────────────────────────
    // Source errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Neither `--config` nor `--config-stdin` was given.
    #[error("configuration source required: specify either --config <file> or --config-stdin")]
    NoSource,

    /// The configuration declares no backends.
    #[error("no MCP servers configured")]
    NoServers,

    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Stdin could not be read.
    #[error("failed to read configuration from stdin: {0}")]
    Stdin(std::io::Error),

    /// TOML syntax or shape error.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// JSON syntax or shape error.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────────────────
    // Server validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Backend name is empty or uses characters outside `[A-Za-z0-9_.-]`.
    #[error("invalid server name '{name}': use letters, digits, '_', '.' or '-'")]
    InvalidServerName { name: String },

    /// Backend name contains the unified-mode namespace separator or ends in `_`.
    #[error("invalid server name '{name}': must not contain '___' or end with '_'")]
    ReservedSeparator { name: String },

    /// Unsupported `type` value.
    #[error("server '{name}': unsupported type '{kind}' (expected \"stdio\", \"local\" or \"http\")")]
    UnsupportedType { name: String, kind: String },

    /// A required field is missing for the server's transport kind.
    #[error("server '{name}': missing required field '{field}'")]
    MissingField { name: String, field: &'static str },

    /// Mutually exclusive fields were combined.
    #[error("server '{name}': '{first}' and '{second}' cannot be used together")]
    ConflictingFields {
        name: String,
        first: &'static str,
        second: &'static str,
    },

    /// HTTP backend URL is not an absolute http(s) URL.
    #[error("server '{name}': invalid URL '{url}': {message}")]
    InvalidUrl {
        name: String,
        url: String,
        message: String,
    },

    /// Container mount is not `source:dest:mode` with mode `ro` or `rw`.
    #[error("server '{name}': invalid mount '{mount}': expected 'source:dest:ro' or 'source:dest:rw'")]
    InvalidMount { name: String, mount: String },

    /// `${VAR}` referenced a variable that is not set.
    #[error(
        "undefined environment variable '{var}' referenced at {path}; \
         set it in the environment or load it with --env <file>"
    )]
    UndefinedEnvVar { var: String, path: String },

    // ─────────────────────────────────────────────────────────────────────────
    // Gateway validation errors
    // ─────────────────────────────────────────────────────────────────────────
    /// `gateway.port` outside 1..=65535.
    #[error("invalid gateway port {port}: must be between 1 and 65535")]
    InvalidPort { port: i64 },

    /// A timeout of zero seconds.
    #[error("invalid gateway {field}: must be at least 1 second")]
    InvalidTimeout { field: &'static str },
}
