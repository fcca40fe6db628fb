//! Command-line surface.
//!
//! Kept apart from `main.rs` so tests can parse arguments directly.

use std::path::PathBuf;

use clap::{ArgGroup, Parser};

use mcpg_core::config::{DEFAULT_PORT, GatewaySettings};
use mcpg_server::GatewayMode;

/// Log directory used when neither `--log-dir` nor the env var is set.
pub const DEFAULT_LOG_DIR: &str = "/tmp/gh-aw/mcp-logs";

/// Host used when `--listen` is absent.
pub const DEFAULT_LISTEN_HOST: &str = "127.0.0.1";

/// Expose stdio and HTTP MCP servers behind one authenticated HTTP endpoint.
#[derive(Parser, Debug, Clone)]
#[command(name = "mcpg", version, about, long_about = None)]
#[command(group(ArgGroup::new("source").args(["config", "config_stdin"]).required(true)))]
pub struct Cli {
    /// Configuration file (TOML, or JSON when it ends in `.json`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Read a JSON configuration document from stdin.
    #[arg(long)]
    pub config_stdin: bool,

    /// Listen address, `host:port`.
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Expose each backend at `/mcp/<name>`.
    #[arg(long, conflicts_with = "unified")]
    pub routed: bool,

    /// Expose every backend behind `/mcp` (default).
    #[arg(long)]
    pub unified: bool,

    /// Directory for `mcp-gateway.log`.
    #[arg(long, env = "MCP_GATEWAY_LOG_DIR", default_value = DEFAULT_LOG_DIR)]
    pub log_dir: PathBuf,

    /// `.env` file loaded into the environment before the configuration is read.
    #[arg(long = "env")]
    pub env_file: Option<PathBuf>,
}

impl Cli {
    pub fn mode(&self) -> GatewayMode {
        if self.routed {
            GatewayMode::Routed
        } else {
            GatewayMode::Unified
        }
    }

    /// `--listen`, else the configured port on localhost, else port 3000.
    pub fn listen_addr(&self, settings: &GatewaySettings) -> String {
        match &self.listen {
            Some(addr) => addr.clone(),
            None => format!(
                "{DEFAULT_LISTEN_HOST}:{}",
                settings.port.unwrap_or(DEFAULT_PORT)
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(args)
    }

    #[test]
    #[serial]
    fn test_defaults() {
        let cli = parse(&["mcpg", "--config", "gateway.toml"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("gateway.toml")));
        assert_eq!(cli.mode(), GatewayMode::Unified);
        assert!(cli.env_file.is_none());
        if std::env::var_os("MCP_GATEWAY_LOG_DIR").is_none() {
            assert_eq!(cli.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        }
    }

    #[test]
    fn test_config_source_required() {
        assert!(parse(&["mcpg"]).is_err());
        assert!(parse(&["mcpg", "--config", "a.toml", "--config-stdin"]).is_err());
        assert!(parse(&["mcpg", "--config-stdin"]).is_ok());
    }

    #[test]
    fn test_modes_are_exclusive() {
        let cli = parse(&["mcpg", "--config-stdin", "--routed"]).unwrap();
        assert_eq!(cli.mode(), GatewayMode::Routed);
        assert!(parse(&["mcpg", "--config-stdin", "--routed", "--unified"]).is_err());
    }

    #[test]
    fn test_listen_precedence() {
        let mut settings = GatewaySettings::default();
        let cli = parse(&["mcpg", "--config-stdin"]).unwrap();
        assert_eq!(cli.listen_addr(&settings), "127.0.0.1:3000");

        settings.port = Some(8080);
        assert_eq!(cli.listen_addr(&settings), "127.0.0.1:8080");

        let cli = parse(&["mcpg", "--config-stdin", "-l", "0.0.0.0:9000"]).unwrap();
        assert_eq!(cli.listen_addr(&settings), "0.0.0.0:9000");
    }

    #[test]
    #[serial]
    fn test_log_dir_from_env() {
        // SAFETY: serialized with the other env-reading test.
        unsafe { std::env::set_var("MCP_GATEWAY_LOG_DIR", "/var/log/mcpg") };
        let cli = parse(&["mcpg", "--config-stdin"]);
        unsafe { std::env::remove_var("MCP_GATEWAY_LOG_DIR") };
        assert_eq!(cli.unwrap().log_dir, PathBuf::from("/var/log/mcpg"));
    }
}
