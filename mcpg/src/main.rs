//! mcpg entry point.
//!
//! Exit codes: 0 after a signal-initiated shutdown, 1 when configuration
//! loading or binding the listener fails.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};

use mcpg::cli::Cli;
use mcpg::env_file::load_env_file;
use mcpg::gateway::{RunOptions, run};
use mcpg::logging::init_logging;
use mcpg_core::config::{self, GatewayConfig};

fn main() {
    let cli = Cli::parse();

    // The environment is mutated here, before any thread is spawned.
    let env_loaded = match cli.env_file.as_deref().map(load_env_file).transpose() {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("mcpg: {e}");
            std::process::exit(1);
        }
    };

    let logging = init_logging(&cli.log_dir);
    if let (Some(path), Some(loaded)) = (&cli.env_file, env_loaded) {
        info!(path = %path.display(), loaded, "loaded environment file");
    }

    let code = match start(cli) {
        Ok(()) => 0,
        Err(e) => {
            error!("{e:#}");
            eprintln!("mcpg: {e:#}");
            1
        }
    };
    // Flush buffered log lines before exiting.
    drop(logging);
    std::process::exit(code);
}

fn start(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let options = RunOptions {
        listen: cli.listen_addr(&config.gateway),
        mode: cli.mode(),
        config,
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(run(options))?;
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<GatewayConfig> {
    let config = match &cli.config {
        Some(path) if !cli.config_stdin => config::load_from_path(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        _ => config::load_from_reader(std::io::stdin().lock())
            .context("failed to read configuration from stdin")?,
    };
    info!(
        servers = config.servers.len(),
        names = ?config.server_names().collect::<Vec<_>>(),
        "configuration loaded"
    );
    Ok(config)
}
