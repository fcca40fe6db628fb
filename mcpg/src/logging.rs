//! Process logging.
//!
//! Diagnostics go to `<log-dir>/mcp-gateway.log`, opened for append and
//! never truncated, readable by everyone and shared-locked so other
//! processes can tail it. If the file cannot be opened, logs fall back to
//! stderr; stdout is reserved for the configuration document.
//!
//! RPC message events (target [`RPC_LOG_TARGET`]) are kept out of that file
//! and written as JSON lines to `<log-dir>/rpc-messages.jsonl` instead.

use fs2::FileExt;
use mcpg_core::rpc_log::RPC_LOG_TARGET;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{Level, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{Targets, filter_fn};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub const LOG_FILE_NAME: &str = "mcp-gateway.log";
pub const RPC_LOG_FILE_NAME: &str = "rpc-messages.jsonl";

/// Where diagnostics ended up.
enum LogSink {
    File(PathBuf),
    Stderr(io::Error),
}

/// Keeps the non-blocking writers flushing until dropped.
pub struct LoggingGuard {
    _worker: WorkerGuard,
    _rpc_worker: Option<WorkerGuard>,
}

/// Create (or reopen) `name` in `dir`.
pub fn open_log_file(dir: &Path, name: &str) -> io::Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir)?;
    let path = dir.join(name);

    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    let file = options.open(&path)?;

    // The umask may have stripped bits from the creation mode.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644))?;
    }
    Ok((file, path))
}

/// JSON-lines layer that records RPC message events and nothing else.
pub fn rpc_layer<S, W>(writer: W) -> Box<dyn Layer<S> + Send + Sync + 'static>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .flatten_event(true)
        .with_current_span(false)
        .with_span_list(false)
        .with_target(false)
        .with_level(false)
        .with_writer(writer)
        .with_filter(Targets::new().with_target(RPC_LOG_TARGET, Level::INFO))
        .boxed()
}

/// Install the global subscriber and write the startup banner.
pub fn init_logging(dir: &Path) -> LoggingGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (sink, (writer, worker)) = match open_log_file(dir, LOG_FILE_NAME) {
        Ok((file, path)) => {
            if let Err(e) = file.try_lock_shared() {
                eprintln!("mcpg: could not lock {}: {e}", path.display());
            }
            (LogSink::File(path), tracing_appender::non_blocking(file))
        }
        Err(e) => (LogSink::Stderr(e), tracing_appender::non_blocking(io::stderr())),
    };

    let (rpc_writer, rpc_worker, rpc_error) = match open_log_file(dir, RPC_LOG_FILE_NAME) {
        Ok((file, _)) => {
            let (writer, worker) = tracing_appender::non_blocking(file);
            (Some(writer), Some(worker), None)
        }
        Err(e) => (None, None, Some(e)),
    };

    let diagnostics = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter_fn(|meta| meta.target() != RPC_LOG_TARGET))
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(diagnostics)
        .with(rpc_writer.map(rpc_layer))
        .init();

    info!("MCP Gateway {} starting", mcpg_core::GATEWAY_VERSION);
    match &sink {
        LogSink::File(path) => info!(path = %path.display(), "logging to file"),
        LogSink::Stderr(e) => {
            warn!(dir = %dir.display(), error = %e, "cannot open log file, logging to stderr")
        }
    }
    if let Some(e) = rpc_error {
        warn!(dir = %dir.display(), error = %e, "cannot open RPC message log, RPC messages are not recorded");
    }

    LoggingGuard {
        _worker: worker,
        _rpc_worker: rpc_worker,
    }
}
