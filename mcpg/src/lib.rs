//! mcpg command-line gateway.
//!
//! Argument parsing, `.env` loading, file logging and the startup and
//! shutdown sequence around the `mcpg-server` frontend.

pub mod cli;
pub mod env_file;
pub mod error;
pub mod gateway;
pub mod logging;
