//! Backend connections: state machine, handshake and the manager that owns them.

pub mod connection;
pub mod manager;
pub mod state;

pub use connection::BackendConnection;
pub use manager::{BackendManager, StartupSummary};
pub use state::{BackendState, StateError};
