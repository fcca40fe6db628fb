//! Backend connection state machine.
//!
//! ```text
//! Disconnected → Connecting → Initializing → Ready
//!                    │             │           │
//!                    └─────────────┴───────────┴──→ Failed
//!
//! any state ──(/close)──→ Stopped
//! ```
//!
//! `Ready → Failed` happens only on a fatal transport error (the subprocess
//! exited). Failed and Stopped are terminal apart from `Failed → Stopped`.

use parking_lot::RwLock;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendState {
    Disconnected,
    Connecting,
    Initializing,
    Ready,
    Failed,
    Stopped,
}

impl BackendState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Stopped => "stopped",
        }
    }

    /// True once the startup attempt has resolved one way or the other.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Stopped)
    }

    pub fn can_transition_to(self, next: BackendState) -> bool {
        use BackendState::*;
        match (self, next) {
            (Stopped, _) => false,
            (_, Stopped) => true,
            (Disconnected, Connecting) => true,
            (Connecting, Initializing | Failed) => true,
            (Initializing, Ready | Failed) => true,
            (Ready, Failed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BackendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid backend state transition {from} -> {to}")]
pub struct StateError {
    pub from: BackendState,
    pub to: BackendState,
}

#[derive(Debug)]
struct Inner {
    state: BackendState,
    error: Option<String>,
}

/// Current state plus the reason for the last failure.
#[derive(Debug)]
pub struct StateCell {
    inner: RwLock<Inner>,
}

impl Default for StateCell {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Inner {
                state: BackendState::Disconnected,
                error: None,
            }),
        }
    }
}

impl StateCell {
    pub fn get(&self) -> BackendState {
        self.inner.read().state
    }

    /// Reason recorded with the transition to Failed.
    pub fn error(&self) -> Option<String> {
        self.inner.read().error.clone()
    }

    /// Apply a guarded transition. Entering Failed records `reason`.
    pub fn transition(&self, next: BackendState, reason: Option<String>) -> Result<BackendState, StateError> {
        let mut inner = self.inner.write();
        let from = inner.state;
        if !from.can_transition_to(next) {
            return Err(StateError { from, to: next });
        }
        inner.state = next;
        if next == BackendState::Failed {
            inner.error = reason;
        }
        Ok(from)
    }
}
