//! Gateway-wide lifecycle.
//!
//! ```text
//! Starting → Ready → Closed
//!     └──────────────↗
//! ```
//!
//! - **Starting**: at least one backend has not finished its startup attempt
//! - **Ready**: every backend is Ready or Failed
//! - **Closed**: `/close` was called or a signal arrived; terminal

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Gateway lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Starting,
    Ready,
    Closed,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Ready => write!(f, "ready"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Coordinates startup settlement and shutdown.
///
/// All state is atomic; the controller is shared as `Arc<Lifecycle>`
/// between the HTTP handlers, the backend manager and the signal handler.
pub struct Lifecycle {
    state: ArcSwap<LifecycleState>,
    started_at: Instant,
    closing: AtomicBool,
    shutdown_token: CancellationToken,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: ArcSwap::new(Arc::new(LifecycleState::Starting)),
            started_at: Instant::now(),
            closing: AtomicBool::new(false),
            shutdown_token: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// All startup attempts resolved. Ignored after close.
    pub fn mark_settled(&self) {
        if self.is_closed() {
            return;
        }
        self.state.store(Arc::new(LifecycleState::Ready));
        info!(
            startup_duration_ms = self.started_at.elapsed().as_millis() as u64,
            "all backends settled"
        );
    }

    /// Enter Closed. Returns true only for the first caller, which owns
    /// backend teardown.
    pub fn begin_close(&self) -> bool {
        if self.closing.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.state.store(Arc::new(LifecycleState::Closed));
        self.shutdown_token.cancel();
        info!(uptime_secs = self.uptime().as_secs(), "gateway closing");
        true
    }

    /// Cancelled when the gateway closes.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }
}
