//! Interrupt/signal handling for graceful shutdown
//!
//! Holds the process-wide cancellation token that every supervisor task
//! observes. It is cancelled exactly once, from the Ctrl+C handler.

use std::sync::OnceLock;

use tokio_util::sync::CancellationToken;

static SHUTDOWN: OnceLock<CancellationToken> = OnceLock::new();

/// The process-wide shutdown token. Clones share the same cancellation state.
pub fn shutdown_token() -> CancellationToken {
    SHUTDOWN.get_or_init(CancellationToken::new).clone()
}

/// Cancel the shutdown token (called from the signal handler).
pub fn trigger_shutdown() {
    shutdown_token().cancel();
}

/// Check if shutdown was requested.
#[inline]
pub fn shutdown_requested() -> bool {
    shutdown_token().is_cancelled()
}
