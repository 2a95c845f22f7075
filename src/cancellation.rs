//! Cooperative cancellation.
//!
//! A single process-wide flag, set by a signal handler and checked at every
//! I/O suspension point. An explicit reset primitive lets tests run back to
//! back without leaking state between cases.

use std::sync::atomic::{AtomicBool, Ordering};

static CANCELLED: AtomicBool = AtomicBool::new(false);

/// Request cancellation. Safe to call from a signal handler.
pub fn request() {
    CANCELLED.store(true, Ordering::SeqCst);
}

/// True once [`request`] has been called and not yet [`reset`].
pub fn is_requested() -> bool {
    CANCELLED.load(Ordering::SeqCst)
}

/// Clear the flag. Intended for tests and for starting a fresh run in a
/// long-lived process that embeds this crate.
pub fn reset() {
    CANCELLED.store(false, Ordering::SeqCst);
}

/// Install handlers for the two POSIX soft-termination signals.
/// Each sets the cooperative flag; no in-flight I/O is forcibly aborted.
#[cfg(unix)]
pub fn install_signal_handlers() {
    use tokio::signal::unix::{SignalKind, signal};

    for kind in [SignalKind::interrupt(), SignalKind::terminate()] {
        if let Ok(mut stream) = signal(kind) {
            tokio::spawn(async move {
                if stream.recv().await.is_some() {
                    log::info!("received termination signal, requesting cancellation");
                    request();
                }
            });
        }
    }
}
