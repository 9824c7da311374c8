//! The process-wide shutdown signal.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

/// Cancellation signal shared by every long-running task of the policy
/// client: the reconnector loop, the notification subscriber and in-flight
/// decision requests all select on it, so shutdown never hangs on a slow
/// network call. Fires once, at process exit; the hot path also reads it
/// directly to keep serving fail-open verdicts while the daemon winds down.
pub struct Shutdown {
    tx: broadcast::Sender<()>,
    triggered: AtomicBool,
}

impl Shutdown {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self {
            tx,
            triggered: AtomicBool::new(false),
        }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Fire the signal. Only the first call does anything.
    pub fn trigger(&self) {
        if self.triggered.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!("Shutdown signal fired");
        let _ = self.tx.send(());
    }

    /// Whether shutdown has been requested.
    pub fn in_progress(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }
}
