//! Session state machine and connection-handle ownership.
//!
//! # Responsibilities
//! - Own the one live connection handle (exclusively; it never leaves)
//! - Derive the session status from the handle's transport-level readiness
//! - Serialize dials, teardowns and rpc exchanges behind one operation lock
//!
//! # State Transitions
//! ```text
//! Disconnected → Connecting → Ready
//! Ready → TransientFailure (transport died) → Disconnected (handle discarded)
//! any → Shutdown (process-wide cancellation, terminal)
//! ```
//!
//! # Design Decisions
//! - Two locks with distinct jobs: a std mutex on the handle slot, held only
//!   for check/replace so status queries never wait on the network, and an
//!   async operation lock serializing dial/ping/ask/teardown against each
//!   other
//! - The handle is replaced, never mutated; a dead handle is discarded
//!   before any redial

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::proto::PolicyServiceClient;
use crate::session::endpoint::Endpoint;
use crate::session::SessionError;

/// Observable session status. Only `Ready` counts as connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// No handle; nothing in flight.
    Disconnected,
    /// A dial is in flight.
    Connecting,
    /// Handle present and its transport is live.
    Ready,
    /// Handle present but its transport died; the next tick discards it.
    TransientFailure,
    /// Process-wide cancellation fired. Terminal.
    Shutdown,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Ready => "ready",
            SessionStatus::TransientFailure => "transient-failure",
            SessionStatus::Shutdown => "shutdown",
        };
        write!(f, "{}", s)
    }
}

/// One live connection to the decision server: the bound rpc client plus the
/// dispatch task pumping its transport. The dispatch task ends when the
/// connection dies, which is exactly the readiness signal `status()` needs.
pub(crate) struct SessionHandle {
    client: PolicyServiceClient,
    dispatch: JoinHandle<()>,
}

impl SessionHandle {
    pub(crate) fn new(client: PolicyServiceClient, dispatch: JoinHandle<()>) -> Self {
        Self { client, dispatch }
    }

    fn transport_alive(&self) -> bool {
        !self.dispatch.is_finished()
    }

    fn close(self) {
        self.dispatch.abort();
    }
}

/// Owner of the session handle and its state machine.
pub struct SessionState {
    endpoint: Endpoint,
    dial_timeout: Duration,
    /// The one handle slot. Held only for check/replace.
    slot: Mutex<Option<SessionHandle>>,
    /// Serializes dial/teardown and every rpc exchange on this session.
    ops: tokio::sync::Mutex<()>,
    dialing: AtomicBool,
    shutdown: AtomicBool,
}

impl SessionState {
    pub fn new(endpoint: Endpoint, dial_timeout: Duration) -> Self {
        Self {
            endpoint,
            dial_timeout,
            slot: Mutex::new(None),
            ops: tokio::sync::Mutex::new(()),
            dialing: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Snapshot of the current status, derived from the handle.
    pub fn status(&self) -> SessionStatus {
        if self.shutdown.load(Ordering::Acquire) {
            return SessionStatus::Shutdown;
        }
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some(handle) if handle.transport_alive() => SessionStatus::Ready,
            Some(_) => SessionStatus::TransientFailure,
            None if self.dialing.load(Ordering::Acquire) => SessionStatus::Connecting,
            None => SessionStatus::Disconnected,
        }
    }

    /// True iff the transport is `Ready`. Every other state, including "no
    /// handle at all", is not connected.
    pub fn is_connected(&self) -> bool {
        self.status() == SessionStatus::Ready
    }

    /// Clone of the bound rpc client, if the transport is live. Crate-only:
    /// the raw handle never crosses the crate boundary.
    pub(crate) fn rpc_client(&self) -> Option<PolicyServiceClient> {
        let slot = self.slot.lock().unwrap();
        slot.as_ref()
            .filter(|handle| handle.transport_alive())
            .map(|handle| handle.client.clone())
    }

    /// Acquire the session-wide operation lock. Callers hold it across a
    /// single rpc exchange, serializing asks, keepalives and reconnects.
    pub(crate) async fn lock_ops(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.ops.lock().await
    }

    /// Dial the endpoint unless already connected. Idempotent on a `Ready`
    /// session; a handle in a failed state is discarded before the redial.
    pub async fn connect(&self) -> Result<(), SessionError> {
        if self.is_connected() {
            return Ok(());
        }
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SessionError::ShuttingDown);
        }

        let _ops = self.ops.lock().await;

        // Re-check under the lock; another caller may have finished a dial
        // while this one waited.
        {
            let mut slot = self.slot.lock().unwrap();
            match slot.as_ref() {
                Some(handle) if handle.transport_alive() => return Ok(()),
                Some(_) => {
                    if let Some(dead) = slot.take() {
                        dead.close();
                        tracing::debug!("Discarded failed session handle before redial");
                    }
                }
                None => {}
            }
        }

        self.dialing.store(true, Ordering::Release);
        let dialed = self.endpoint.dial_policy(self.dial_timeout).await;
        self.dialing.store(false, Ordering::Release);

        match dialed {
            Ok(handle) => {
                if self.shutdown.load(Ordering::Acquire) {
                    // Shutdown raced the dial; do not resurrect the session.
                    handle.close();
                    return Err(SessionError::ShuttingDown);
                }
                *self.slot.lock().unwrap() = Some(handle);
                tracing::debug!(endpoint = %self.endpoint, "Session established");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Tear down the current handle, if any. The next reconnector tick
    /// redials.
    pub async fn disconnect(&self) {
        let _ops = self.ops.lock().await;
        self.discard_handle();
    }

    /// Process-wide close. Not async and takes no operation lock: shutdown
    /// must not wait behind a slow in-flight exchange. Aborting the dispatch
    /// task makes any such exchange fail promptly instead.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
        self.discard_handle();
    }

    fn discard_handle(&self) {
        if let Some(handle) = self.slot.lock().unwrap().take() {
            handle.close();
            tracing::debug!("Session handle discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> SessionState {
        SessionState::new(Endpoint::parse("127.0.0.1:1"), Duration::from_millis(100))
    }

    #[tokio::test]
    async fn starts_disconnected() {
        let s = state();
        assert_eq!(s.status(), SessionStatus::Disconnected);
        assert!(!s.is_connected());
        assert!(s.rpc_client().is_none());
    }

    #[tokio::test]
    async fn failed_dial_leaves_disconnected() {
        // Port 1 refuses connections.
        let s = state();
        let err = s.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Dial(_) | SessionError::DialTimeout));
        assert_eq!(s.status(), SessionStatus::Disconnected);
    }

    #[tokio::test]
    async fn shutdown_is_terminal() {
        let s = state();
        s.shutdown();
        assert_eq!(s.status(), SessionStatus::Shutdown);
        assert!(!s.is_connected());
        assert!(matches!(s.connect().await, Err(SessionError::ShuttingDown)));
    }

    #[tokio::test]
    async fn disconnect_without_handle_is_noop() {
        let s = state();
        s.disconnect().await;
        assert_eq!(s.status(), SessionStatus::Disconnected);
    }
}
