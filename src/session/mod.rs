//! Session management for the link to the decision server.
//!
//! # Data Flow
//! ```text
//! endpoint.rs   parse address → dial → SessionHandle (client + dispatch)
//! state.rs      owns the handle, derives status, serializes operations
//! reconnect.rs  1 s loop: detect transitions, redial, keepalive
//! keepalive.rs  one ping exchange with correlation-id verification
//! ```
//!
//! The reconnector is the only writer of connection state transitions; ask
//! and keepalive share its operation lock but leave status changes to it.

pub mod endpoint;
pub mod keepalive;
pub mod reconnect;
pub mod state;

use std::time::{Duration, Instant};

use thiserror::Error;

pub use endpoint::Endpoint;
pub use keepalive::PingError;
pub use reconnect::Reconnector;
pub use state::{SessionState, SessionStatus};

/// Errors from establishing the session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("dial timed out")]
    DialTimeout,

    #[error("dial failed: {0}")]
    Dial(#[from] std::io::Error),

    #[error("shutting down")]
    ShuttingDown,
}

/// A tarpc context whose deadline matches the given bound; the default
/// context would cut long exchanges (the ask path allows 120 s) short.
pub(crate) fn deadline_context(timeout: Duration) -> tarpc::context::Context {
    let mut ctx = tarpc::context::current();
    ctx.deadline = Instant::now() + timeout;
    ctx
}
