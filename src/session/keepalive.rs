//! Periodic liveness probe against the decision server.
//!
//! A ping carries a timestamp-derived correlation id and the current
//! statistics snapshot. The server must echo the id; a different id back
//! means the peer is alive but misbehaving, which is reported distinctly
//! from a transport failure and never triggers a reconnect by itself; the
//! reconnector's status check stays the sole authority on that.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

use crate::proto::PingRequest;
use crate::session::state::SessionState;
use crate::stats::Statistics;

/// Errors a keepalive exchange can produce.
#[derive(Debug, Error)]
pub enum PingError {
    #[error("service is not connected")]
    NotConnected,

    #[error("ping timed out")]
    Timeout,

    #[error("ping rpc failed: {0}")]
    Rpc(String),

    /// Transport call succeeded but the peer echoed the wrong id.
    #[error("expected pong with id {expected:#x}, got {got:#x}")]
    IdMismatch { expected: u64, got: u64 },
}

impl PingError {
    /// Protocol violations mean a live but misbehaving peer, as opposed to
    /// connectivity trouble.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(self, PingError::IdMismatch { .. })
    }
}

/// Nonce correlating a ping with its pong.
fn correlation_id() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default()
}

/// Run one keepalive exchange. Fails immediately, without touching the
/// network, when the session is not `Ready`.
pub async fn ping(
    session: &SessionState,
    stats: &Statistics,
    timeout: Duration,
) -> Result<(), PingError> {
    if !session.is_connected() {
        return Err(PingError::NotConnected);
    }

    let _ops = session.lock_ops().await;
    let Some(client) = session.rpc_client() else {
        return Err(PingError::NotConnected);
    };

    let id = correlation_id();
    // The snapshot takes the statistics read lock only while copying, never
    // across the send.
    let request = PingRequest {
        id,
        stats: stats.snapshot(),
    };

    let reply = tokio::time::timeout(
        timeout,
        client.ping(super::deadline_context(timeout), request),
    )
    .await
    .map_err(|_| PingError::Timeout)?
    .map_err(|e| PingError::Rpc(e.to_string()))?;

    if reply.id != id {
        return Err(PingError::IdMismatch {
            expected: id,
            got: reply.id,
        });
    }
    stats.record_ping();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::endpoint::Endpoint;

    #[test]
    fn correlation_ids_are_monotonic_enough() {
        let a = correlation_id();
        std::thread::sleep(Duration::from_millis(2));
        let b = correlation_id();
        assert!(b > a);
    }

    #[tokio::test]
    async fn ping_on_disconnected_session_fails_without_network() {
        let session = SessionState::new(Endpoint::parse("127.0.0.1:1"), Duration::from_secs(1));
        let stats = Statistics::new();
        let started = std::time::Instant::now();
        let err = ping(&session, &stats, Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, PingError::NotConnected));
        assert!(!err.is_protocol_violation());
        // No network call: this returns in microseconds, not after a timeout.
        assert!(started.elapsed() < Duration::from_millis(100));
        assert_eq!(stats.snapshot().pings, 0);
    }
}
