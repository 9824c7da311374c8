//! Wire protocol spoken with the decision server.
//!
//! Two tarpc services make up the protocol:
//! - `PolicyService`: the decision rail. The daemon is the caller; it pings
//!   for liveness and asks for verdicts.
//! - `EventSink`: the push rail. The daemon hosts this service on a second
//!   connection (the events address) and the server calls into it to deliver
//!   out-of-band notifications.
//!
//! Rule replies travel as loosely-typed `RuleSpec`s and are validated into
//! `rules::Rule` on receipt, so a misbehaving server surfaces as a decode
//! error rather than a panic.

use serde::{Deserialize, Serialize};

use crate::conn::ConnectionDescription;
use crate::stats::StatsSnapshot;

/// Liveness probe. The server must echo `id` unchanged; the statistics
/// snapshot rides along for the server's status display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingRequest {
    /// Timestamp-derived nonce correlating request and reply.
    pub id: u64,
    pub stats: StatsSnapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingReply {
    pub id: u64,
}

/// Wire form of a rule, decoded and validated by `rules::Rule::from_spec`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: String,
    pub enabled: bool,
    pub action: String,
    pub duration: String,
    pub operator: OperatorSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorSpec {
    pub kind: String,
    pub operand: String,
    pub data: String,
}

/// Errors the server may answer an ask with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyError {
    /// The server could not produce a verdict (dialog dismissed, internal
    /// failure, ...).
    NoVerdict(String),
    /// The server is going down and will not answer.
    ShuttingDown,
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::NoVerdict(reason) => write!(f, "no verdict: {}", reason),
            PolicyError::ShuttingDown => write!(f, "server shutting down"),
        }
    }
}

impl std::error::Error for PolicyError {}

/// Out-of-band message pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub kind: NotificationKind,
    /// Kind-specific payload, JSON-encoded by the server.
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    RuleAdded,
    RuleDeleted,
    ConfigChanged,
    MonitorMethodChanged,
    /// The server asks the daemon to stop intercepting.
    Stop,
}

/// Decision rail: daemon calls, server answers.
#[tarpc::service]
pub trait PolicyService {
    /// Liveness probe. The reply must carry the request's id.
    async fn ping(req: PingRequest) -> PingReply;

    /// Ask how to treat one intercepted connection. May take as long as a
    /// human needs to answer a dialog on the server side.
    async fn ask_rule(conn: ConnectionDescription) -> Result<RuleSpec, PolicyError>;
}

/// Push rail: the daemon hosts this on the events connection, the server
/// calls it to deliver notifications in send order.
#[tarpc::service]
pub trait EventSink {
    async fn notify(notification: Notification);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_request_round_trips_json() {
        let req = PingRequest {
            id: 0x5eed,
            stats: StatsSnapshot::default(),
        };
        let json = serde_json::to_string(&req).unwrap();
        let back: PingRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn policy_error_displays_reason() {
        let err = PolicyError::NoVerdict("dialog closed".into());
        assert_eq!(err.to_string(), "no verdict: dialog closed");
    }
}
