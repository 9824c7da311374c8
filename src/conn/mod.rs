//! Connection-description records handed over by the interception subsystem.
//!
//! The interception layer owns how these are produced (packet capture,
//! process attribution); this crate only forwards them to the decision
//! server, so the type is a plain serializable record with no behavior.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One intercepted connection attempt, as the decision server sees it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionDescription {
    /// Transport protocol, lowercase ("tcp", "udp", ...).
    pub protocol: String,
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    /// Reverse-resolved destination host, empty when unresolved.
    pub dst_host: String,
    pub dst_port: u16,
    /// Uid owning the socket.
    pub user_id: u32,
    /// Pid of the process that opened the connection, 0 when unattributed.
    pub process_id: u32,
    pub process_path: String,
    pub process_args: Vec<String>,
}

impl fmt::Display for ConnectionDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dst = if self.dst_host.is_empty() {
            &self.dst_ip
        } else {
            &self.dst_host
        };
        write!(
            f,
            "{} {}:{} -> {}:{} (pid {})",
            self.protocol, self.src_ip, self.src_port, dst, self.dst_port, self.process_id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefers_resolved_host() {
        let conn = ConnectionDescription {
            protocol: "tcp".into(),
            src_ip: "10.0.0.2".into(),
            src_port: 51034,
            dst_ip: "142.250.74.110".into(),
            dst_host: "example.com".into(),
            dst_port: 443,
            process_id: 4321,
            ..Default::default()
        };
        let s = conn.to_string();
        assert!(s.contains("example.com:443"));
        assert!(s.contains("pid 4321"));
    }
}
