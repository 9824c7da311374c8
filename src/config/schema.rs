//! Configuration schema definitions.
//!
//! The on-disk format is a JSON object with PascalCase keys, matching the
//! config files the server side writes. All fields default when missing so a
//! partial (or absent) file still yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::rules::{Action, RuleDuration};

/// Root daemon configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Decision-server connection settings.
    #[serde(rename = "Server")]
    pub server: ServerConfig,

    /// Action applied when no rule matches and no server verdict arrives.
    #[serde(rename = "DefaultAction")]
    pub default_action: Action,

    /// Duration attached to default verdicts.
    #[serde(rename = "DefaultDuration")]
    pub default_duration: RuleDuration,

    /// Whether to intercept connections that could not be attributed to a
    /// process.
    #[serde(rename = "InterceptUnknown")]
    pub intercept_unknown: bool,

    /// How processes are attributed to connections ("proc", "ebpf", ...).
    /// The process-monitor subsystem interprets the value.
    #[serde(rename = "ProcMonitorMethod")]
    pub proc_monitor_method: String,

    /// Logger verbosity: 0 debug, 1 info, 2 warn, 3+ error. Absent means
    /// info.
    #[serde(rename = "LogLevel")]
    pub log_level: Option<u32>,
}

/// Where and how to reach the decision server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Main (decision rail) address: `unix:///path`, a bare absolute path,
    /// or `host:port`.
    #[serde(rename = "Address")]
    pub address: String,

    /// Push (events rail) address. Derived from `Address` when empty:
    /// `<path>.events` for unix sockets, port + 1 for network addresses.
    #[serde(rename = "EventsAddress")]
    pub events_address: String,

    /// Log file the server side is asked to write to. Unused by the daemon
    /// itself.
    #[serde(rename = "LogFile")]
    pub log_file: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "unix:///run/netsentineld.sock".to_string(),
            events_address: String::new(),
            log_file: String::new(),
        }
    }
}
