//! The policy client: composition root for the session to the decision
//! server.
//!
//! # Responsibilities
//! - Wire ConfigStore, SessionState, Reconnector, ConfigWatcher and the
//!   notification channel together
//! - Expose the two entry points the rest of the daemon calls: `ask` for the
//!   interception hot path, `connected` plus the config getters for
//!   status/UI surfaces
//! - Own the process-wide shutdown signal
//!
//! # Design Decisions
//! - `ask` must always produce a verdict quickly: connectivity trouble fails
//!   open with a single-use rule, while a live-but-misbehaving server fails
//!   closed-undefined (`Undecided`), leaving policy to the caller
//! - The server endpoint is resolved once, at construction; later config
//!   reloads affect everything except the address of the running session

use std::path::PathBuf;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use crate::config::{ConfigStore, ConfigWatcher};
use crate::conn::ConnectionDescription;
use crate::lifecycle::Shutdown;
use crate::observability::logging;
use crate::proto::Notification;
use crate::rules::{Action, Rule, RuleDuration};
use crate::session::{self, Endpoint, Reconnector, SessionState, SessionStatus};
use crate::stats::Statistics;

/// Result of asking the server about one connection.
#[derive(Debug, Clone)]
pub enum AskOutcome {
    /// The server answered with a concrete rule.
    Answered(Rule),
    /// No server was reachable; a synthetic fail-open rule applies.
    Fallback(Rule),
    /// The exchange failed against a live server (rpc error, timeout or a
    /// malformed reply). No verdict is implied; the caller decides.
    Undecided,
}

impl AskOutcome {
    /// Whether the server itself produced the verdict.
    pub fn answered(&self) -> bool {
        matches!(self, AskOutcome::Answered(_))
    }

    pub fn rule(&self) -> Option<&Rule> {
        match self {
            AskOutcome::Answered(rule) | AskOutcome::Fallback(rule) => Some(rule),
            AskOutcome::Undecided => None,
        }
    }

    pub fn into_rule(self) -> Option<Rule> {
        match self {
            AskOutcome::Answered(rule) | AskOutcome::Fallback(rule) => Some(rule),
            AskOutcome::Undecided => None,
        }
    }
}

/// Bounds for the session's blocking points.
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Connection establishment.
    pub dial: Duration,
    /// One keepalive exchange.
    pub ping: Duration,
    /// One decision request. Generous: a human may be answering a dialog on
    /// the server side.
    pub ask: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(5),
            ping: Duration::from_secs(1),
            ask: Duration::from_secs(120),
        }
    }
}

/// Client half of the daemon/policy-server split.
pub struct PolicyClient {
    config: Arc<ConfigStore>,
    stats: Arc<Statistics>,
    session: Arc<SessionState>,
    shutdown: Shutdown,
    timeouts: Timeouts,
    /// Keeps the filesystem watch alive for the client's lifetime.
    _config_watcher: StdMutex<Option<RecommendedWatcher>>,
}

impl PolicyClient {
    /// Create the client and start its background tasks (reconnector loop,
    /// config watcher). Returns the receiver for server notifications.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        config: Arc<ConfigStore>,
        stats: Arc<Statistics>,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        Self::with_timeouts(config, stats, Timeouts::default())
    }

    pub fn with_timeouts(
        config: Arc<ConfigStore>,
        stats: Arc<Statistics>,
        timeouts: Timeouts,
    ) -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let endpoint = Endpoint::parse(&config.server_address());
        let events_endpoint = match config.events_address() {
            addr if addr.is_empty() => endpoint.events_rail(),
            addr => Endpoint::parse(&addr),
        };
        let session = Arc::new(SessionState::new(endpoint, timeouts.dial));
        let shutdown = Shutdown::new();
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        let client = Self {
            config: Arc::clone(&config),
            stats: Arc::clone(&stats),
            session: Arc::clone(&session),
            shutdown,
            timeouts,
            _config_watcher: StdMutex::new(None),
        };

        client.start_config_watcher();

        tokio::spawn(
            Reconnector::new(
                session,
                stats,
                events_endpoint,
                notify_tx,
                timeouts.ping,
                client.shutdown.subscribe(),
            )
            .run(),
        );

        (client, notify_rx)
    }

    fn start_config_watcher(&self) {
        let (watcher, mut updates) = ConfigWatcher::new(self.config.path());
        match watcher.run() {
            Ok(guard) => {
                *self._config_watcher.lock().unwrap() = Some(guard);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                return;
            }
        }

        let store = Arc::clone(&self.config);
        let mut shutdown_rx = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    update = updates.recv() => {
                        let Some(new_config) = update else { break };
                        if new_config.log_level != store.log_level() {
                            logging::apply_level(new_config.log_level);
                        }
                        store.replace(new_config);
                        tracing::info!("Configuration reloaded");
                    }
                }
            }
        });
    }

    /// Ask the server how to treat one intercepted connection.
    ///
    /// Never blocks when the session is down: the fail-open disconnected
    /// rule comes back immediately. When connected, the exchange serializes
    /// with keepalives and reconnects on the session's operation lock and is
    /// bounded by the ask timeout.
    pub async fn ask(&self, conn: &ConnectionDescription) -> AskOutcome {
        if self.shutdown.in_progress() || !self.session.is_connected() {
            self.stats.record_ask_fallback();
            return AskOutcome::Fallback(Rule::client_disconnected());
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        let _ops = tokio::select! {
            guard = self.session.lock_ops() => guard,
            _ = shutdown_rx.recv() => {
                self.stats.record_ask_fallback();
                return AskOutcome::Fallback(Rule::client_disconnected());
            }
        };

        let Some(rpc) = self.session.rpc_client() else {
            // Lost the transport while waiting for the lock.
            self.stats.record_ask_fallback();
            return AskOutcome::Fallback(Rule::client_disconnected());
        };

        let call = rpc.ask_rule(session::deadline_context(self.timeouts.ask), conn.clone());
        let reply = tokio::select! {
            reply = tokio::time::timeout(self.timeouts.ask, call) => reply,
            _ = shutdown_rx.recv() => {
                self.stats.record_ask_fallback();
                return AskOutcome::Fallback(Rule::client_disconnected());
            }
        };

        match reply {
            Err(_elapsed) => {
                tracing::warn!(conn = %conn, "Timed out waiting for a verdict");
                self.stats.record_ask_fallback();
                AskOutcome::Undecided
            }
            Ok(Err(e)) => {
                tracing::warn!(error = %e, conn = %conn, "Error while asking for rule");
                self.stats.record_ask_fallback();
                AskOutcome::Undecided
            }
            Ok(Ok(Err(e))) => {
                tracing::warn!(error = %e, conn = %conn, "Server gave no verdict");
                self.stats.record_ask_fallback();
                AskOutcome::Undecided
            }
            Ok(Ok(Ok(spec))) => match Rule::from_spec(&spec) {
                Ok(rule) => {
                    self.stats.record_ask_answered();
                    AskOutcome::Answered(rule)
                }
                Err(e) => {
                    // Live but misbehaving peer; distinct from connectivity
                    // trouble and no reconnect is triggered for it.
                    tracing::error!(error = %e, conn = %conn, "Malformed rule reply");
                    self.stats.record_ask_fallback();
                    AskOutcome::Undecided
                }
            },
        }
    }

    /// Whether a session to the server is currently established.
    pub fn connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status()
    }

    pub fn default_action(&self) -> Action {
        self.config.default_action()
    }

    pub fn default_duration(&self) -> RuleDuration {
        self.config.default_duration()
    }

    pub fn intercept_unknown(&self) -> bool {
        self.config.intercept_unknown()
    }

    /// Monitor method configured; empty when the config does not set one.
    pub fn proc_monitor_method(&self) -> String {
        self.config.proc_monitor_method()
    }

    /// Path of the watched configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.config.path().to_path_buf()
    }

    /// Trigger the process-wide shutdown: the reconnector exits on its next
    /// select point, in-flight exchanges are cancelled, the subscriber task
    /// is aborted.
    pub fn close(&self) {
        tracing::info!("Shutting down policy client");
        self.shutdown.trigger();
        self.session.shutdown();
    }
}
