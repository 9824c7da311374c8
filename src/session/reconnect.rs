//! The reconnector: one background loop that keeps the session alive.
//!
//! # Responsibilities
//! - Observe the session status once per tick and detect transitions
//! - Redial while disconnected; run one keepalive while connected
//! - Start the notification subscriber on each transition to connected and
//!   tear it down on each transition away
//!
//! # Design Decisions
//! - Fixed 1 s tick, no backoff: bounded worst-case detection latency
//!   matters more than dial efficiency here, the link is local/near and the
//!   fail-open ask path depends on the status being at most a tick stale
//! - Dial and ping failures are logged and never escalate; the loop is
//!   infinite and self-healing, only the shutdown signal ends it

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::notifications;
use crate::proto::Notification;
use crate::session::endpoint::Endpoint;
use crate::session::keepalive;
use crate::session::state::SessionState;
use crate::stats::Statistics;

/// Poll interval; also the worst-case status-change detection latency.
const TICK: Duration = Duration::from_secs(1);

pub struct Reconnector {
    session: Arc<SessionState>,
    stats: Arc<Statistics>,
    events_endpoint: Endpoint,
    notifications_tx: mpsc::UnboundedSender<Notification>,
    ping_timeout: Duration,
    shutdown: broadcast::Receiver<()>,
}

impl Reconnector {
    pub fn new(
        session: Arc<SessionState>,
        stats: Arc<Statistics>,
        events_endpoint: Endpoint,
        notifications_tx: mpsc::UnboundedSender<Notification>,
        ping_timeout: Duration,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            session,
            stats,
            events_endpoint,
            notifications_tx,
            ping_timeout,
            shutdown,
        }
    }

    /// Run until the shutdown signal fires.
    pub async fn run(mut self) {
        tracing::debug!(endpoint = %self.session.endpoint(), "Session poller started");

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut was_connected = false;
        // At most one subscriber per connected period; owned here so the
        // loop can abort it the moment the session it belongs to is gone.
        let mut subscriber: Option<JoinHandle<()>> = None;

        loop {
            tokio::select! {
                _ = self.shutdown.recv() => break,
                _ = ticker.tick() => {}
            }

            let connected = self.session.is_connected();
            if connected != was_connected {
                self.on_status_change(connected, &mut subscriber).await;
                was_connected = connected;
            }

            // Dial and ping both select against the shutdown signal so a
            // slow network call cannot hold up process exit.
            if !self.session.is_connected() {
                tokio::select! {
                    _ = self.shutdown.recv() => break,
                    result = self.session.connect() => {
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "Error while connecting to the policy service");
                        }
                    }
                }
            }
            if self.session.is_connected() {
                tokio::select! {
                    _ = self.shutdown.recv() => break,
                    result = keepalive::ping(&self.session, &self.stats, self.ping_timeout) => {
                        if let Err(e) = result {
                            if e.is_protocol_violation() {
                                tracing::error!(error = %e, "Protocol violation from the policy service");
                            } else {
                                tracing::warn!(error = %e, "Error while pinging the policy service");
                            }
                        }
                    }
                }
            }
        }

        if let Some(task) = subscriber.take() {
            task.abort();
        }
        tracing::info!("Session poller exit");
    }

    async fn on_status_change(&self, connected: bool, subscriber: &mut Option<JoinHandle<()>>) {
        if connected {
            tracing::info!(endpoint = %self.session.endpoint(), "Connected to the policy service");
            self.stats.record_reconnect();
            if let Some(stale) = subscriber.take() {
                stale.abort();
            }
            *subscriber = Some(notifications::spawn_subscriber(
                self.events_endpoint.clone(),
                self.notifications_tx.clone(),
                Arc::clone(&self.stats),
            ));
        } else {
            tracing::error!("Connection to the policy service lost");
            if let Some(task) = subscriber.take() {
                task.abort();
            }
            self.session.disconnect().await;
        }
    }
}
