//! Runtime statistics attached to keepalive pings.
//!
//! # Responsibilities
//! - Count the events the session manager produces (pings, asks, fallbacks,
//!   reconnects, notifications) plus connections reported by the
//!   interception side
//! - Serialize a consistent snapshot for the ping payload
//!
//! # Design Decisions
//! - Counters live behind one RwLock; writers take the write lock for a
//!   single increment, the snapshot takes the read lock only while copying
//! - The snapshot is taken before the network send, never across it

use std::sync::RwLock;
use std::time::Instant;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    connections: u64,
    pings: u64,
    asks: u64,
    answered: u64,
    fallbacks: u64,
    reconnects: u64,
    notifications: u64,
}

/// Point-in-time view of the statistics, as sent to the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub uptime_secs: u64,
    pub connections: u64,
    pub pings: u64,
    pub asks: u64,
    pub answered: u64,
    pub fallbacks: u64,
    pub reconnects: u64,
    pub notifications: u64,
}

/// Shared counter store. Owned by the daemon composition root; the session
/// manager only increments and snapshots it.
#[derive(Debug)]
pub struct Statistics {
    started: Instant,
    counters: RwLock<Counters>,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            counters: RwLock::new(Counters::default()),
        }
    }

    /// Recorded by the interception side for every connection it sees.
    pub fn record_connection(&self) {
        self.counters.write().unwrap().connections += 1;
    }

    pub fn record_ping(&self) {
        self.counters.write().unwrap().pings += 1;
    }

    /// An ask that came back with a server verdict.
    pub fn record_ask_answered(&self) {
        let mut c = self.counters.write().unwrap();
        c.asks += 1;
        c.answered += 1;
    }

    /// An ask resolved locally (fallback or undecided).
    pub fn record_ask_fallback(&self) {
        let mut c = self.counters.write().unwrap();
        c.asks += 1;
        c.fallbacks += 1;
    }

    pub fn record_reconnect(&self) {
        self.counters.write().unwrap().reconnects += 1;
    }

    pub fn record_notification(&self) {
        self.counters.write().unwrap().notifications += 1;
    }

    /// Copy the counters out under the read lock.
    pub fn snapshot(&self) -> StatsSnapshot {
        let c = *self.counters.read().unwrap();
        StatsSnapshot {
            uptime_secs: self.started.elapsed().as_secs(),
            connections: c.connections,
            pings: c.pings,
            asks: c.asks,
            answered: c.answered,
            fallbacks: c.fallbacks,
            reconnects: c.reconnects,
            notifications: c.notifications,
        }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}
