//! netsentinel: resilient client-side session manager for a
//! daemon/policy-server split.
//!
//! The daemon intercepts connection attempts; for every attempt it cannot
//! resolve against cached rules it asks a separate decision server for a
//! verdict. This crate keeps that link alive, self-healing and observable:
//! one logical session carrying keepalive pings, bounded decision requests
//! and an inbound notification stream, next to a hot-reloadable local
//! configuration.

pub mod client;
pub mod config;
pub mod conn;
pub mod lifecycle;
pub mod notifications;
pub mod observability;
pub mod proto;
pub mod rules;
pub mod session;
pub mod stats;

pub use client::{AskOutcome, PolicyClient, Timeouts};
pub use config::{Config, ConfigStore};
pub use conn::ConnectionDescription;
pub use lifecycle::Shutdown;
pub use rules::{Action, Rule, RuleDuration};
pub use session::SessionStatus;
pub use stats::Statistics;
