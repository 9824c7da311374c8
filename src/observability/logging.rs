//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber once, at daemon startup
//! - Map the config file's numeric LogLevel onto tracing levels
//! - Apply LogLevel changes from config reloads without restart

use std::sync::OnceLock;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

static RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Map the config file's numeric level onto a filter directive.
/// 0 debug, 1 info, 2 warn, 3 and above error; absent means info.
fn directive(level: Option<u32>) -> &'static str {
    match level {
        Some(0) => "debug",
        Some(1) | None => "info",
        Some(2) => "warn",
        Some(_) => "error",
    }
}

fn filter(level: Option<u32>) -> EnvFilter {
    // An explicit RUST_LOG wins over the config file.
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive(level)))
}

/// Initialize the global subscriber. Safe to call once; later calls are
/// no-ops (relevant for tests sharing a process).
pub fn init(level: Option<u32>) {
    let (filter_layer, handle) = reload::Layer::new(filter(level));
    let result = tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    if result.is_ok() {
        let _ = RELOAD_HANDLE.set(handle);
    }
}

/// Apply a LogLevel observed in a config reload.
pub fn apply_level(level: Option<u32>) {
    if std::env::var_os("RUST_LOG").is_some() {
        // Operator override stays in force.
        return;
    }
    if let Some(handle) = RELOAD_HANDLE.get() {
        if let Err(e) = handle.reload(filter(level)) {
            tracing::warn!(error = %e, "Failed to apply new log level");
        } else {
            tracing::info!(directive = directive(level), "Log level updated");
        }
    }
}
