//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce structured tracing events
//!     → logging.rs (subscriber setup, level mapping)
//!     → stdout / log aggregation
//!
//! Config reload may carry a new LogLevel
//!     → logging.rs reload handle → level applied without restart
//! ```
//!
//! # Design Decisions
//! - tracing for structured logging throughout
//! - RUST_LOG, when set, wins over the config file's LogLevel
//! - The level is hot-swappable via a reload handle

pub mod logging;
