//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Initialize logging → Construct client → Run
//!
//! Shutdown (shutdown.rs):
//!     Signal received → broadcast to all tasks → tasks exit on next
//!     select point → process exits
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → trigger the one process-wide shutdown
//! ```

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
