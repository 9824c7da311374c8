//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (JSON, PascalCase keys)
//!     → loader.rs (parse & deserialize)
//!     → Config (plain data, defaults for missing fields)
//!     → store.rs (ConfigStore, atomic wholesale swap)
//!     → injected into consumers at construction
//!
//! On file change:
//!     watcher.rs detects write/remove
//!     → loader.rs loads new config (missing file keeps the old one)
//!     → ConfigStore::replace swaps the whole value
//!     → readers observe entirely-old or entirely-new, never a mix
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults so a minimal (or missing) file works
//! - No global config value: the store instance is passed to consumers

pub mod loader;
pub mod schema;
pub mod store;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{Config, ServerConfig};
pub use store::ConfigStore;
pub use watcher::ConfigWatcher;
