//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → DispatchConfig (validated, immutable)
//!     → Dispatcher::from_config builds the matching tables
//!
//! On file change:
//!     watcher.rs sees events for the file, waits for a quiet period
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → new Dispatcher built and swapped in atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{DispatchConfig, EndpointConfig, LoggingConfig, MatchingConfig, TemplateConfig};
pub use watcher::{ConfigWatcher, WatchGuard};
