//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Address table, template table, config watcher produce:
//!     → logging.rs (structured log events via tracing)
//!     → metrics.rs (registration/dispatch counters, bucket gauge)
//!
//! Consumers:
//!     → stdout (pretty or JSON lines)
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```
//!
//! # Design Decisions
//! - Structured fields, not formatted strings
//! - Metric updates go through the `metrics` facade; without an installed
//!   recorder they are no-ops, so library users pay nothing by default

pub mod logging;
pub mod metrics;
