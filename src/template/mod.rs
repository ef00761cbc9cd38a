//! URI template subsystem.
//!
//! # Data Flow
//! ```text
//! Registration:
//!     template text
//!     → compiler.rs (segments, query constraints, path shape)
//!     → disambiguation.rs (same-shape group must stay unambiguous)
//!     → table.rs (publish snapshot)
//!
//! Incoming Request (path, query):
//!     → query.rs (decode query string)
//!     → table.rs (path match per group, then specificity tiers)
//!     → Return: matches with variable bindings
//! ```

pub mod compiler;
pub mod disambiguation;
pub mod query;
pub mod table;

pub use compiler::{identify_part_type, CompiledTemplate, PartType, QueryValue, Segment, ShapeKey};
pub use disambiguation::validate_group;
pub use query::parse_query_string;
pub use table::{TemplateMatch, TemplateTable};
