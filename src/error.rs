//! Error definitions for registration and dispatch.
//!
//! # Design Decisions
//! - Registration failures are returned, never panicked, so the caller can
//!   abort startup or skip the offending endpoint
//! - Dispatch never fails for "no match"; an empty result is returned instead

use thiserror::Error;

/// Errors raised by the matching engines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// Malformed URI template syntax.
    #[error("invalid template '{template}': {reason}")]
    Format { template: String, reason: String },

    /// Two or more templates can match the same request.
    #[error("{}", conflict_message(.first, .second, .reason))]
    Conflict {
        first: String,
        second: Option<String>,
        reason: String,
    },

    /// Operation invoked on the wrong matching engine.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Address string is not an absolute URI.
    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    /// The same filter descriptor was registered twice.
    #[error("filter already registered: {0}")]
    DuplicateFilter(String),

    /// A single-result lookup found more than one match.
    #[error("{count} registrations match the request")]
    MultipleMatches { count: usize },
}

fn conflict_message(first: &str, second: &Option<String>, reason: &str) -> String {
    match second {
        Some(second) => format!("templates '{}' and '{}' conflict: {}", first, second, reason),
        None => format!("template '{}' conflicts: {}", first, reason),
    }
}

impl DispatchError {
    pub(crate) fn format(template: &str, reason: impl Into<String>) -> Self {
        Self::Format {
            template: template.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn conflict(first: &str, second: Option<&str>, reason: impl Into<String>) -> Self {
        Self::Conflict {
            first: first.to_string(),
            second: second.map(str::to_string),
            reason: reason.into(),
        }
    }

    /// True for errors caused by ambiguous registrations.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True for malformed template syntax.
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

/// Result type for registration and dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;
