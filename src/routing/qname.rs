//! Message header qualified names.

use std::fmt;
use std::str::FromStr;

/// A (namespace, local-name) pair identifying a message header.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    namespace: String,
    local_name: String,
}

impl QualifiedName {
    /// Create a qualified name from its parts.
    pub fn new(namespace: impl Into<String>, local_name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local_name: local_name.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }
}

/// Error returned when a qualified name string is malformed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedNameError(pub String);

impl fmt::Display for QualifiedNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed qualified name '{}'", self.0)
    }
}

impl std::error::Error for QualifiedNameError {}

/// Parses Clark notation: `{namespace}local`, or a bare `local` for the
/// empty namespace.
impl FromStr for QualifiedName {
    type Err = QualifiedNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || QualifiedNameError(s.to_string());
        let (namespace, local) = match s.strip_prefix('{') {
            Some(rest) => rest.split_once('}').ok_or_else(bad)?,
            None => ("", s),
        };
        if local.is_empty() || local.contains(['{', '}']) {
            return Err(bad());
        }
        Ok(Self::new(namespace, local))
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            write!(f, "{}", self.local_name)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local_name)
        }
    }
}
