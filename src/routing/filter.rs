//! Filter descriptors supplied at registration time.
//!
//! The kind of a filter is resolved once, when it is handed to a table; no
//! kind checks happen on the dispatch path.

use std::fmt;

use crate::error::{DispatchError, DispatchResult};
use crate::routing::address::{EndpointAddress, HostComparisonMode};
use crate::routing::qname::QualifiedName;

/// Address filter: destination address plus the headers a message must carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AddressFilter {
    address: EndpointAddress,
    include_host_name: bool,
    required_headers: Vec<QualifiedName>,
}

impl AddressFilter {
    /// Create a filter. Duplicate header names are collapsed, keeping the
    /// first occurrence.
    pub fn new(
        address: EndpointAddress,
        include_host_name: bool,
        required_headers: impl IntoIterator<Item = QualifiedName>,
    ) -> Self {
        let mut headers: Vec<QualifiedName> = Vec::new();
        for header in required_headers {
            if !headers.contains(&header) {
                headers.push(header);
            }
        }
        Self {
            address,
            include_host_name,
            required_headers: headers,
        }
    }

    /// Create a filter from an absolute URI string.
    pub fn parse(
        uri: &str,
        include_host_name: bool,
        required_headers: impl IntoIterator<Item = QualifiedName>,
    ) -> DispatchResult<Self> {
        Ok(Self::new(
            EndpointAddress::parse(uri)?,
            include_host_name,
            required_headers,
        ))
    }

    pub fn address(&self) -> &EndpointAddress {
        &self.address
    }

    pub fn include_host_name(&self) -> bool {
        self.include_host_name
    }

    pub fn comparison_mode(&self) -> HostComparisonMode {
        HostComparisonMode::from_include_host(self.include_host_name)
    }

    /// Required header names, in declaration order.
    pub fn required_headers(&self) -> &[QualifiedName] {
        &self.required_headers
    }
}

impl fmt::Display for AddressFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)?;
        if !self.include_host_name {
            write!(f, " (any host)")?;
        }
        if !self.required_headers.is_empty() {
            let names: Vec<String> = self.required_headers.iter().map(|h| h.to_string()).collect();
            write!(f, " [{}]", names.join(", "))?;
        }
        Ok(())
    }
}

/// A filter of any kind accepted by the dispatch layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageFilter {
    /// Longest-prefix address match; handled by the address table.
    PrefixAddress(AddressFilter),
    /// Exact address match; not served by either table in this crate.
    ExactAddress(AddressFilter),
    /// URI template; handled by the template table.
    Template(String),
}

impl MessageFilter {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PrefixAddress(_) => "prefix address",
            Self::ExactAddress(_) => "exact address",
            Self::Template(_) => "template",
        }
    }

    /// Unwrap a prefix address filter, or fail for any other kind.
    pub(crate) fn into_prefix_address(self, table: &str) -> DispatchResult<AddressFilter> {
        match self {
            Self::PrefixAddress(filter) => Ok(filter),
            other => Err(wrong_kind(&other, table)),
        }
    }

    /// Unwrap a template filter, or fail for any other kind.
    pub(crate) fn into_template(self, table: &str) -> DispatchResult<String> {
        match self {
            Self::Template(template) => Ok(template),
            other => Err(wrong_kind(&other, table)),
        }
    }
}

pub(crate) fn wrong_kind(filter: &MessageFilter, table: &str) -> DispatchError {
    DispatchError::InvalidOperation(format!(
        "{} filter cannot be used with the {}",
        filter.kind(),
        table
    ))
}
