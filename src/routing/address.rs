//! Endpoint addresses and normalized request descriptors.
//!
//! # Responsibilities
//! - Parse absolute URIs into (scheme, host, port, path)
//! - Describe an incoming request the way the transport layer hands it over
//!
//! # Design Decisions
//! - Host names are lowercased; ports default from the scheme when known
//! - Path segments are split once, empty segments dropped

use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt;

use percent_encoding::percent_decode_str;
use url::Url;

use crate::error::{DispatchError, DispatchResult};
use crate::routing::qname::QualifiedName;
use crate::template::query::parse_query_string;

/// How the host part of an address participates in matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostComparisonMode {
    /// Scheme, host, and port must all match.
    Exact,
    /// Only scheme and path are compared; any host is accepted.
    StrongWildcard,
}

impl HostComparisonMode {
    pub fn from_include_host(include_host_name: bool) -> Self {
        if include_host_name {
            Self::Exact
        } else {
            Self::StrongWildcard
        }
    }
}

/// A destination address: scheme, host, port and path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddress {
    scheme: String,
    host: String,
    port: Option<u16>,
    path: String,
}

impl EndpointAddress {
    /// Build an address from already-normalized parts.
    pub fn new(
        scheme: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        path: impl Into<String>,
    ) -> Self {
        let path = path.into();
        Self {
            scheme: scheme.into().to_ascii_lowercase(),
            host: host.into().to_ascii_lowercase(),
            port,
            path: if path.is_empty() { "/".to_string() } else { path },
        }
    }

    /// Parse an absolute URI such as `http://host:8080/svc`.
    pub fn parse(uri: &str) -> DispatchResult<Self> {
        let url = parse_url(uri)?;
        Ok(Self::from_url(&url))
    }

    fn from_url(url: &Url) -> Self {
        Self::new(
            url.scheme(),
            url.host_str().unwrap_or_default(),
            url.port_or_known_default(),
            url.path(),
        )
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Non-empty path segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        path_segments(&self.path)
    }
}

impl fmt::Display for EndpointAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme, self.host)?;
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        write!(f, "{}", self.path)
    }
}

/// Split a path into its non-empty segments.
pub fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Percent-decode one path segment. Invalid UTF-8 is replaced, not rejected.
pub fn decode_segment(segment: &str) -> Cow<'_, str> {
    percent_decode_str(segment).decode_utf8_lossy()
}

fn parse_url(uri: &str) -> DispatchResult<Url> {
    let url = Url::parse(uri).map_err(|e| DispatchError::InvalidAddress {
        address: uri.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return Err(DispatchError::InvalidAddress {
            address: uri.to_string(),
            reason: "address must be an absolute URI with a host".to_string(),
        });
    }
    Ok(url)
}

/// Normalized request descriptor handed over by the transport layer.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Destination address of the message.
    pub to: EndpointAddress,
    /// Query key/value pairs in arrival order.
    pub query: Vec<(String, String)>,
    /// Qualified names of the headers present on the message.
    pub headers: HashSet<QualifiedName>,
}

impl RequestDescriptor {
    /// Descriptor for the given destination with no query and no headers.
    pub fn new(to: EndpointAddress) -> Self {
        Self {
            to,
            query: Vec::new(),
            headers: HashSet::new(),
        }
    }

    /// Build a descriptor from an absolute URI, splitting off its query.
    pub fn from_uri(uri: &str) -> DispatchResult<Self> {
        let url = parse_url(uri)?;
        let mut request = Self::new(EndpointAddress::from_url(&url));
        if let Some(raw) = url.query() {
            request.query = parse_query_string(raw);
        }
        Ok(request)
    }

    pub fn with_header(mut self, header: QualifiedName) -> Self {
        self.headers.insert(header);
        self
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn path(&self) -> &str {
        self.to.path()
    }
}
