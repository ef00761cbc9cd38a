//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use soap_dispatch::{AddressFilter, QualifiedName, RequestDescriptor};

/// Parse a Clark-notation header name.
pub fn qn(name: &str) -> QualifiedName {
    name.parse().unwrap()
}

/// Address filter for `uri` requiring `headers`.
pub fn filter(uri: &str, include_host: bool, headers: &[&str]) -> AddressFilter {
    AddressFilter::parse(uri, include_host, headers.iter().map(|h| qn(h))).unwrap()
}

/// Request to `uri` carrying `headers`.
pub fn request(uri: &str, headers: &[&str]) -> RequestDescriptor {
    headers
        .iter()
        .fold(RequestDescriptor::from_uri(uri).unwrap(), |req, h| req.with_header(qn(h)))
}

/// Decoded query pairs.
pub fn query(raw: &str) -> Vec<(String, String)> {
    soap_dispatch::template::parse_query_string(raw)
}

/// Write `content` to a fresh file in the system temp directory.
pub fn write_temp_config(content: &str) -> PathBuf {
    static COUNTER: AtomicU32 = AtomicU32::new(0);
    let dir = std::env::temp_dir().join(format!(
        "soap-dispatch-test-{}-{}",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::SeqCst)
    ));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("dispatch.toml");
    std::fs::write(&path, content).unwrap();
    path
}
