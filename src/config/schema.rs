//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the
//! dispatcher. All types derive Serde traits for deserialization from
//! TOML files.

use serde::{Deserialize, Serialize};

use crate::routing::router::HostLookup;

/// Root configuration for the dispatcher.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// Log output settings.
    pub logging: LoggingConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Matching engine behavior.
    pub matching: MatchingConfig,

    /// Address-filtered endpoints.
    pub endpoints: Vec<EndpointConfig>,

    /// Template-filtered operations.
    pub templates: Vec<TemplateConfig>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Emit JSON lines instead of the pretty format.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Matching engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    /// Permit equivalent templates to share a path group.
    pub allow_duplicate_templates: bool,

    /// Which address indices a dispatch consults.
    pub host_lookup: HostLookup,

    /// Path prefix stripped from requests before template matching.
    pub base_path: Option<String>,
}

/// An endpoint registered in the address table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct EndpointConfig {
    /// Unique endpoint name; the dispatch result.
    pub name: String,

    /// Absolute endpoint URI (e.g., "http://host:8080/services/orders").
    pub address: String,

    /// Compare scheme, host and port (true) or scheme only (false).
    #[serde(default = "default_include_host_name")]
    pub include_host_name: bool,

    /// Header names in Clark notation, `{namespace}local`.
    #[serde(default)]
    pub required_headers: Vec<String>,
}

fn default_include_host_name() -> bool {
    true
}

/// An operation registered in the template table.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct TemplateConfig {
    /// Unique operation name; the dispatch result.
    pub name: String,

    /// URI template, e.g. `/orders/{id}?format=xml`.
    pub template: String,
}
