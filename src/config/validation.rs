//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check endpoint addresses and header names parse
//! - Detect duplicate or empty names
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: DispatchConfig → Result<(), Vec<ValidationError>>
//! - Template syntax and ambiguity are checked when the tables are built,
//!   not here

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::DispatchConfig;
use crate::routing::address::EndpointAddress;
use crate::routing::qname::QualifiedName;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field, e.g. `endpoints[2].address`.
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every error.
pub fn validate_config(config: &DispatchConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    let mut names = HashSet::new();
    for (i, endpoint) in config.endpoints.iter().enumerate() {
        let field = format!("endpoints[{}]", i);
        if endpoint.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !names.insert(endpoint.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate endpoint name '{}'", endpoint.name),
            ));
        }
        if let Err(e) = EndpointAddress::parse(&endpoint.address) {
            errors.push(ValidationError::new(format!("{}.address", field), e.to_string()));
        }
        for (j, header) in endpoint.required_headers.iter().enumerate() {
            if let Err(e) = header.parse::<QualifiedName>() {
                errors.push(ValidationError::new(
                    format!("{}.required_headers[{}]", field, j),
                    e.to_string(),
                ));
            }
        }
    }

    let mut names = HashSet::new();
    for (i, template) in config.templates.iter().enumerate() {
        let field = format!("templates[{}]", i);
        if template.name.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.name", field), "must not be empty"));
        } else if !names.insert(template.name.as_str()) {
            errors.push(ValidationError::new(
                format!("{}.name", field),
                format!("duplicate template name '{}'", template.name),
            ));
        }
        if template.template.trim().is_empty() {
            errors.push(ValidationError::new(format!("{}.template", field), "must not be empty"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{EndpointConfig, TemplateConfig};

    fn endpoint(name: &str, address: &str, headers: &[&str]) -> EndpointConfig {
        EndpointConfig {
            name: name.into(),
            address: address.into(),
            include_host_name: true,
            required_headers: headers.iter().map(|h| h.to_string()).collect(),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&DispatchConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = DispatchConfig::default();
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = "nowhere".into();
        config.endpoints = vec![
            endpoint("orders", "http://host/orders", &["{ns}A"]),
            endpoint("orders", "not a uri", &["{ns"]),
            endpoint("", "http://host/x", &[]),
        ];
        config.templates = vec![
            TemplateConfig { name: "get".into(), template: "/a".into() },
            TemplateConfig { name: "get".into(), template: " ".into() },
        ];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "observability.metrics_address",
                "endpoints[1].name",
                "endpoints[1].address",
                "endpoints[1].required_headers[0]",
                "endpoints[2].name",
                "templates[1].name",
                "templates[1].template",
            ]
        );
    }
}
