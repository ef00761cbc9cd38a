//! Dispatcher facade over both matching engines.
//!
//! # Responsibilities
//! - Build the address table and the template table from a validated config
//! - Resolve requests to endpoint names and operation names
//! - Swap in a rebuilt dispatcher when the configuration changes
//!
//! # Design Decisions
//! - Payloads are the configured names; callers map names to handlers
//! - A reload builds a complete new dispatcher first; a failed build leaves
//!   the current one in place

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::loader::ConfigError;
use crate::config::schema::DispatchConfig;
use crate::config::validation::ValidationError;
use crate::routing::filter::AddressFilter;
use crate::routing::qname::QualifiedName;
use crate::routing::router::AddressFilterTable;
use crate::routing::RequestDescriptor;
use crate::template::table::{TemplateMatch, TemplateTable};

/// Both filter tables, keyed by configured name.
pub struct Dispatcher {
    addresses: AddressFilterTable<String>,
    templates: TemplateTable<String>,
}

impl Dispatcher {
    /// Build a dispatcher, registering endpoints then templates in
    /// configuration order. The first refused entry aborts the build.
    pub fn from_config(config: &DispatchConfig) -> Result<Self, ConfigError> {
        let addresses = AddressFilterTable::new(config.matching.host_lookup);
        for endpoint in &config.endpoints {
            let registration = |source| ConfigError::Registration {
                entry: endpoint.name.clone(),
                source,
            };
            let headers = endpoint
                .required_headers
                .iter()
                .map(|h| h.parse::<QualifiedName>())
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| {
                    ConfigError::Validation(vec![ValidationError {
                        field: format!("endpoints.{}.required_headers", endpoint.name),
                        message: e.to_string(),
                    }])
                })?;
            let filter = AddressFilter::parse(&endpoint.address, endpoint.include_host_name, headers)
                .map_err(registration)?;
            addresses
                .add(filter, endpoint.name.clone())
                .map_err(registration)?;
        }

        let mut templates = TemplateTable::new(config.matching.allow_duplicate_templates);
        if let Some(base) = &config.matching.base_path {
            templates = templates.with_base_path(base);
        }
        for operation in &config.templates {
            templates
                .add(&operation.template, operation.name.clone())
                .map_err(|source| ConfigError::Registration {
                    entry: operation.name.clone(),
                    source,
                })?;
        }

        tracing::info!(
            endpoints = addresses.len(),
            buckets = addresses.candidate_set_count(),
            templates = templates.len(),
            groups = templates.group_count(),
            "Dispatcher built"
        );
        Ok(Self { addresses, templates })
    }

    /// Names of the endpoints whose address filters match the request.
    pub fn resolve(&self, request: &RequestDescriptor) -> Vec<String> {
        self.addresses.match_request(request)
    }

    /// Operations whose templates match the request path and query.
    pub fn route(&self, path: &str, query: &[(String, String)]) -> Vec<TemplateMatch<String>> {
        self.templates.match_request(path, query)
    }

    pub fn addresses(&self) -> &AddressFilterTable<String> {
        &self.addresses
    }

    pub fn templates(&self) -> &TemplateTable<String> {
        &self.templates
    }
}

/// The live dispatcher, replaceable while requests are being served.
pub struct DispatcherHandle {
    current: ArcSwap<Dispatcher>,
}

impl DispatcherHandle {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self {
            current: ArcSwap::from_pointee(dispatcher),
        }
    }

    /// Current dispatcher; stays valid even if a reload happens meanwhile.
    pub fn load(&self) -> Arc<Dispatcher> {
        self.current.load_full()
    }

    /// Rebuild from `config` and publish. On error the current dispatcher
    /// is kept.
    pub fn apply(&self, config: &DispatchConfig) -> Result<(), ConfigError> {
        let next = Dispatcher::from_config(config)?;
        self.current.store(Arc::new(next));
        tracing::info!("Dispatcher reloaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_config;

    const CONFIG: &str = r#"
        [[endpoints]]
        name = "orders"
        address = "http://host/orders"
        required_headers = ["{urn:demo}Tenant"]

        [[endpoints]]
        name = "fallback"
        address = "http://localhost/"
        include_host_name = false

        [[templates]]
        name = "get-order"
        template = "/orders/{id}"

        [[templates]]
        name = "wsdl"
        template = "/orders?wsdl"
    "#;

    #[test]
    fn test_from_config_resolves_and_routes() {
        let dispatcher = Dispatcher::from_config(&parse_config(CONFIG).unwrap()).unwrap();

        let tenant: QualifiedName = "{urn:demo}Tenant".parse().unwrap();
        let request = RequestDescriptor::from_uri("http://host/orders/7")
            .unwrap()
            .with_header(tenant);
        assert_eq!(dispatcher.resolve(&request), vec!["orders"]);

        let bare = RequestDescriptor::from_uri("http://other/orders").unwrap();
        assert_eq!(dispatcher.resolve(&bare), vec!["fallback"]);

        let routed = dispatcher.route("/orders/7", &[]);
        assert_eq!(routed.len(), 1);
        assert_eq!(routed[0].payload, "get-order");
        assert_eq!(routed[0].get("id"), Some("7"));

        let routed = dispatcher.route("/orders", &[("wsdl".into(), String::new())]);
        assert_eq!(routed[0].payload, "wsdl");
    }

    #[test]
    fn test_conflicting_template_names_entry() {
        let mut config = parse_config(CONFIG).unwrap();
        config.templates.push(crate::config::schema::TemplateConfig {
            name: "by-key".into(),
            template: "/orders/{key}".into(),
        });
        match Dispatcher::from_config(&config) {
            Err(ConfigError::Registration { entry, source }) => {
                assert_eq!(entry, "by-key");
                assert!(source.is_conflict());
            }
            other => panic!("expected registration error, got {:?}", other.err()),
        }
    }

    #[test]
    fn test_failed_reload_keeps_current() {
        let config = parse_config(CONFIG).unwrap();
        let handle = DispatcherHandle::new(Dispatcher::from_config(&config).unwrap());

        let mut broken = config.clone();
        broken.templates.push(crate::config::schema::TemplateConfig {
            name: "dup".into(),
            template: "/orders/{other}".into(),
        });
        assert!(handle.apply(&broken).is_err());
        assert_eq!(handle.load().templates().len(), 2);

        let mut smaller = config;
        smaller.templates.pop();
        handle.apply(&smaller).unwrap();
        assert_eq!(handle.load().templates().len(), 1);
    }
}
