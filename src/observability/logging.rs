//! Structured logging.
//!
//! # Responsibilities
//! - Install the global tracing subscriber
//! - Honor `RUST_LOG` first, the configured level second
//!
//! # Design Decisions
//! - JSON lines for machine consumption, pretty format otherwise
//! - Installing twice is not an error; the first subscriber wins

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::schema::LoggingConfig;

/// Filter directives used when `RUST_LOG` is unset.
pub fn default_directives(config: &LoggingConfig) -> String {
    format!("soap_dispatch={}", config.level)
}

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directives(config).into());

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_use_level() {
        let config = LoggingConfig {
            level: "trace".into(),
            json: false,
        };
        assert_eq!(default_directives(&config), "soap_dispatch=trace");
    }
}
