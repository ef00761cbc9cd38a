//! SOAP/HTTP endpoint dispatch library.
//!
//! Two matching engines decide which registered handlers receive an
//! incoming message:
//! - [`routing::AddressFilterTable`]: longest-prefix match on the
//!   destination address, then required-header filtering
//! - [`template::TemplateTable`]: URI template match on path and query,
//!   with registration-time ambiguity checks

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod observability;
pub mod routing;
pub mod template;

pub use config::schema::DispatchConfig;
pub use dispatcher::{Dispatcher, DispatcherHandle};
pub use error::{DispatchError, DispatchResult};
pub use routing::{AddressFilter, AddressFilterTable, MessageFilter, QualifiedName, RequestDescriptor};
pub use template::{TemplateMatch, TemplateTable};
