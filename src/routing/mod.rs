//! Address-based routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (to address, headers)
//!     → router.rs (snapshot load, host lookup policy)
//!     → prefix_table.rs (longest registered path prefix)
//!     → candidate_set.rs (bucket of candidates)
//!     → matcher.rs (required mask ⊆ presence mask)
//!     → Return: payloads of all satisfied candidates, or empty
//!
//! Registration (any time, serialized):
//!     AddressFilter
//!     → copy bucket, add/remove candidate, rebuild masks
//!     → publish new snapshot
//! ```
//!
//! # Design Decisions
//! - No regex in hot path (segment-wise prefix matching only)
//! - Deterministic: same registrations always yield the same bit layout
//! - All matches are returned; callers that want one use `match_single`

pub mod address;
pub mod candidate_set;
pub mod filter;
pub mod matcher;
pub mod prefix_table;
pub mod qname;
pub mod router;

pub use address::{EndpointAddress, HostComparisonMode, RequestDescriptor};
pub use candidate_set::{Candidate, CandidateSet};
pub use filter::{AddressFilter, MessageFilter};
pub use matcher::{HeaderMask, MaskAllocator};
pub use prefix_table::UriPrefixIndex;
pub use qname::QualifiedName;
pub use router::{AddressFilterTable, HostLookup};
