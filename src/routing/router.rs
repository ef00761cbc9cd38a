//! Address-based filter table: registration and dispatch.
//!
//! # Responsibilities
//! - Register (filter, payload) pairs under their address bucket
//! - Remove registrations, dropping buckets that become empty
//! - Dispatch a request to every candidate whose headers are satisfied
//!
//! # Design Decisions
//! - Readers load an immutable snapshot through `ArcSwap`; writers copy the
//!   touched bucket, rebuild it, and publish a new snapshot
//! - Writers are serialized by a single gate; readers never take a lock
//! - Explicit empty result rather than a silent default

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::observability::metrics;
use crate::routing::address::{EndpointAddress, HostComparisonMode, RequestDescriptor};
use crate::routing::candidate_set::CandidateSet;
use crate::routing::filter::{wrong_kind, AddressFilter, MessageFilter};
use crate::routing::prefix_table::UriPrefixIndex;

const TABLE_NAME: &str = "address filter table";

/// Which prefix indices a dispatch consults, and in which order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HostLookup {
    /// Exact-host index first; the wildcard index only if nothing was found.
    #[default]
    ExactThenWildcard,
    /// Only registrations that include the host name.
    ExactOnly,
    /// Only registrations that ignore the host name.
    WildcardOnly,
}

impl HostLookup {
    fn modes(self) -> &'static [HostComparisonMode] {
        match self {
            Self::ExactThenWildcard => &[HostComparisonMode::Exact, HostComparisonMode::StrongWildcard],
            Self::ExactOnly => &[HostComparisonMode::Exact],
            Self::WildcardOnly => &[HostComparisonMode::StrongWildcard],
        }
    }
}

struct Snapshot<P> {
    index: UriPrefixIndex<Arc<CandidateSet<P>>>,
    filters: usize,
}

impl<P> Clone for Snapshot<P> {
    fn clone(&self) -> Self {
        Self {
            index: self.index.clone(),
            filters: self.filters,
        }
    }
}

impl<P> Default for Snapshot<P> {
    fn default() -> Self {
        Self {
            index: UriPrefixIndex::default(),
            filters: 0,
        }
    }
}

/// Filter table keyed on destination address prefixes.
pub struct AddressFilterTable<P> {
    snapshot: ArcSwap<Snapshot<P>>,
    writer: Mutex<()>,
    lookup: HostLookup,
}

impl<P: Clone> Default for AddressFilterTable<P> {
    fn default() -> Self {
        Self::new(HostLookup::default())
    }
}

impl<P: Clone> AddressFilterTable<P> {
    /// Create an empty table using the given lookup policy.
    pub fn new(lookup: HostLookup) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            writer: Mutex::new(()),
            lookup,
        }
    }

    fn write_gate(&self) -> MutexGuard<'_, ()> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a filter of any kind; only prefix address filters are accepted.
    pub fn add_filter(&self, filter: MessageFilter, payload: P) -> DispatchResult<()> {
        self.add(filter.into_prefix_address(TABLE_NAME)?, payload)
    }

    /// Register a prefix address filter.
    pub fn add(&self, filter: AddressFilter, payload: P) -> DispatchResult<()> {
        let _gate = self.write_gate();
        let current = self.snapshot.load_full();
        let address = filter.address().clone();
        let mode = filter.comparison_mode();

        let mut set = match current.index.get(&address, mode) {
            Some(existing) => (**existing).clone(),
            None => CandidateSet::new(),
        };
        if set.contains(&filter) {
            return Err(DispatchError::DuplicateFilter(filter.to_string()));
        }
        let created = set.is_empty();
        let headers = filter.required_headers().len();
        set.add_candidate(Arc::new(filter), payload);
        let candidates = set.len();

        let mut next = (*current).clone();
        next.index.insert(&address, mode, Arc::new(set));
        next.filters += 1;
        let buckets = next.index.len();
        self.snapshot.store(Arc::new(next));

        tracing::debug!(
            address = %address,
            mode = ?mode,
            headers,
            candidates,
            new_bucket = created,
            "Address filter registered"
        );
        metrics::record_registration("address");
        metrics::record_candidate_sets(buckets);
        Ok(())
    }

    /// Remove a filter of any kind; non-prefix kinds are rejected.
    pub fn remove_filter(&self, filter: &MessageFilter) -> DispatchResult<bool> {
        match filter {
            MessageFilter::PrefixAddress(filter) => Ok(self.remove(filter)),
            other => Err(wrong_kind(other, TABLE_NAME)),
        }
    }

    /// Remove a previously registered filter. Returns `false` if it was
    /// never registered.
    pub fn remove(&self, filter: &AddressFilter) -> bool {
        let _gate = self.write_gate();
        let current = self.snapshot.load_full();
        let address = filter.address();
        let mode = filter.comparison_mode();

        let Some(existing) = current.index.get(address, mode) else {
            return false;
        };
        if !existing.contains(filter) {
            return false;
        }

        let mut next = (*current).clone();
        if existing.len() == 1 {
            next.index.unregister(address, mode);
            tracing::debug!(address = %address, mode = ?mode, "Address bucket removed");
        } else {
            let mut set = (**existing).clone();
            set.remove_candidate(filter);
            next.index.insert(address, mode, Arc::new(set));
        }
        next.filters -= 1;
        let buckets = next.index.len();
        self.snapshot.store(Arc::new(next));

        tracing::debug!(address = %address, "Address filter removed");
        metrics::record_candidate_sets(buckets);
        true
    }

    /// Candidate set serving `to` under the table's lookup policy.
    pub fn candidate_set(&self, to: &EndpointAddress) -> Option<Arc<CandidateSet<P>>> {
        let snapshot = self.snapshot.load();
        self.lookup
            .modes()
            .iter()
            .find_map(|mode| snapshot.index.lookup(to, *mode))
            .cloned()
    }

    /// Payloads of every candidate matching the request, in registration order.
    pub fn match_request(&self, request: &RequestDescriptor) -> Vec<P> {
        let Some(set) = self.candidate_set(&request.to) else {
            tracing::trace!(to = %request.to, "No candidate set for address");
            metrics::record_dispatch("address", 0);
            return Vec::new();
        };
        let matched: Vec<P> = set
            .matching(&request.headers)
            .map(|c| c.payload().clone())
            .collect();
        tracing::trace!(to = %request.to, candidates = set.len(), matched = matched.len(), "Address dispatch");
        metrics::record_dispatch("address", matched.len());
        matched
    }

    /// The single matching payload, `None` when nothing matches, or
    /// `MultipleMatches` when the request is ambiguous.
    pub fn match_single(&self, request: &RequestDescriptor) -> DispatchResult<Option<P>> {
        let mut matched = self.match_request(request);
        match matched.len() {
            0 => Ok(None),
            1 => Ok(matched.pop()),
            count => Err(DispatchError::MultipleMatches { count }),
        }
    }

    /// Drop every registration.
    pub fn clear(&self) {
        let _gate = self.write_gate();
        self.snapshot.store(Arc::new(Snapshot::default()));
        metrics::record_candidate_sets(0);
    }

    /// Number of registered filters.
    pub fn len(&self) -> usize {
        self.snapshot.load().filters
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of address buckets currently registered.
    pub fn candidate_set_count(&self) -> usize {
        self.snapshot.load().index.len()
    }

    pub fn lookup_policy(&self) -> HostLookup {
        self.lookup
    }
}
