//! Candidate sets: every registration sharing one address bucket.
//!
//! # Responsibilities
//! - Own the candidates of a bucket in insertion order
//! - Keep each candidate's required mask consistent with the set's layout
//! - Select the candidates whose required headers are all present
//!
//! # Design Decisions
//! - A set is a value; the address table mutates a private copy and then
//!   publishes it, so readers only ever hold consistent sets
//! - Every add/remove rebuilds all masks in the set

use std::collections::HashSet;
use std::sync::Arc;

use crate::routing::filter::AddressFilter;
use crate::routing::matcher::{HeaderMask, MaskAllocator};
use crate::routing::qname::QualifiedName;

/// One registered (filter, payload) pair.
#[derive(Debug, Clone)]
pub struct Candidate<P> {
    filter: Arc<AddressFilter>,
    payload: P,
    mask: HeaderMask,
}

impl<P> Candidate<P> {
    pub fn filter(&self) -> &AddressFilter {
        &self.filter
    }

    pub fn payload(&self) -> &P {
        &self.payload
    }

    /// Bits of the headers this candidate requires.
    pub fn mask(&self) -> &HeaderMask {
        &self.mask
    }

    fn required_headers(&self) -> &[QualifiedName] {
        self.filter.required_headers()
    }
}

/// All candidates registered under one normalized address.
#[derive(Debug, Clone)]
pub struct CandidateSet<P> {
    candidates: Vec<Candidate<P>>,
    masks: MaskAllocator,
}

impl<P> Default for CandidateSet<P> {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            masks: MaskAllocator::new(),
        }
    }
}

impl<P> CandidateSet<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a candidate and rebuild every mask in the set.
    pub fn add_candidate(&mut self, filter: Arc<AddressFilter>, payload: P) {
        self.masks.retain(filter.required_headers());
        self.candidates.push(Candidate {
            filter,
            payload,
            mask: HeaderMask::new(),
        });
        self.rebuild_masks();
    }

    /// Remove the candidate registered with `filter`. Returns `false` if no
    /// such candidate exists.
    pub fn remove_candidate(&mut self, filter: &AddressFilter) -> bool {
        let Some(pos) = self.candidates.iter().position(|c| *c.filter == *filter) else {
            return false;
        };
        let removed = self.candidates.remove(pos);
        self.masks.release(removed.required_headers());
        self.rebuild_masks();
        true
    }

    fn rebuild_masks(&mut self) {
        self.masks
            .rebuild(self.candidates.iter().map(|c| c.filter.required_headers()));
        for candidate in &mut self.candidates {
            candidate.mask = self.masks.mask_for(candidate.filter.required_headers());
        }
    }

    /// Candidates whose required headers are all present, in insertion order.
    pub fn matching<'a>(
        &'a self,
        headers: &HashSet<QualifiedName>,
    ) -> impl Iterator<Item = &'a Candidate<P>> + 'a {
        let present = self.masks.presence_mask(headers);
        self.candidates
            .iter()
            .filter(move |c| c.mask.is_subset_of(&present))
    }

    pub fn contains(&self, filter: &AddressFilter) -> bool {
        self.candidates.iter().any(|c| *c.filter == *filter)
    }

    pub fn candidates(&self) -> &[Candidate<P>] {
        &self.candidates
    }

    /// Header name → bit layout shared by the candidates.
    pub fn allocator(&self) -> &MaskAllocator {
        &self.masks
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qn(s: &str) -> QualifiedName {
        s.parse().unwrap()
    }

    fn filter(headers: &[&str]) -> Arc<AddressFilter> {
        Arc::new(
            AddressFilter::parse("http://host/svc", true, headers.iter().map(|h| qn(h))).unwrap(),
        )
    }

    fn headers(names: &[&str]) -> HashSet<QualifiedName> {
        names.iter().map(|n| qn(n)).collect()
    }

    /// Every mask equals the OR of the bits currently assigned to its names.
    fn assert_masks_sound<P>(set: &CandidateSet<P>) {
        for c in set.candidates() {
            let expected = HeaderMask::from_bits(
                c.filter()
                    .required_headers()
                    .iter()
                    .map(|h| set.allocator().bit_of(h).unwrap()),
            );
            assert_eq!(c.mask(), &expected);
        }
    }

    #[test]
    fn test_matching_requires_all_headers() {
        let mut set = CandidateSet::new();
        set.add_candidate(filter(&["{ns}A"]), 1);
        set.add_candidate(filter(&["{ns}B"]), 2);
        set.add_candidate(filter(&["{ns}A", "{ns}B"]), 3);
        set.add_candidate(filter(&[]), 4);

        let hits: Vec<i32> = set.matching(&headers(&["{ns}A"])).map(|c| *c.payload()).collect();
        assert_eq!(hits, vec![1, 4]);

        let hits: Vec<i32> = set
            .matching(&headers(&["{ns}B", "{ns}A", "{x}Unrelated"]))
            .map(|c| *c.payload())
            .collect();
        assert_eq!(hits, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_masks_sound_after_add_and_remove() {
        let mut set = CandidateSet::new();
        set.add_candidate(filter(&["{ns}A", "{ns}B"]), 1);
        set.add_candidate(filter(&["{ns}C"]), 2);
        set.add_candidate(filter(&["{ns}B", "{ns}D"]), 3);
        assert_masks_sound(&set);

        assert!(set.remove_candidate(&filter(&["{ns}A", "{ns}B"])));
        assert_masks_sound(&set);
        assert_eq!(set.allocator().bit_of(&qn("{ns}A")), None);
        assert_eq!(set.allocator().ref_count(&qn("{ns}B")), 1);
        assert_eq!(set.allocator().len(), 3);
    }

    #[test]
    fn test_released_bit_is_reused() {
        let mut set = CandidateSet::new();
        set.add_candidate(filter(&["{ns}Foo"]), 1);
        set.add_candidate(filter(&[]), 2);
        let foo_bit = set.allocator().bit_of(&qn("{ns}Foo")).unwrap();

        assert!(set.remove_candidate(&filter(&["{ns}Foo"])));
        assert!(set.allocator().is_empty());

        set.add_candidate(filter(&["{ns}Bar"]), 3);
        assert_eq!(set.allocator().bit_of(&qn("{ns}Bar")), Some(foo_bit));
        assert_masks_sound(&set);
    }

    #[test]
    fn test_remove_unknown_returns_false() {
        let mut set: CandidateSet<i32> = CandidateSet::new();
        set.add_candidate(filter(&["{ns}A"]), 1);
        assert!(!set.remove_candidate(&filter(&["{ns}B"])));
        assert_eq!(set.len(), 1);
        assert!(set.contains(&filter(&["{ns}A"])));
    }
}
