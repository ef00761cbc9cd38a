//! Header-presence matching.
//!
//! # Responsibilities
//! - Assign every required header name of a candidate set one bit
//! - Reference-count names so bits are only released when unused
//! - Build required masks and request presence masks
//! - Combine header conditions with AND semantics (subset test)
//!
//! # Design Decisions
//! - Masks grow in 64-bit words; there is no fixed header limit
//! - Rebuild assigns bits from zero in first-occurrence order, so the same
//!   candidate list always yields the same layout
//! - Header names unknown to the allocator are ignored on the request side

use std::collections::{HashMap, HashSet};

use crate::routing::qname::QualifiedName;

const WORD_BITS: usize = 64;

/// Bit set over header positions.
///
/// Only words up to the highest set bit are stored, so equal bit sets
/// compare equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct HeaderMask {
    words: Vec<u64>,
}

impl HeaderMask {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mask with exactly the given bits set.
    pub fn from_bits(bits: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::new();
        for bit in bits {
            mask.set(bit);
        }
        mask
    }

    pub fn set(&mut self, bit: usize) {
        let word = bit / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (bit % WORD_BITS);
    }

    pub fn contains(&self, bit: usize) -> bool {
        self.words
            .get(bit / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (bit % WORD_BITS)) != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// True when every bit of `self` is also set in `other`.
    #[inline]
    pub fn is_subset_of(&self, other: &HeaderMask) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Positions of the set bits, ascending.
    pub fn bits(&self) -> Vec<usize> {
        let mut bits = Vec::new();
        for (i, word) in self.words.iter().enumerate() {
            for b in 0..WORD_BITS {
                if word & (1u64 << b) != 0 {
                    bits.push(i * WORD_BITS + b);
                }
            }
        }
        bits
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Slot {
    bit: usize,
    refs: usize,
}

/// Header name → bit position mapping shared by one candidate set.
#[derive(Debug, Clone, Default)]
pub struct MaskAllocator {
    slots: HashMap<QualifiedName, Slot>,
}

impl MaskAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one more candidate requiring each of `names`. Names not seen
    /// before get the lowest free bit.
    pub fn retain(&mut self, names: &[QualifiedName]) {
        for name in names {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.refs += 1;
                continue;
            }
            let bit = self.lowest_free_bit();
            self.slots.insert(name.clone(), Slot { bit, refs: 1 });
        }
    }

    /// Count one candidate fewer requiring each of `names`. A name whose
    /// count drops to zero gives up its bit.
    pub fn release(&mut self, names: &[QualifiedName]) {
        for name in names {
            if let Some(slot) = self.slots.get_mut(name) {
                slot.refs = slot.refs.saturating_sub(1);
                if slot.refs == 0 {
                    self.slots.remove(name);
                }
            }
        }
    }

    /// Reassign bits from zero in first-occurrence order over `candidates`.
    pub fn rebuild<'a>(&mut self, candidates: impl IntoIterator<Item = &'a [QualifiedName]>) {
        let mut next = 0;
        let mut seen: HashSet<&QualifiedName> = HashSet::new();
        for names in candidates {
            for name in names {
                if !seen.insert(name) {
                    continue;
                }
                if let Some(slot) = self.slots.get_mut(name) {
                    slot.bit = next;
                    next += 1;
                }
            }
        }
        debug_assert_eq!(next, self.slots.len(), "reference counts out of sync with candidates");
    }

    /// Required mask for a candidate declaring `names`.
    pub fn mask_for(&self, names: &[QualifiedName]) -> HeaderMask {
        HeaderMask::from_bits(names.iter().filter_map(|n| self.bit_of(n)))
    }

    /// Presence mask of a request carrying `headers`.
    pub fn presence_mask(&self, headers: &HashSet<QualifiedName>) -> HeaderMask {
        HeaderMask::from_bits(headers.iter().filter_map(|h| self.bit_of(h)))
    }

    pub fn bit_of(&self, name: &QualifiedName) -> Option<usize> {
        self.slots.get(name).map(|s| s.bit)
    }

    /// Number of candidates currently requiring `name`.
    pub fn ref_count(&self, name: &QualifiedName) -> usize {
        self.slots.get(name).map_or(0, |s| s.refs)
    }

    /// Number of allocated bits.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn lowest_free_bit(&self) -> usize {
        let used: HashSet<usize> = self.slots.values().map(|s| s.bit).collect();
        (0..).find(|b| !used.contains(b)).unwrap_or(used.len())
    }
}
