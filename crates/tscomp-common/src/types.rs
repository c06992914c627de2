//! tscomp Core Types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Attribute number of a column within its relation. Values `<= 0` denote
/// system columns or whole-row references.
pub type AttrNumber = i16;

/// Range-table index of a relation taking part in planning
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelId(pub usize);

impl RelId {
    pub fn new(id: usize) -> Self {
        Self(id)
    }

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rel_{}", self.0)
    }
}

impl From<usize> for RelId {
    fn from(id: usize) -> Self {
        Self(id)
    }
}

// ============================================================================
// Relids - compact relation set for up to 64 relations
// ============================================================================

/// Set of relations, used for required-outer sets and class coverage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Relids(pub u64);

impl Relids {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn singleton(rel: RelId) -> Self {
        debug_assert!(rel.0 < 64);
        Self(1u64 << rel.0)
    }

    pub fn insert(&mut self, rel: RelId) {
        debug_assert!(rel.0 < 64);
        self.0 |= 1u64 << rel.0;
    }

    pub fn remove(&mut self, rel: RelId) {
        debug_assert!(rel.0 < 64);
        self.0 &= !(1u64 << rel.0);
    }

    pub fn contains(&self, rel: RelId) -> bool {
        rel.0 < 64 && (self.0 & (1u64 << rel.0)) != 0
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    pub fn difference(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    pub fn overlaps(self, other: Self) -> bool {
        !self.intersection(other).is_empty()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn is_subset_of(self, other: Self) -> bool {
        self.difference(other).is_empty()
    }

    /// Replace `from` by `to` if `from` is a member.
    pub fn replace(self, from: RelId, to: RelId) -> Self {
        if !self.contains(from) {
            return self;
        }
        let mut result = self;
        result.remove(from);
        result.insert(to);
        result
    }

    pub fn iter(self) -> RelidsIter {
        RelidsIter(self.0)
    }
}

impl FromIterator<RelId> for Relids {
    fn from_iter<I: IntoIterator<Item = RelId>>(iter: I) -> Self {
        let mut set = Relids::new();
        for rel in iter {
            set.insert(rel);
        }
        set
    }
}

pub struct RelidsIter(u64);

impl Iterator for RelidsIter {
    type Item = RelId;
    fn next(&mut self) -> Option<RelId> {
        if self.0 == 0 {
            None
        } else {
            let bit = self.0.trailing_zeros() as usize;
            self.0 &= self.0 - 1; // clear lowest set bit
            Some(RelId(bit))
        }
    }
}

impl fmt::Display for Relids {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        let mut first = true;
        for rel in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}", rel.0)?;
            first = false;
        }
        write!(f, "}}")
    }
}
