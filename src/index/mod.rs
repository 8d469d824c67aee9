//! Index Module
//!
//! Secondary indexes over a single column.
//!
//! ## Responsibilities
//! - Map column values to the ids of the rows holding them
//! - Never index nulls
//! - Answer equality lookups (both kinds) and range scans (sorted only)
//!
//! A column's index must mirror the table's rows after every call that
//! mutates the table; `Table` owns that contract.

mod hash;
mod sorted;

pub use hash::HashIndex;
pub use sorted::SortedIndex;

use std::collections::BTreeSet;

use crate::error::{Result, TuckError};
use crate::types::{RowId, Value};

/// Declared index kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexKind {
    #[default]
    None,
    Hash,
    Sorted,
}

impl IndexKind {
    /// Kind byte used in the index region
    pub fn tag(self) -> u8 {
        match self {
            IndexKind::None => 0,
            IndexKind::Hash => 1,
            IndexKind::Sorted => 2,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(IndexKind::None),
            1 => Ok(IndexKind::Hash),
            2 => Ok(IndexKind::Sorted),
            other => Err(TuckError::decode(format!("Unknown index kind: {}", other))),
        }
    }
}

/// A live index of either kind
#[derive(Debug, Clone)]
pub enum Index {
    Hash(HashIndex),
    Sorted(SortedIndex),
}

impl Index {
    /// Empty index of `kind`; `None` for [`IndexKind::None`]
    pub fn new(kind: IndexKind) -> Option<Self> {
        match kind {
            IndexKind::None => None,
            IndexKind::Hash => Some(Index::Hash(HashIndex::new())),
            IndexKind::Sorted => Some(Index::Sorted(SortedIndex::new())),
        }
    }

    pub fn kind(&self) -> IndexKind {
        match self {
            Index::Hash(_) => IndexKind::Hash,
            Index::Sorted(_) => IndexKind::Sorted,
        }
    }

    pub fn insert(&mut self, value: &Value, id: &RowId) {
        match self {
            Index::Hash(index) => index.insert(value, id),
            Index::Sorted(index) => index.insert(value, id),
        }
    }

    pub fn remove(&mut self, value: &Value, id: &RowId) {
        match self {
            Index::Hash(index) => index.remove(value, id),
            Index::Sorted(index) => index.remove(value, id),
        }
    }

    pub fn lookup(&self, value: &Value) -> BTreeSet<RowId> {
        match self {
            Index::Hash(index) => index.lookup(value),
            Index::Sorted(index) => index.lookup(value),
        }
    }

    pub fn clear(&mut self) {
        match self {
            Index::Hash(index) => index.clear(),
            Index::Sorted(index) => index.clear(),
        }
    }

    /// Total (value, id) pairs
    pub fn len(&self) -> usize {
        match self {
            Index::Hash(index) => index.len(),
            Index::Sorted(index) => index.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The sorted index, if this is one
    pub fn as_sorted(&self) -> Option<&SortedIndex> {
        match self {
            Index::Sorted(index) => Some(index),
            Index::Hash(_) => None,
        }
    }

    /// Entries in value order; the form the index region persists
    pub fn entries(&self) -> Vec<(&Value, Vec<&RowId>)> {
        match self {
            Index::Hash(index) => index.entries(),
            Index::Sorted(index) => index.entries(),
        }
    }
}
