//! Sorted Index
//!
//! Keeps the distinct indexed values in a `BTreeMap`, so lookups and range
//! scans are logarithmic. Ties under one value keep insertion order through
//! a per-index sequence number; adding or removing one id is O(log n) no
//! matter how many rows share the value.
//!
//! ```text
//! values: 1 ─ 3 ─ 5 ─ 7 ─ 9        (BTreeMap, ascending)
//!             ▲       ▲
//!           start    end            range_query(3, 7, true, true)
//! ties:   5 → {seq 4: r1, seq 9: r7}
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

use crate::types::{RowId, Value};

/// Ids sharing one value, in insertion order
#[derive(Debug, Clone, Default)]
struct Ties {
    by_seq: BTreeMap<u64, RowId>,
    seq_of: HashMap<RowId, u64>,
}

impl Ties {
    fn ids(&self) -> impl Iterator<Item = &RowId> {
        self.by_seq.values()
    }

    fn is_empty(&self) -> bool {
        self.by_seq.is_empty()
    }
}

/// Ordered index supporting range queries
#[derive(Debug, Clone, Default)]
pub struct SortedIndex {
    values: BTreeMap<Value, Ties>,
    next_seq: u64,
    pairs: usize,
}

impl SortedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` under `value`. Null values are never indexed.
    pub fn insert(&mut self, value: &Value, id: &RowId) {
        if value.is_null() {
            return;
        }
        if !self.values.contains_key(value) {
            self.values.insert(value.clone(), Ties::default());
        }
        let Some(ties) = self.values.get_mut(value) else {
            return;
        };
        if ties.seq_of.contains_key(id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        ties.seq_of.insert(id.clone(), seq);
        ties.by_seq.insert(seq, id.clone());
        self.pairs += 1;
    }

    /// Remove `id` from `value`, dropping the value once no ids remain
    pub fn remove(&mut self, value: &Value, id: &RowId) {
        let Some(ties) = self.values.get_mut(value) else {
            return;
        };
        if let Some(seq) = ties.seq_of.remove(id) {
            ties.by_seq.remove(&seq);
            self.pairs -= 1;
        }
        if ties.is_empty() {
            self.values.remove(value);
        }
    }

    pub fn lookup(&self, value: &Value) -> BTreeSet<RowId> {
        self.values
            .get(value)
            .map(|ties| ties.ids().cloned().collect())
            .unwrap_or_default()
    }

    /// Union of ids whose value lies within the bounds.
    ///
    /// `None` leaves that side open. `min == max` with either side
    /// exclusive is empty.
    pub fn range_query(
        &self,
        min: Option<&Value>,
        max: Option<&Value>,
        include_min: bool,
        include_max: bool,
    ) -> BTreeSet<RowId> {
        let Some(range) = range_bounds(min, max, include_min, include_max) else {
            return BTreeSet::new();
        };
        self.values
            .range(range)
            .flat_map(|(_, ties)| ties.ids())
            .cloned()
            .collect()
    }

    /// Ids ordered by value (ascending, or descending when `reverse`).
    /// Ties stay in insertion order in both directions.
    pub fn sorted_ids(&self, reverse: bool) -> Vec<RowId> {
        let mut out = Vec::with_capacity(self.pairs);
        if reverse {
            for ties in self.values.values().rev() {
                out.extend(ties.ids().cloned());
            }
        } else {
            for ties in self.values.values() {
                out.extend(ties.ids().cloned());
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.values.clear();
        self.next_seq = 0;
        self.pairs = 0;
    }

    /// Number of (value, id) pairs
    pub fn len(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    pub fn distinct_values(&self) -> usize {
        self.values.len()
    }

    /// Smallest and largest indexed value
    pub fn bounds(&self) -> Option<(&Value, &Value)> {
        let (first, _) = self.values.first_key_value()?;
        let (last, _) = self.values.last_key_value()?;
        Some((first, last))
    }

    /// Entries in value order, ids in insertion order. Used for persistence.
    pub fn entries(&self) -> Vec<(&Value, Vec<&RowId>)> {
        self.values
            .iter()
            .map(|(value, ties)| (value, ties.ids().collect()))
            .collect()
    }
}

/// `BTreeMap::range` bounds, or `None` when the range is empty
fn range_bounds(
    min: Option<&Value>,
    max: Option<&Value>,
    include_min: bool,
    include_max: bool,
) -> Option<(Bound<Value>, Bound<Value>)> {
    if let (Some(lo), Some(hi)) = (min, max) {
        if lo > hi || (lo == hi && !(include_min && include_max)) {
            return None;
        }
    }
    let bound = |value: Option<&Value>, inclusive: bool| match value {
        None => Bound::Unbounded,
        Some(v) if inclusive => Bound::Included(v.clone()),
        Some(v) => Bound::Excluded(v.clone()),
    };
    Some((bound(min, include_min), bound(max, include_max)))
}
