//! Hash Index
//!
//! Equality-only index: value → set of row ids.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::types::{RowId, Value};

/// Unordered equality index
#[derive(Debug, Clone, Default)]
pub struct HashIndex {
    map: HashMap<Value, HashSet<RowId>>,
    /// Total (value, id) pairs
    pairs: usize,
}

impl HashIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `id` under `value`. Null values are never indexed.
    pub fn insert(&mut self, value: &Value, id: &RowId) {
        if value.is_null() {
            return;
        }
        if self.map.entry(value.clone()).or_default().insert(id.clone()) {
            self.pairs += 1;
        }
    }

    /// Remove `id` from `value`, dropping the key once its set is empty
    pub fn remove(&mut self, value: &Value, id: &RowId) {
        let Some(ids) = self.map.get_mut(value) else {
            return;
        };
        if ids.remove(id) {
            self.pairs -= 1;
        }
        if ids.is_empty() {
            self.map.remove(value);
        }
    }

    pub fn lookup(&self, value: &Value) -> BTreeSet<RowId> {
        self.map
            .get(value)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.pairs = 0;
    }

    /// Number of (value, id) pairs
    pub fn len(&self) -> usize {
        self.pairs
    }

    pub fn is_empty(&self) -> bool {
        self.pairs == 0
    }

    /// Number of distinct indexed values
    pub fn distinct_values(&self) -> usize {
        self.map.len()
    }

    /// Entries ordered by value, ids ascending. Used for persistence.
    pub fn entries(&self) -> Vec<(&Value, Vec<&RowId>)> {
        let mut entries: Vec<(&Value, Vec<&RowId>)> = self
            .map
            .iter()
            .map(|(value, ids)| {
                let mut ids: Vec<&RowId> = ids.iter().collect();
                ids.sort();
                (value, ids)
            })
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}
