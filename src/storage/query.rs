//! Query planning and execution over a single table.
//!
//! ## Plan
//! 1. Equality / `In` conditions on indexed columns intersect id sets
//! 2. Range conditions on sorted-indexed columns use `range_query`
//! 3. Remaining conditions filter the candidates (or a full scan)
//! 4. `order_by` on a sorted-indexed column walks the index; otherwise a
//!    stable sort. Nulls sort last ascending, first descending.
//! 5. `offset`, then `limit`

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{Result, TuckError};
use crate::index::Index;
use crate::table::Table;
use crate::types::{Record, RowId, Value};

/// A predicate on one column
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(String, Value),
    Ne(String, Value),
    Lt(String, Value),
    Le(String, Value),
    Gt(String, Value),
    Ge(String, Value),
    In(String, Vec<Value>),
}

impl Condition {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq(column.into(), value.into())
    }

    pub fn ne(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ne(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Lt(column.into(), value.into())
    }

    pub fn le(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Le(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Gt(column.into(), value.into())
    }

    pub fn ge(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Ge(column.into(), value.into())
    }

    pub fn is_in<V: Into<Value>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Condition::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    pub fn column(&self) -> &str {
        match self {
            Condition::Eq(c, _)
            | Condition::Ne(c, _)
            | Condition::Lt(c, _)
            | Condition::Le(c, _)
            | Condition::Gt(c, _)
            | Condition::Ge(c, _)
            | Condition::In(c, _) => c,
        }
    }

    /// Whether `value` (a row's value for this column) satisfies the
    /// condition. Ordering comparisons never match null.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Condition::Eq(_, v) => value == v,
            Condition::Ne(_, v) => value != v,
            Condition::In(_, vs) => vs.contains(value),
            _ if value.is_null() => false,
            Condition::Lt(_, v) => !v.is_null() && value < v,
            Condition::Le(_, v) => !v.is_null() && value <= v,
            Condition::Gt(_, v) => !v.is_null() && value > v,
            Condition::Ge(_, v) => !v.is_null() && value >= v,
        }
    }

    /// Coerce the operand(s) to the column's type
    fn coerced(&self, table: &Table) -> Result<Self> {
        let column = table.column(self.column()).ok_or_else(|| TuckError::ColumnNotFound {
            table: table.name().to_string(),
            column: self.column().to_string(),
        })?;
        let ty = column.column_type;
        let name = self.column().to_string();
        Ok(match self {
            Condition::Eq(_, v) => Condition::Eq(name, ty.coerce(v.clone())?),
            Condition::Ne(_, v) => Condition::Ne(name, ty.coerce(v.clone())?),
            Condition::Lt(_, v) => Condition::Lt(name, ty.coerce(v.clone())?),
            Condition::Le(_, v) => Condition::Le(name, ty.coerce(v.clone())?),
            Condition::Gt(_, v) => Condition::Gt(name, ty.coerce(v.clone())?),
            Condition::Ge(_, v) => Condition::Ge(name, ty.coerce(v.clone())?),
            Condition::In(_, vs) => Condition::In(
                name,
                vs.iter()
                    .map(|v| ty.coerce(v.clone()))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Ids answering this condition from `index`, when it can
    fn index_lookup(&self, index: &Index) -> Option<BTreeSet<RowId>> {
        match self {
            Condition::Eq(_, v) if !v.is_null() => Some(index.lookup(v)),
            Condition::In(_, vs) if vs.iter().all(|v| !v.is_null()) => {
                Some(vs.iter().flat_map(|v| index.lookup(v)).collect())
            }
            _ => {
                let sorted = index.as_sorted()?;
                match self {
                    Condition::Lt(_, v) if !v.is_null() => Some(sorted.range_query(None, Some(v), true, false)),
                    Condition::Le(_, v) if !v.is_null() => Some(sorted.range_query(None, Some(v), true, true)),
                    Condition::Gt(_, v) if !v.is_null() => Some(sorted.range_query(Some(v), None, false, true)),
                    Condition::Ge(_, v) if !v.is_null() => Some(sorted.range_query(Some(v), None, true, true)),
                    _ => None,
                }
            }
        }
    }
}

/// Filter, order and page the rows of a table
#[derive(Debug, Clone, Default)]
pub struct Query {
    conditions: Vec<Condition>,
    order_by: Option<String>,
    descending: bool,
    limit: Option<usize>,
    offset: usize,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition; all conditions must hold
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(column.into());
        self.descending = descending;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Run the query against `table`
    pub fn execute(&self, table: &Table) -> Result<Vec<(RowId, Record)>> {
        let conditions = self
            .conditions
            .iter()
            .map(|c| c.coerced(table))
            .collect::<Result<Vec<_>>>()?;
        if let Some(column) = &self.order_by {
            if table.column(column).is_none() {
                return Err(TuckError::ColumnNotFound {
                    table: table.name().to_string(),
                    column: column.clone(),
                });
            }
        }

        let mut candidates: Option<BTreeSet<RowId>> = None;
        let mut residual = Vec::new();
        for condition in conditions {
            let hit = table
                .index(condition.column())
                .and_then(|index| condition.index_lookup(index));
            match hit {
                Some(ids) => {
                    candidates = Some(match candidates {
                        Some(current) => current.intersection(&ids).cloned().collect(),
                        None => ids,
                    });
                }
                None => residual.push(condition),
            }
        }

        let rows: Vec<(RowId, Record)> = match candidates {
            Some(ids) => {
                let mut rows = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(record) = table.get(&id)? {
                        rows.push((id, record.into_owned()));
                    }
                }
                rows
            }
            None => table
                .scan()?
                .into_iter()
                .map(|(id, record)| (id, record.into_owned()))
                .collect(),
        };

        let matched: Vec<(RowId, Record)> = rows
            .into_iter()
            .filter(|(_, record)| {
                residual.iter().all(|c| {
                    let value = record.get(c.column()).unwrap_or(&Value::Null);
                    c.matches(value)
                })
            })
            .collect();

        let ordered = match &self.order_by {
            Some(column) => self.order(table, column, matched),
            None => matched,
        };

        let paged = ordered.into_iter().skip(self.offset);
        Ok(match self.limit {
            Some(limit) => paged.take(limit).collect(),
            None => paged.collect(),
        })
    }

    fn order(&self, table: &Table, column: &str, rows: Vec<(RowId, Record)>) -> Vec<(RowId, Record)> {
        if let Some(sorted) = table.index(column).and_then(Index::as_sorted) {
            // Nulls are not indexed, so whatever the walk leaves behind is null
            let mut pending: BTreeMap<RowId, Record> = rows.into_iter().collect();
            let mut walked = Vec::with_capacity(pending.len());
            for id in sorted.sorted_ids(self.descending) {
                if let Some(record) = pending.remove(&id) {
                    walked.push((id, record));
                }
            }
            let nulls = pending.into_iter();
            return if self.descending {
                nulls.chain(walked).collect()
            } else {
                walked.into_iter().chain(nulls).collect()
            };
        }

        let mut rows = rows;
        let null = Value::Null;
        rows.sort_by(|(_, a), (_, b)| {
            let a = a.get(column).unwrap_or(&null);
            let b = b.get(column).unwrap_or(&null);
            match (a.is_null(), b.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) if self.descending => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, true) if self.descending => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) if self.descending => b.cmp(a),
                (false, false) => a.cmp(b),
            }
        });
        rows
    }
}
