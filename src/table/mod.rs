//! Table Module
//!
//! A table owns its rows and every secondary index over them.
//!
//! ## Responsibilities
//! - Validate and coerce records against the column list, rejecting values
//!   and rows too large to write
//! - Assign auto-increment ids for integer primary keys
//! - Keep every index equal to the row store after each call
//! - Serve rows that are still on disk (lazy loading)
//!
//! ## Row Storage
//! ```text
//! ┌───────────────────────┐     ┌──────────────────────────────┐
//! │ rows: RowId → Record  │     │ lazy: RowId → file offset    │
//! │ (in memory)           │     │ (materialized on first write)│
//! └───────────┬───────────┘     └──────────────┬───────────────┘
//!             └──────────────┬─────────────────┘
//!                            ▼
//!          indexes: column → Hash | Sorted (always complete)
//! ```

mod column;
mod lazy;

pub use column::Column;
pub(crate) use lazy::LazyRows;

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};

use crate::error::{Result, TuckError};
use crate::format::data;
use crate::index::{Index, IndexKind};
use crate::types::{codec, ColumnType, Record, RowId, Value};

/// Tables of one store, keyed (and persisted) by name
pub type Tables = BTreeMap<String, Table>;

/// A typed table with optional primary key and secondary indexes
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    primary_key: Option<String>,
    comment: Option<String>,
    columns: Vec<Column>,
    rows: BTreeMap<RowId, Record>,
    indexes: BTreeMap<String, Index>,
    next_id: i64,
    lazy: Option<LazyRows>,
}

impl Table {
    /// Create an empty table.
    ///
    /// Fails when two columns share a name or more than one column is
    /// marked as primary key.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Result<Self> {
        let name = name.into();
        let mut seen = HashSet::new();
        let mut primary_key = None;

        for column in &columns {
            if column.name.is_empty() {
                return Err(TuckError::validation(format!(
                    "Table '{}' has a column with an empty name",
                    name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(TuckError::validation(format!(
                    "Duplicate column '{}' in table '{}'",
                    column.name, name
                )));
            }
            if column.primary_key {
                if primary_key.is_some() {
                    return Err(TuckError::validation(format!(
                        "Table '{}' declares more than one primary key",
                        name
                    )));
                }
                primary_key = Some(column.name.clone());
            }
        }

        let indexes = columns
            .iter()
            .filter_map(|c| Index::new(c.index).map(|index| (c.name.clone(), index)))
            .collect();

        Ok(Self {
            name,
            primary_key,
            comment: None,
            columns,
            rows: BTreeMap::new(),
            indexes,
            next_id: 1,
            lazy: None,
        })
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Next auto-increment value
    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    /// Type used to encode row ids: the primary key's type, or Int
    pub fn id_type(&self) -> ColumnType {
        self.primary_key
            .as_deref()
            .and_then(|pk| self.column(pk))
            .map(|c| c.column_type)
            .unwrap_or(ColumnType::Int)
    }

    pub fn index(&self, column: &str) -> Option<&Index> {
        self.indexes.get(column)
    }

    pub fn indexes(&self) -> &BTreeMap<String, Index> {
        &self.indexes
    }

    /// Number of live rows (in memory and on disk)
    pub fn len(&self) -> usize {
        self.rows.len() + self.lazy.as_ref().map_or(0, LazyRows::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.rows.contains_key(id) || self.lazy.as_ref().is_some_and(|l| l.contains(id))
    }

    /// Whether some rows are still only on disk
    pub fn is_lazy(&self) -> bool {
        self.lazy.as_ref().is_some_and(|l| !l.is_empty())
    }

    /// All row ids in ascending order
    pub fn ids(&self) -> Vec<RowId> {
        let mut ids: Vec<RowId> = self.rows.keys().cloned().collect();
        if let Some(lazy) = &self.lazy {
            ids.extend(lazy.ids().cloned());
            ids.sort();
        }
        ids
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Fetch a row, reading it from disk if it has not been loaded yet
    pub fn get(&self, id: &RowId) -> Result<Option<Cow<'_, Record>>> {
        if let Some(record) = self.rows.get(id) {
            return Ok(Some(Cow::Borrowed(record)));
        }
        match &self.lazy {
            Some(lazy) => Ok(lazy
                .read(id, &self.columns, self.id_type())?
                .map(Cow::Owned)),
            None => Ok(None),
        }
    }

    /// Every row in id order
    pub fn scan(&self) -> Result<Vec<(RowId, Cow<'_, Record>)>> {
        if self.lazy.is_none() {
            return Ok(self
                .rows
                .iter()
                .map(|(id, record)| (id.clone(), Cow::Borrowed(record)))
                .collect());
        }
        let mut out = Vec::with_capacity(self.len());
        for id in self.ids() {
            if let Some(record) = self.get(&id)? {
                out.push((id, record));
            }
        }
        Ok(out)
    }

    /// Value of `column` in row `id` (null when the row is missing)
    pub(crate) fn value_of(&self, id: &RowId, column: &str) -> Result<Value> {
        Ok(self
            .get(id)?
            .and_then(|record| record.get(column).cloned())
            .unwrap_or(Value::Null))
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Insert a record and return its row id.
    ///
    /// A missing integer primary key is assigned from `next_id`.
    pub fn insert(&mut self, mut record: Record) -> Result<RowId> {
        let id = match self.primary_key.clone() {
            Some(pk) => {
                let provided = record.get(&pk).cloned().unwrap_or(Value::Null);
                if provided.is_null() {
                    if self.id_type() != ColumnType::Int {
                        return Err(TuckError::validation(format!(
                            "Primary key '{}' of table '{}' is required",
                            pk, self.name
                        )));
                    }
                    let id = Value::Int(self.next_id);
                    record.insert(pk, id.clone());
                    id
                } else {
                    self.id_type().coerce(provided)?
                }
            }
            None => Value::Int(self.next_id),
        };

        self.insert_with_id(id.clone(), record)?;
        Ok(id)
    }

    /// Insert under an explicit id (WAL replay, synthetic-id tables)
    pub(crate) fn insert_with_id(&mut self, id: RowId, record: Record) -> Result<()> {
        if self.contains(&id) {
            return Err(TuckError::DuplicateKey {
                table: self.name.clone(),
                key: id.to_string(),
            });
        }

        let record = self.validate_full(record)?;
        data::record_len(&self.columns, self.id_type(), &id, &record)?;
        if let Value::Int(i) = id {
            self.next_id = self.next_id.max(i.saturating_add(1));
        }

        for (column, index) in self.indexes.iter_mut() {
            if let Some(value) = record.get(column) {
                index.insert(value, &id);
            }
        }
        self.rows.insert(id, record);
        Ok(())
    }

    /// Apply a partial update to row `id` and return the validated
    /// changes.
    ///
    /// Columns absent from `changes` keep their value and are not touched
    /// in any index. Nothing is modified when validation fails.
    pub fn update(&mut self, id: &RowId, changes: Record) -> Result<Record> {
        self.materialize(id)?;
        let Some(current) = self.rows.get(id) else {
            return Err(self.not_found(id));
        };

        let mut validated = Record::new();
        for (name, value) in changes {
            let column = self.require_column(&name)?;
            let value = Self::validate_value(&self.name, column, value)?;
            if column.primary_key && current.get(&name) != Some(&value) {
                return Err(TuckError::validation(format!(
                    "Primary key '{}' of table '{}' cannot be changed",
                    name, self.name
                )));
            }
            validated.insert(name, value);
        }

        let mut merged = current.clone();
        merged.extend(validated.iter().map(|(k, v)| (k.clone(), v.clone())));
        data::record_len(&self.columns, self.id_type(), id, &merged)?;

        let Some(row) = self.rows.get_mut(id) else {
            return Err(self.not_found(id));
        };
        for (name, value) in &validated {
            let old = row.insert(name.clone(), value.clone()).unwrap_or(Value::Null);
            if &old == value {
                continue;
            }
            if let Some(index) = self.indexes.get_mut(name) {
                index.remove(&old, id);
                index.insert(value, id);
            }
        }
        Ok(validated)
    }

    /// Remove row `id` and return it
    pub fn delete(&mut self, id: &RowId) -> Result<Record> {
        self.materialize(id)?;
        let Some(record) = self.rows.remove(id) else {
            return Err(self.not_found(id));
        };
        for (column, index) in self.indexes.iter_mut() {
            if let Some(value) = record.get(column) {
                index.remove(value, id);
            }
        }
        Ok(record)
    }

    /// Take back an insert, restoring the auto-increment counter
    pub(crate) fn revert_insert(&mut self, id: &RowId, next_id: i64) -> Result<()> {
        self.delete(id)?;
        self.next_id = next_id;
        Ok(())
    }

    /// Put `record` back under `id`, replacing whatever is there
    pub(crate) fn restore_row(&mut self, id: RowId, record: Record) -> Result<()> {
        self.materialize(&id)?;
        if let Some(old) = self.rows.remove(&id) {
            for (column, index) in self.indexes.iter_mut() {
                if let Some(value) = old.get(column) {
                    index.remove(value, &id);
                }
            }
        }
        for (column, index) in self.indexes.iter_mut() {
            if let Some(value) = record.get(column) {
                index.insert(value, &id);
            }
        }
        self.rows.insert(id, record);
        Ok(())
    }

    // =========================================================================
    // Schema Changes
    // =========================================================================

    /// Append a column, filling existing rows with `default` (or null).
    ///
    /// A non-nullable column needs a default once the table has rows.
    /// Primary keys cannot be added after creation.
    pub fn add_column(&mut self, column: Column, default: Option<Value>) -> Result<()> {
        if column.name.is_empty() {
            return Err(TuckError::validation(format!(
                "Table '{}' cannot add a column with an empty name",
                self.name
            )));
        }
        if self.column(&column.name).is_some() {
            return Err(TuckError::validation(format!(
                "Column '{}' already exists in table '{}'",
                column.name, self.name
            )));
        }
        if column.primary_key {
            return Err(TuckError::validation(format!(
                "Cannot add primary key column '{}' to existing table '{}'",
                column.name, self.name
            )));
        }

        let default = match default.filter(|v| !v.is_null()) {
            Some(value) => Self::validate_value(&self.name, &column, value)?,
            None if !column.nullable && !self.is_empty() => {
                return Err(TuckError::validation(format!(
                    "Non-nullable column '{}.{}' needs a default for existing rows",
                    self.name, column.name
                )));
            }
            None => Value::Null,
        };

        self.materialize_all()?;
        let mut columns = self.columns.clone();
        columns.push(column.clone());
        let id_type = self.id_type();
        for (id, record) in &self.rows {
            let mut filled = record.clone();
            filled.insert(column.name.clone(), default.clone());
            data::record_len(&columns, id_type, id, &filled)?;
        }

        for record in self.rows.values_mut() {
            record.insert(column.name.clone(), default.clone());
        }
        let name = column.name.clone();
        let kind = column.index;
        self.columns = columns;
        if kind != IndexKind::None {
            self.build_index(&name)?;
        }
        Ok(())
    }

    /// Remove a column with its values and index. The primary key cannot
    /// be dropped.
    pub fn drop_column(&mut self, name: &str) -> Result<()> {
        if self.require_column(name)?.primary_key {
            return Err(TuckError::validation(format!(
                "Cannot drop primary key column '{}.{}'",
                self.name, name
            )));
        }
        self.materialize_all()?;
        self.columns.retain(|c| c.name != name);
        self.indexes.remove(name);
        for record in self.rows.values_mut() {
            record.remove(name);
        }
        Ok(())
    }

    /// Set or clear the table comment
    pub fn set_comment(&mut self, comment: Option<String>) {
        self.comment = comment.filter(|c| !c.is_empty());
    }

    /// Set or clear the comment of `column`
    pub fn set_column_comment(&mut self, column: &str, comment: Option<String>) -> Result<()> {
        self.require_column(column)?;
        if let Some(c) = self.columns.iter_mut().find(|c| c.name == column) {
            c.comment = comment.filter(|c| !c.is_empty());
        }
        Ok(())
    }

    pub(crate) fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    // =========================================================================
    // Index Management
    // =========================================================================

    /// Rebuild the index on `column` from the current rows.
    ///
    /// Uses the column's declared kind, declaring a hash index when it has
    /// none.
    pub fn build_index(&mut self, column: &str) -> Result<()> {
        let kind = match self.require_column(column)?.index {
            IndexKind::None => IndexKind::Hash,
            kind => kind,
        };
        let Some(mut index) = Index::new(kind) else {
            return Ok(());
        };
        for (id, record) in self.scan()? {
            if let Some(value) = record.get(column) {
                index.insert(value, &id);
            }
        }

        if let Some(c) = self.columns.iter_mut().find(|c| c.name == column) {
            c.index = kind;
        }
        self.indexes.insert(column.to_string(), index);
        Ok(())
    }

    /// Change the index kind of `column`, rebuilding it as needed
    pub fn set_index_kind(&mut self, column: &str, kind: IndexKind) -> Result<()> {
        self.require_column(column)?;
        self.indexes.remove(column);
        if let Some(c) = self.columns.iter_mut().find(|c| c.name == column) {
            c.index = kind;
        }
        if kind == IndexKind::None {
            return Ok(());
        }
        self.build_index(column)
    }

    pub fn drop_index(&mut self, column: &str) -> Result<()> {
        self.set_index_kind(column, IndexKind::None)
    }

    // =========================================================================
    // Loading Support
    // =========================================================================

    pub(crate) fn from_parts(
        name: String,
        comment: Option<String>,
        columns: Vec<Column>,
        next_id: i64,
    ) -> Result<Self> {
        let mut table = Self::new(name, columns)?;
        table.comment = comment;
        table.next_id = next_id;
        Ok(table)
    }

    /// Place an already-decoded row without touching indexes
    pub(crate) fn put_loaded_row(&mut self, id: RowId, record: Record) {
        self.rows.insert(id, record);
    }

    /// Replace the index on `column` with one restored from disk
    pub(crate) fn put_loaded_index(&mut self, column: &str, index: Index) -> Result<()> {
        let declared = self.require_column(column)?.index;
        if declared != index.kind() {
            return Err(TuckError::format(format!(
                "Index on '{}.{}' is {:?} on disk but {:?} in the schema",
                self.name,
                column,
                index.kind(),
                declared
            )));
        }
        self.indexes.insert(column.to_string(), index);
        Ok(())
    }

    pub(crate) fn set_lazy(&mut self, lazy: LazyRows) {
        self.lazy = Some(lazy);
    }

    /// Pull every on-disk row into memory and drop the file handle
    pub fn materialize_all(&mut self) -> Result<()> {
        let Some(lazy) = self.lazy.take() else {
            return Ok(());
        };
        let id_type = self.id_type();
        for id in lazy.ids() {
            if let Some(record) = lazy.read(id, &self.columns, id_type)? {
                self.rows.insert(id.clone(), record);
            }
        }
        Ok(())
    }

    /// Pull one on-disk row into memory
    fn materialize(&mut self, id: &RowId) -> Result<()> {
        let id_type = self.id_type();
        let Some(lazy) = self.lazy.as_mut() else {
            return Ok(());
        };
        if let Some(record) = lazy.read(id, &self.columns, id_type)? {
            lazy.forget(id);
            self.rows.insert(id.clone(), record);
        }
        Ok(())
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate a full record: every column present (null when missing),
    /// no unknown columns
    fn validate_full(&self, mut record: Record) -> Result<Record> {
        let mut out = Record::new();
        for column in &self.columns {
            let value = record.remove(&column.name).unwrap_or(Value::Null);
            out.insert(
                column.name.clone(),
                Self::validate_value(&self.name, column, value)?,
            );
        }
        if let Some(unknown) = record.into_keys().next() {
            return Err(TuckError::ColumnNotFound {
                table: self.name.clone(),
                column: unknown,
            });
        }
        Ok(out)
    }

    fn validate_value(table: &str, column: &Column, value: Value) -> Result<Value> {
        if value.is_null() {
            if !column.nullable {
                return Err(TuckError::validation(format!(
                    "Column '{}.{}' is not nullable",
                    table, column.name
                )));
            }
            return Ok(Value::Null);
        }
        let in_column = |e: TuckError| match e {
            TuckError::Validation(msg) => {
                TuckError::validation(format!("Column '{}.{}': {}", table, column.name, msg))
            }
            other => other,
        };
        let value = column.column_type.coerce(value).map_err(in_column)?;
        codec::encoded_len(column.column_type, &value).map_err(in_column)?;
        Ok(value)
    }

    fn require_column(&self, name: &str) -> Result<&Column> {
        self.column(name).ok_or_else(|| TuckError::ColumnNotFound {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    fn not_found(&self, id: &RowId) -> TuckError {
        TuckError::RecordNotFound {
            table: self.name.clone(),
            key: id.to_string(),
        }
    }
}
