//! Schema evolution for existing tables.
//!
//! Every change runs against a copy of the table set and is followed by a
//! checkpoint, so a failed change leaves both memory and file as they
//! were. None of these are allowed inside a transaction.

use super::{get_table, Storage};
use crate::error::{Result, TuckError};
use crate::table::{Column, Table};
use crate::types::Value;

/// What [`Storage::sync_table_schema`] may change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    pub sync_table_comment: bool,
    pub sync_column_comments: bool,
    pub add_new_columns: bool,
    /// Off by default: dropping discards data
    pub drop_missing_columns: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            sync_table_comment: true,
            sync_column_comments: true,
            add_new_columns: true,
            drop_missing_columns: false,
        }
    }
}

/// Changes made by one [`Storage::sync_table_schema`] call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncResult {
    pub table: String,
    pub table_comment_updated: bool,
    pub columns_added: Vec<String>,
    pub columns_dropped: Vec<String>,
    pub column_comments_updated: Vec<String>,
}

impl SyncResult {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Self::default()
        }
    }

    pub fn has_changes(&self) -> bool {
        self.table_comment_updated
            || !self.columns_added.is_empty()
            || !self.columns_dropped.is_empty()
            || !self.column_comments_updated.is_empty()
    }
}

impl Storage {
    /// Add a column to an existing table; existing rows get `default`
    /// (or null)
    pub fn add_column(
        &mut self,
        table: &str,
        column: Column,
        default: Option<Value>,
    ) -> Result<()> {
        let name = column.name.clone();
        self.schema_change("add_column", |tables| {
            get_table(tables, table)?.add_column(column, default)
        })?;
        tracing::debug!("Added column '{}.{}'", table, name);
        Ok(())
    }

    /// Drop a column and its values. The primary key cannot be dropped.
    pub fn drop_column(&mut self, table: &str, column: &str) -> Result<()> {
        self.schema_change("drop_column", |tables| {
            get_table(tables, table)?.drop_column(column)
        })?;
        tracing::debug!("Dropped column '{}.{}'", table, column);
        Ok(())
    }

    pub fn rename_table(&mut self, from: &str, to: &str) -> Result<()> {
        self.schema_change("rename_table", |tables| {
            if to.is_empty() {
                return Err(TuckError::validation("Table name must not be empty"));
            }
            if tables.contains_key(to) {
                return Err(TuckError::validation(format!(
                    "Table '{}' already exists",
                    to
                )));
            }
            let mut t = tables
                .remove(from)
                .ok_or_else(|| TuckError::TableNotFound(from.to_string()))?;
            t.rename(to);
            tables.insert(to.to_string(), t);
            Ok(())
        })?;
        tracing::debug!("Renamed table '{}' to '{}'", from, to);
        Ok(())
    }

    /// Set or clear (`None`) a table comment
    pub fn update_table_comment(&mut self, table: &str, comment: Option<&str>) -> Result<()> {
        self.schema_change("update_table_comment", |tables| {
            get_table(tables, table)?.set_comment(comment.map(str::to_string));
            Ok(())
        })
    }

    /// Set or clear (`None`) a column comment
    pub fn update_column_comment(
        &mut self,
        table: &str,
        column: &str,
        comment: Option<&str>,
    ) -> Result<()> {
        self.schema_change("update_column_comment", |tables| {
            get_table(tables, table)?.set_column_comment(column, comment.map(str::to_string))
        })
    }

    /// Bring a table in line with a declared column list.
    ///
    /// Columns are matched by name; types of existing columns are never
    /// changed and the primary key is never dropped. Comments are only
    /// updated where the declaration carries one. All changes apply
    /// together or not at all.
    pub fn sync_table_schema(
        &mut self,
        table: &str,
        columns: &[Column],
        comment: Option<&str>,
        options: &SyncOptions,
    ) -> Result<SyncResult> {
        let result = self.schema_change("sync_table_schema", |tables| {
            let t = get_table(tables, table)?;
            sync_table(t, columns, comment, options)
        })?;
        if result.has_changes() {
            tracing::info!(
                "Synced schema of '{}': {} added, {} dropped, {} comments updated",
                table,
                result.columns_added.len(),
                result.columns_dropped.len(),
                result.column_comments_updated.len() + usize::from(result.table_comment_updated)
            );
        }
        Ok(result)
    }
}

fn sync_table(
    table: &mut Table,
    columns: &[Column],
    comment: Option<&str>,
    options: &SyncOptions,
) -> Result<SyncResult> {
    let mut result = SyncResult::new(table.name());

    if options.sync_table_comment {
        if let Some(comment) = comment.filter(|c| table.comment() != Some(*c)) {
            table.set_comment(Some(comment.to_string()));
            result.table_comment_updated = true;
        }
    }

    for declared in columns {
        let existing_comment = match table.column(&declared.name) {
            Some(existing) => existing.comment.clone(),
            None => {
                if options.add_new_columns {
                    table.add_column(declared.clone(), None)?;
                    result.columns_added.push(declared.name.clone());
                }
                continue;
            }
        };
        if options.sync_column_comments
            && declared.comment.is_some()
            && declared.comment != existing_comment
        {
            table.set_column_comment(&declared.name, declared.comment.clone())?;
            result.column_comments_updated.push(declared.name.clone());
        }
    }

    if options.drop_missing_columns {
        let missing: Vec<String> = table
            .columns()
            .iter()
            .filter(|c| !c.primary_key && !columns.iter().any(|d| d.name == c.name))
            .map(|c| c.name.clone())
            .collect();
        for name in missing {
            table.drop_column(&name)?;
            result.columns_dropped.push(name);
        }
    }
    Ok(result)
}
