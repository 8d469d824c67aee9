//! Column definitions

use crate::error::{Result, TuckError};
use crate::index::IndexKind;
use crate::types::ColumnType;

/// Flag bits stored per column in the schema region
pub(crate) const FLAG_NULLABLE: u8 = 0x01;
pub(crate) const FLAG_PRIMARY_KEY: u8 = 0x02;
pub(crate) const FLAG_HASH_INDEX: u8 = 0x04;
pub(crate) const FLAG_SORTED_INDEX: u8 = 0x08;

/// A named, typed column
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub index: IndexKind,
    pub comment: Option<String>,
}

impl Column {
    /// A nullable, unindexed column
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
            primary_key: false,
            index: IndexKind::None,
            comment: None,
        }
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    /// Mark as the primary key (implies not nullable)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn index(mut self, kind: IndexKind) -> Self {
        self.index = kind;
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub(crate) fn flags(&self) -> u8 {
        let mut flags = 0;
        if self.nullable {
            flags |= FLAG_NULLABLE;
        }
        if self.primary_key {
            flags |= FLAG_PRIMARY_KEY;
        }
        match self.index {
            IndexKind::None => {}
            IndexKind::Hash => flags |= FLAG_HASH_INDEX,
            IndexKind::Sorted => flags |= FLAG_SORTED_INDEX,
        }
        flags
    }

    pub(crate) fn from_parts(
        name: String,
        column_type: ColumnType,
        flags: u8,
        comment: Option<String>,
    ) -> Result<Self> {
        let index = match (flags & FLAG_HASH_INDEX != 0, flags & FLAG_SORTED_INDEX != 0) {
            (false, false) => IndexKind::None,
            (true, false) => IndexKind::Hash,
            (false, true) => IndexKind::Sorted,
            (true, true) => {
                return Err(TuckError::decode(format!(
                    "Column '{}' claims both hash and sorted index",
                    name
                )))
            }
        };
        Ok(Self {
            name,
            column_type,
            nullable: flags & FLAG_NULLABLE != 0,
            primary_key: flags & FLAG_PRIMARY_KEY != 0,
            index,
            comment,
        })
    }
}
