//! Table Tests
//!
//! Tests verify:
//! - Schema validation at creation
//! - Auto-increment and explicit primary keys
//! - Validation (nullability, types, unknown columns)
//! - Partial updates and deletes
//! - Index consistency after every mutation
//! - Index management (build, change kind, drop)
//! - Values and records too large to store are rejected up front
//! - Adding and dropping columns

use std::collections::BTreeSet;

use tuckdb::{record, Column, ColumnType, IndexKind, Table, TuckError, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn users() -> Table {
    Table::new(
        "users",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("email", ColumnType::Str)
                .nullable(false)
                .index(IndexKind::Hash),
            Column::new("age", ColumnType::Int).index(IndexKind::Sorted),
            Column::new("balance", ColumnType::Float),
        ],
    )
    .unwrap()
}

/// Ids whose current value in `column` equals `value`, by scanning rows
fn scan_ids(table: &Table, column: &str, value: &Value) -> BTreeSet<Value> {
    table
        .scan()
        .unwrap()
        .into_iter()
        .filter(|(_, r)| r.get(column) == Some(value))
        .map(|(id, _)| id)
        .collect()
}

/// Every index agrees with a full scan for every value it holds
fn assert_indexes_consistent(table: &Table) {
    for (column, index) in table.indexes() {
        let mut total = 0;
        for (value, ids) in index.entries() {
            let expected = scan_ids(table, column, value);
            let actual: BTreeSet<Value> = ids.into_iter().cloned().collect();
            assert_eq!(actual, expected, "index {} value {}", column, value);
            total += expected.len();
        }
        let non_null = table
            .scan()
            .unwrap()
            .iter()
            .filter(|(_, r)| r.get(column).map_or(false, |v| !v.is_null()))
            .count();
        assert_eq!(total, non_null, "index {} size", column);
        assert_eq!(index.len(), non_null);
    }
}

// =============================================================================
// Schema Tests
// =============================================================================

#[test]
fn test_duplicate_column_rejected() {
    let err = Table::new(
        "t",
        vec![Column::new("a", ColumnType::Int), Column::new("a", ColumnType::Str)],
    )
    .unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
}

#[test]
fn test_two_primary_keys_rejected() {
    let err = Table::new(
        "t",
        vec![
            Column::new("a", ColumnType::Int).primary_key(),
            Column::new("b", ColumnType::Int).primary_key(),
        ],
    )
    .unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
}

#[test]
fn test_primary_key_is_not_nullable() {
    let table = users();
    assert_eq!(table.primary_key(), Some("id"));
    assert!(!table.column("id").unwrap().nullable);
}

// =============================================================================
// Insert Tests
// =============================================================================

#[test]
fn test_auto_increment_ids() {
    let mut table = users();
    let a = table.insert(record! { "email" => "a@x" }).unwrap();
    let b = table.insert(record! { "email" => "b@x" }).unwrap();

    assert_eq!(a, Value::Int(1));
    assert_eq!(b, Value::Int(2));
    assert_eq!(table.next_id(), 3);
    assert_eq!(table.get(&a).unwrap().unwrap()["id"], Value::Int(1));
}

#[test]
fn test_explicit_id_advances_counter() {
    let mut table = users();
    table.insert(record! { "id" => 10, "email" => "a@x" }).unwrap();
    let next = table.insert(record! { "email" => "b@x" }).unwrap();

    assert_eq!(next, Value::Int(11));
}

#[test]
fn test_duplicate_key_rejected() {
    let mut table = users();
    table.insert(record! { "id" => 1, "email" => "a@x" }).unwrap();

    let err = table.insert(record! { "id" => 1, "email" => "b@x" }).unwrap_err();
    assert!(matches!(err, TuckError::DuplicateKey { .. }));
    assert_eq!(table.len(), 1);
    assert_indexes_consistent(&table);
}

#[test]
fn test_missing_columns_filled_with_null() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x" }).unwrap();

    let row = table.get(&id).unwrap().unwrap();
    assert_eq!(row.len(), 4);
    assert!(row["age"].is_null());
}

#[test]
fn test_null_into_non_nullable_rejected() {
    let mut table = users();
    let err = table.insert(record! { "age" => 3 }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert!(table.is_empty());
}

#[test]
fn test_type_mismatch_rejected_and_int_widened() {
    let mut table = users();
    let err = table.insert(record! { "email" => "a@x", "age" => "old" }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));

    let id = table.insert(record! { "email" => "a@x", "balance" => 5 }).unwrap();
    assert_eq!(table.get(&id).unwrap().unwrap()["balance"], Value::Float(5.0));
}

#[test]
fn test_unknown_column_rejected() {
    let mut table = users();
    let err = table.insert(record! { "email" => "a@x", "nope" => 1 }).unwrap_err();
    assert!(matches!(err, TuckError::ColumnNotFound { .. }));
}

#[test]
fn test_string_primary_key_required() {
    let mut table = Table::new(
        "tags",
        vec![Column::new("tag", ColumnType::Str).primary_key()],
    )
    .unwrap();
    let err = table.insert(record! {}).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));

    let id = table.insert(record! { "tag" => "rust" }).unwrap();
    assert_eq!(id, Value::from("rust"));
}

#[test]
fn test_table_without_primary_key_uses_synthetic_ids() {
    let mut table = Table::new("log", vec![Column::new("line", ColumnType::Str)]).unwrap();
    let a = table.insert(record! { "line" => "one" }).unwrap();
    let b = table.insert(record! { "line" => "one" }).unwrap();

    assert_eq!(a, Value::Int(1));
    assert_eq!(b, Value::Int(2));
    assert_eq!(table.len(), 2);
}

// =============================================================================
// Update / Delete Tests
// =============================================================================

#[test]
fn test_partial_update() {
    let mut table = users();
    let id = table
        .insert(record! { "email" => "a@x", "age" => 30, "balance" => 1.0 })
        .unwrap();

    table.update(&id, record! { "age" => 31 }).unwrap();

    let row = table.get(&id).unwrap().unwrap();
    assert_eq!(row["age"], Value::Int(31));
    assert_eq!(row["email"], Value::from("a@x"));
    assert_eq!(row["balance"], Value::Float(1.0));
    assert_indexes_consistent(&table);
}

#[test]
fn test_update_missing_row() {
    let mut table = users();
    let err = table.update(&Value::Int(9), record! { "age" => 1 }).unwrap_err();
    assert!(matches!(err, TuckError::RecordNotFound { .. }));
}

#[test]
fn test_update_cannot_change_primary_key() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x" }).unwrap();

    let err = table.update(&id, record! { "id" => 99 }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert!(table.contains(&id));
}

#[test]
fn test_update_validation_leaves_row_untouched() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x", "age" => 5 }).unwrap();

    let err = table
        .update(&id, record! { "age" => 6, "email" => Value::Null })
        .unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert_eq!(table.get(&id).unwrap().unwrap()["age"], Value::Int(5));
    assert_indexes_consistent(&table);
}

#[test]
fn test_update_returns_coerced_changes() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x" }).unwrap();

    let applied = table.update(&id, record! { "balance" => 3 }).unwrap();
    assert_eq!(applied, record! { "balance" => 3.0 });

    let err = table.update(&id, record! { "nickname" => "a" }).unwrap_err();
    assert!(matches!(err, TuckError::ColumnNotFound { .. }));
}

#[test]
fn test_delete_returns_row_and_cleans_indexes() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x", "age" => 5 }).unwrap();

    let removed = table.delete(&id).unwrap();

    assert_eq!(removed["email"], Value::from("a@x"));
    assert!(table.is_empty());
    assert!(table.index("email").unwrap().is_empty());
    assert!(matches!(table.delete(&id), Err(TuckError::RecordNotFound { .. })));
}

#[test]
fn test_indexes_track_mixed_mutations() {
    let mut table = users();
    let mut ids = Vec::new();
    for i in 0..30 {
        let age = if i % 7 == 0 { Value::Null } else { Value::Int(i % 5) };
        ids.push(
            table
                .insert(record! { "email" => format!("u{}@x", i % 4), "age" => age })
                .unwrap(),
        );
    }
    for id in ids.iter().step_by(3) {
        table.update(id, record! { "age" => 9, "email" => "moved@x" }).unwrap();
    }
    for id in ids.iter().skip(1).step_by(4) {
        table.delete(id).unwrap();
    }
    for id in ids.iter().skip(2).step_by(5) {
        if table.contains(id) {
            table.update(id, record! { "age" => Value::Null }).unwrap();
        }
    }

    assert_indexes_consistent(&table);
}

// =============================================================================
// Index Management Tests
// =============================================================================

#[test]
fn test_build_index_backfills() {
    let mut table = users();
    for b in [1.0, 2.0, 1.0] {
        table.insert(record! { "email" => "a@x", "balance" => b }).unwrap();
    }

    table.build_index("balance").unwrap();

    assert_eq!(table.column("balance").unwrap().index, IndexKind::Hash);
    assert_eq!(table.index("balance").unwrap().lookup(&Value::Float(1.0)).len(), 2);
    assert_indexes_consistent(&table);
}

#[test]
fn test_change_index_kind_and_drop() {
    let mut table = users();
    for age in [3, 1, 2] {
        table.insert(record! { "email" => "a@x", "age" => age }).unwrap();
    }

    table.set_index_kind("email", IndexKind::Sorted).unwrap();
    assert_eq!(table.index("email").unwrap().kind(), IndexKind::Sorted);
    assert_eq!(table.index("email").unwrap().len(), 3);

    table.drop_index("age").unwrap();
    assert!(table.index("age").is_none());
    assert_eq!(table.column("age").unwrap().index, IndexKind::None);

    assert!(matches!(
        table.build_index("missing"),
        Err(TuckError::ColumnNotFound { .. })
    ));
}

// =============================================================================
// Size Limit Tests
// =============================================================================

#[test]
fn test_string_over_u16_length_rejected() {
    let mut table = users();
    let long = "x".repeat(65_536);

    let err = table.insert(record! { "email" => long.as_str() }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert!(table.is_empty());
    assert_eq!(table.next_id(), 1);
    assert!(table.index("email").unwrap().is_empty());

    let id = table.insert(record! { "email" => "x".repeat(65_535) }).unwrap();
    let err = table.update(&id, record! { "email" => long.as_str() }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert_indexes_consistent(&table);
}

#[test]
fn test_record_over_size_limit_rejected() {
    let mut table = Table::new(
        "blobs",
        vec![
            Column::new("id", ColumnType::Int).primary_key(),
            Column::new("a", ColumnType::Bytes),
            Column::new("b", ColumnType::Bytes),
        ],
    )
    .unwrap();
    let half = vec![0u8; 30 * 1024 * 1024];

    let id = table.insert(record! { "a" => half.clone() }).unwrap();
    // Each value fits on its own, the row does not
    let err = table.update(&id, record! { "b" => half.clone() }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert!(table.get(&id).unwrap().unwrap()["b"].is_null());

    let err = table.insert(record! { "a" => half.clone(), "b" => half }).unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert_eq!(table.len(), 1);
}

// =============================================================================
// Column Change Tests
// =============================================================================

#[test]
fn test_add_column_backfills_default_and_index() {
    let mut table = users();
    for email in ["a@x", "b@x"] {
        table.insert(record! { "email" => email }).unwrap();
    }

    table
        .add_column(
            Column::new("tier", ColumnType::Int).index(IndexKind::Sorted),
            Some(Value::Int(1)),
        )
        .unwrap();

    assert_eq!(table.columns().last().unwrap().name, "tier");
    assert_eq!(table.index("tier").unwrap().lookup(&Value::Int(1)).len(), 2);
    assert_indexes_consistent(&table);

    let id = table.insert(record! { "email" => "c@x" }).unwrap();
    assert!(table.get(&id).unwrap().unwrap()["tier"].is_null());
}

#[test]
fn test_add_non_nullable_column_needs_default_once_rows_exist() {
    let mut empty = users();
    empty
        .add_column(Column::new("code", ColumnType::Str).nullable(false), None)
        .unwrap();

    let mut table = users();
    table.insert(record! { "email" => "a@x" }).unwrap();
    let err = table
        .add_column(Column::new("code", ColumnType::Str).nullable(false), None)
        .unwrap_err();
    assert!(matches!(err, TuckError::Validation(_)));
    assert!(table.column("code").is_none());
}

#[test]
fn test_drop_column_removes_values_and_index() {
    let mut table = users();
    let id = table.insert(record! { "email" => "a@x", "age" => 4 }).unwrap();

    table.drop_column("age").unwrap();

    assert!(table.column("age").is_none());
    assert!(table.index("age").is_none());
    assert!(!table.get(&id).unwrap().unwrap().contains_key("age"));
    assert!(matches!(
        table.drop_column("id"),
        Err(TuckError::Validation(_))
    ));
    assert_indexes_consistent(&table);
}
