//! Upsert Tests
//!
//! Tests for create-or-update by entry id and by external id path.

mod common;

use common::*;
use serde_json::json;
use smartstore::{DbError, Order, QuerySpec};

fn count_all(store: &smartstore::SmartStore) -> usize {
    store
        .count_query(&QuerySpec::all(EMPLOYEES, None, Order::Ascending, 10))
        .unwrap()
}

// ============================================================================
// Entry Id Mode Tests
// ============================================================================

#[test]
fn test_upsert_without_entry_id_creates() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let doc = store
        .upsert(EMPLOYEES, &json!({"firstName": "Frank"}), None)
        .unwrap();
    assert_eq!(entry_id(&doc), 6);
    assert_eq!(count_all(&store), 6);
}

#[test]
fn test_upsert_with_entry_id_updates() {
    let (store, _tmp) = create_test_store();
    let created = seed_employees(&store);

    let mut alice = created[0].clone();
    alice["age"] = json!(35);
    let doc = store.upsert(EMPLOYEES, &alice, Some("_soupEntryId")).unwrap();

    assert_eq!(entry_id(&doc), 1);
    assert_eq!(store.retrieve(EMPLOYEES, &[1]).unwrap()[0]["age"], 35);
    assert_eq!(count_all(&store), 5);
}

#[test]
fn test_upsert_with_stale_entry_id_fails() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let err = store
        .upsert(EMPLOYEES, &json!({"_soupEntryId": 400, "firstName": "X"}), None)
        .unwrap_err();
    assert!(matches!(err, DbError::EntryNotFound(_, 400)));
}

// ============================================================================
// External Id Tests
// ============================================================================

#[test]
fn test_upsert_by_external_id_is_idempotent() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let first = store
        .upsert(
            EMPLOYEES,
            &json!({"employeeId": "E9", "firstName": "Ivy"}),
            Some("employeeId"),
        )
        .unwrap();
    let second = store
        .upsert(
            EMPLOYEES,
            &json!({"employeeId": "E9", "firstName": "Ivy", "age": 31}),
            Some("employeeId"),
        )
        .unwrap();

    assert_eq!(entry_id(&first), entry_id(&second));
    assert_eq!(second["_soupCreatedDate"], first["_soupCreatedDate"]);
    assert_eq!(count_all(&store), 6);
}

#[test]
fn test_upsert_by_external_id_updates_existing() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let doc = store
        .upsert(
            EMPLOYEES,
            &json!({"employeeId": "E3", "firstName": "Caroline"}),
            Some("employeeId"),
        )
        .unwrap();
    assert_eq!(entry_id(&doc), 3);
    assert_eq!(store.retrieve(EMPLOYEES, &[3]).unwrap()[0]["firstName"], "Caroline");
}

#[test]
fn test_upsert_external_id_coerced_to_column_type() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    // age is an integer index; the string "28" still finds Bob
    let doc = store
        .upsert(EMPLOYEES, &json!({"age": "28", "firstName": "Bobby"}), Some("age"))
        .unwrap();
    assert_eq!(entry_id(&doc), 2);
}

#[test]
fn test_upsert_external_id_errors() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let not_indexed = store
        .upsert(EMPLOYEES, &json!({"badge": "x"}), Some("badge"))
        .unwrap_err();
    assert!(matches!(not_indexed, DbError::FieldNotIndexed(_)));

    for doc in [
        json!({"firstName": "NoId"}),
        json!({"employeeId": null}),
        json!({"employeeId": ""}),
    ] {
        let err = store.upsert(EMPLOYEES, &doc, Some("employeeId")).unwrap_err();
        assert!(matches!(err, DbError::EmptyExternalId(_)));
    }
    assert_eq!(count_all(&store), 5);
}

#[test]
fn test_upsert_external_id_not_unique() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let err = store
        .upsert(EMPLOYEES, &json!({"deptCode": "eng"}), Some("deptCode"))
        .unwrap_err();
    assert!(matches!(err, DbError::ExternalIdNotUnique(_)));
    assert_eq!(count_all(&store), 5);
}
