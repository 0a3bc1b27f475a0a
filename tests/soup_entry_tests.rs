//! Soup Entry Tests
//!
//! Tests for entry-level operations:
//! - Engine fields (_soupEntryId, _soupCreatedDate, _soupLastModifiedDate)
//! - Retrieve ordering and missing ids
//! - Update, delete and clear

mod common;

use common::*;
use serde_json::json;
use smartstore::{DbError, Order, QuerySpec};

// ============================================================================
// Create Tests
// ============================================================================

#[test]
fn test_create_sets_engine_fields() {
    let (store, _tmp) = create_test_store();
    let created = seed_employees(&store);

    let alice = &created[0];
    assert_eq!(entry_id(alice), 1);
    assert_eq!(alice["firstName"], "Alice");
    let created_at = alice["_soupCreatedDate"].as_i64().unwrap();
    assert!(created_at > 0);
    assert_eq!(alice["_soupLastModifiedDate"].as_i64().unwrap(), created_at);

    let ids: Vec<i64> = created.iter().map(entry_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_create_rejects_non_objects() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    for doc in [json!([1, 2]), json!("text"), json!(null), json!(3)] {
        let err = store.create(EMPLOYEES, &doc).unwrap_err();
        assert!(matches!(err, DbError::InvalidDocument(_)));
    }
}

#[test]
fn test_create_in_unknown_soup() {
    let (store, _tmp) = create_test_store();
    let err = store.create("ghost", &json!({"a": 1})).unwrap_err();
    assert!(matches!(err, DbError::SoupNotFound(_)));
}

#[test]
fn test_document_without_indexed_fields() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let doc = store.create(EMPLOYEES, &json!({"nickname": "Z"})).unwrap();
    let fetched = store.retrieve(EMPLOYEES, &[entry_id(&doc)]).unwrap();
    assert_eq!(fetched, vec![doc]);
}

// ============================================================================
// Retrieve Tests
// ============================================================================

#[test]
fn test_retrieve_in_request_order() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let rows = store.retrieve(EMPLOYEES, &[3, 1, 99, 2]).unwrap();
    assert_eq!(first_names(&rows), vec!["Carol", "Alice", "Bob"]);
}

#[test]
fn test_retrieve_round_trip() {
    let (store, _tmp) = create_test_store();
    let created = seed_employees(&store);

    let rows = store.retrieve(EMPLOYEES, &[entry_id(&created[4])]).unwrap();
    assert_eq!(rows[0], created[4]);
    assert_eq!(rows[0]["salary"], json!(80000.0));
}

// ============================================================================
// Update Tests
// ============================================================================

#[test]
fn test_update_keeps_created_date() {
    let (store, _tmp) = create_test_store();
    let created = seed_employees(&store);
    let bob = &created[1];

    let mut changed = bob.clone();
    changed["deptCode"] = json!("hr");
    let updated = store.update(EMPLOYEES, entry_id(bob), &changed).unwrap();

    assert_eq!(updated["_soupCreatedDate"], bob["_soupCreatedDate"]);
    assert!(
        updated["_soupLastModifiedDate"].as_i64().unwrap()
            > bob["_soupLastModifiedDate"].as_i64().unwrap()
    );

    // index columns follow the new body
    let hr = QuerySpec::exact(EMPLOYEES, "deptCode", "hr", Some("firstName"), Order::Ascending, 10);
    assert_eq!(first_names(&store.query(&hr, 0).unwrap()), vec!["Bob", "Eve"]);
}

#[test]
fn test_update_missing_entry() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let err = store
        .update(EMPLOYEES, 42, &json!({"firstName": "Nobody"}))
        .unwrap_err();
    assert!(matches!(err, DbError::EntryNotFound(_, 42)));
}

#[test]
fn test_update_uses_given_id_over_body() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    let updated = store
        .update(EMPLOYEES, 2, &json!({"firstName": "Robert", "_soupEntryId": 5}))
        .unwrap();
    assert_eq!(entry_id(&updated), 2);
    assert_eq!(store.retrieve(EMPLOYEES, &[5]).unwrap()[0]["firstName"], "Eve");
}

// ============================================================================
// Delete Tests
// ============================================================================

#[test]
fn test_delete_entries() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    store.delete(EMPLOYEES, &[1, 3, 77]).unwrap();
    let rows = store.retrieve(EMPLOYEES, &[1, 2, 3, 4, 5]).unwrap();
    assert_eq!(first_names(&rows), vec!["Bob", "Dave", "Eve"]);
}

#[test]
fn test_deleted_ids_not_reused() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    store.delete(EMPLOYEES, &[5]).unwrap();
    let doc = store.create(EMPLOYEES, &json!({"firstName": "Frank"})).unwrap();
    assert_eq!(entry_id(&doc), 6);
}

#[test]
fn test_clear_soup() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    store.clear_soup(EMPLOYEES).unwrap();
    assert!(store.has_soup(EMPLOYEES));
    let all = QuerySpec::all(EMPLOYEES, None, Order::Ascending, 10);
    assert_eq!(store.count_query(&all).unwrap(), 0);

    let doc = store.create(EMPLOYEES, &json!({"firstName": "Gina"})).unwrap();
    assert_eq!(entry_id(&doc), 6);
}
