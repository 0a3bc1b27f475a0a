//! Soup Registration Tests
//!
//! Tests for the soup catalog:
//! - Registration and physical table naming
//! - Index spec validation
//! - Dropping soups
//! - Persistence across reopen

mod common;

use common::*;
use smartstore::{DbError, IndexSpec, IndexType, SoupSpec};

// ============================================================================
// Registration Tests
// ============================================================================

#[test]
fn test_register_soup() {
    let (store, _tmp) = create_test_store();

    assert!(!store.has_soup(EMPLOYEES));
    store.register_soup(EMPLOYEES, &employee_specs()).unwrap();

    assert!(store.has_soup(EMPLOYEES));
    assert_eq!(
        store.get_soup_table_name(EMPLOYEES).unwrap(),
        Some("TABLE_1".to_string())
    );
    assert_eq!(store.get_all_soup_names().unwrap(), vec![EMPLOYEES]);
}

#[test]
fn test_index_specs_get_column_names() {
    let (store, _tmp) = create_test_store();
    store.register_soup(EMPLOYEES, &employee_specs()).unwrap();

    let specs = store.get_soup_index_specs(EMPLOYEES).unwrap();
    assert_eq!(specs.len(), 6);
    assert_eq!(specs[0].path, "firstName");
    assert_eq!(specs[0].column_name.as_deref(), Some("TABLE_1_0"));
    assert_eq!(specs[5].path, "age");
    assert_eq!(specs[5].index_type, IndexType::Integer);
    assert_eq!(specs[5].column_name.as_deref(), Some("TABLE_1_5"));

    // column names are ignored when comparing against unregistered specs
    assert_eq!(specs, employee_specs());
}

#[test]
fn test_json1_spec_column_is_expression() {
    let (store, _tmp) = create_test_store();
    store
        .register_soup(
            "people",
            &[IndexSpec::string("name"), IndexSpec::json1("address.city")],
        )
        .unwrap();

    let specs = store.get_soup_index_specs("people").unwrap();
    assert_eq!(
        specs[1].column_name.as_deref(),
        Some("json_extract(soup, '$.address.city')")
    );
}

#[test]
fn test_register_existing_soup_is_noop() {
    let (store, _tmp) = create_test_store();
    store.register_soup(EMPLOYEES, &employee_specs()).unwrap();
    store
        .register_soup(EMPLOYEES, &[IndexSpec::string("other")])
        .unwrap();

    let specs = store.get_soup_index_specs(EMPLOYEES).unwrap();
    assert_eq!(specs.len(), 6);
    assert_eq!(store.get_all_soup_names().unwrap().len(), 1);
}

#[test]
fn test_soup_spec_features_round_trip() {
    let (store, _tmp) = create_test_store();
    store
        .register_soup_with_spec(
            &SoupSpec::external_storage("notes"),
            &[IndexSpec::string("title")],
        )
        .unwrap();

    let spec = store.get_soup_spec("notes").unwrap();
    assert!(spec.uses_external_storage());
    assert_eq!(spec.name, "notes");
}

// ============================================================================
// Validation Tests
// ============================================================================

#[test]
fn test_register_requires_index_specs() {
    let (store, _tmp) = create_test_store();
    let err = store.register_soup(EMPLOYEES, &[]).unwrap_err();
    assert!(matches!(err, DbError::InvalidIndexSpec(_)));
    assert!(!store.has_soup(EMPLOYEES));
}

#[test]
fn test_register_rejects_bad_paths() {
    let (store, _tmp) = create_test_store();

    let reserved = store
        .register_soup("s", &[IndexSpec::string("_soupEntryId")])
        .unwrap_err();
    assert!(matches!(reserved, DbError::InvalidIndexSpec(_)));

    let duplicate = store
        .register_soup("s", &[IndexSpec::string("a"), IndexSpec::integer("a")])
        .unwrap_err();
    assert!(matches!(duplicate, DbError::InvalidIndexSpec(_)));

    let malformed = store
        .register_soup("s", &[IndexSpec::string("a..b")])
        .unwrap_err();
    assert!(matches!(malformed, DbError::InvalidIndexSpec(_)));
}

#[test]
fn test_register_rejects_bad_soup_names() {
    let (store, _tmp) = create_test_store();
    for name in ["has space", "curly{", "quote'", "colon:name", ""] {
        let err = store
            .register_soup(name, &[IndexSpec::string("a")])
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidSoupSpec(_)), "{}", name);
    }
}

#[test]
fn test_external_storage_rejects_json1() {
    let (store, _tmp) = create_test_store();
    let err = store
        .register_soup_with_spec(
            &SoupSpec::external_storage("notes"),
            &[IndexSpec::json1("title")],
        )
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidSoupSpec(_)));
}

// ============================================================================
// Drop Tests
// ============================================================================

#[test]
fn test_drop_soup() {
    let (store, _tmp) = create_test_store();
    seed_employees(&store);

    store.drop_soup(EMPLOYEES).unwrap();
    assert!(!store.has_soup(EMPLOYEES));
    assert!(store.get_all_soup_names().unwrap().is_empty());
    assert!(matches!(
        store.create(EMPLOYEES, &employee_docs()[0]),
        Err(DbError::SoupNotFound(_))
    ));
}

#[test]
fn test_drop_missing_soup() {
    let (store, _tmp) = create_test_store();
    let err = store.drop_soup("nothing").unwrap_err();
    assert!(matches!(err, DbError::SoupNotFound(_)));
}

#[test]
fn test_table_ids_not_reused() {
    let (store, _tmp) = create_test_store();
    store.register_soup("a", &[IndexSpec::string("k")]).unwrap();
    store.register_soup("b", &[IndexSpec::string("k")]).unwrap();
    store.drop_soup("b").unwrap();
    store.register_soup("c", &[IndexSpec::string("k")]).unwrap();

    assert_eq!(
        store.get_soup_table_name("c").unwrap(),
        Some("TABLE_3".to_string())
    );
}

#[test]
fn test_drop_all_soups() {
    let (store, _tmp) = create_test_store();
    store.register_soup("a", &[IndexSpec::string("k")]).unwrap();
    store.register_soup("b", &[IndexSpec::string("k")]).unwrap();

    store.drop_all_soups().unwrap();
    assert!(store.get_all_soup_names().unwrap().is_empty());
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_catalog_survives_reopen() {
    let (store, tmp) = create_test_store();
    seed_employees(&store);
    store.close().unwrap();

    let store = reopen(&tmp);
    assert!(store.has_soup(EMPLOYEES));
    assert_eq!(store.get_soup_index_specs(EMPLOYEES).unwrap(), employee_specs());
    assert_eq!(store.retrieve(EMPLOYEES, &[1, 2]).unwrap().len(), 2);
}

#[test]
fn test_database_size_and_delete() {
    let (store, tmp) = create_test_store();
    seed_employees(&store);
    assert!(store.database_size() > 0);
    store.close().unwrap();

    let path = db_path(&tmp);
    smartstore::SmartStore::delete_database(&path, &smartstore::StoreConfig::default()).unwrap();
    assert!(!path.exists());

    // deleting again is fine
    smartstore::SmartStore::delete_database(&path, &smartstore::StoreConfig::default()).unwrap();
}
