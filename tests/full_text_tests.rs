//! Full-Text Tests
//!
//! Tests for full-text indexes under both FTS4 and FTS5:
//! - Match over all columns and one column
//! - Shadow table maintenance on update and delete

mod common;

use common::*;
use serde_json::json;
use smartstore::{FtsExtension, IndexSpec, Order, QuerySpec, SmartStore, StoreConfig};

const ARTICLES: &str = "articles";

fn create_articles_store(extension: FtsExtension) -> (SmartStore, tempfile::TempDir) {
    let config = StoreConfig {
        fts_extension: extension,
        ..StoreConfig::default()
    };
    let (store, tmp) = create_test_store_with(config);
    store
        .register_soup(
            ARTICLES,
            &[
                IndexSpec::full_text("title"),
                IndexSpec::full_text("body"),
                IndexSpec::integer("published"),
            ],
        )
        .unwrap();
    store
        .create(ARTICLES, &json!({"title": "Learning Rust", "body": "ownership and borrowing", "published": 2021}))
        .unwrap();
    store
        .create(ARTICLES, &json!({"title": "SQLite tips", "body": "indexes help rust programs too", "published": 2019}))
        .unwrap();
    store
        .create(ARTICLES, &json!({"title": "Gardening", "body": "tomatoes need sun", "published": 2020}))
        .unwrap();
    (store, tmp)
}

fn titles(rows: &[serde_json::Value]) -> Vec<String> {
    rows.iter()
        .map(|row| row["title"].as_str().unwrap_or_default().to_string())
        .collect()
}

fn check_match_all_columns(extension: FtsExtension) {
    let (store, _tmp) = create_articles_store(extension);
    let spec = QuerySpec::matching(ARTICLES, None, "rust", Some("published"), Order::Ascending, 10);
    assert_eq!(
        titles(&store.query(&spec, 0).unwrap()),
        vec!["SQLite tips", "Learning Rust"]
    );
    assert_eq!(store.count_query(&spec).unwrap(), 2);
}

fn check_match_one_column(extension: FtsExtension) {
    let (store, _tmp) = create_articles_store(extension);
    let spec = QuerySpec::matching(ARTICLES, Some("title"), "rust", None, Order::Ascending, 10);
    assert_eq!(titles(&store.query(&spec, 0).unwrap()), vec!["Learning Rust"]);
}

fn check_update_and_delete(extension: FtsExtension) {
    let (store, _tmp) = create_articles_store(extension);
    let spec = QuerySpec::matching(ARTICLES, None, "tomatoes", None, Order::Ascending, 10);
    assert_eq!(store.count_query(&spec).unwrap(), 1);

    store
        .update(ARTICLES, 3, &json!({"title": "Gardening", "body": "peppers need sun"}))
        .unwrap();
    assert_eq!(store.count_query(&spec).unwrap(), 0);
    let peppers = QuerySpec::matching(ARTICLES, None, "peppers", None, Order::Ascending, 10);
    assert_eq!(store.count_query(&peppers).unwrap(), 1);

    store.delete(ARTICLES, &[3]).unwrap();
    assert_eq!(store.count_query(&peppers).unwrap(), 0);
}

fn check_shadow_table_module(extension: FtsExtension, module: &str) {
    let (store, tmp) = create_articles_store(extension);
    store.close().unwrap();

    let conn = rusqlite::Connection::open(db_path(&tmp)).unwrap();
    let sql: String = conn
        .query_row(
            "SELECT sql FROM sqlite_master WHERE name = 'TABLE_1_fts'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(sql.to_lowercase().contains(module), "{}", sql);
}

// ============================================================================
// FTS5 Tests
// ============================================================================

#[test]
fn test_fts5_match_all_columns() {
    check_match_all_columns(FtsExtension::Fts5);
}

#[test]
fn test_fts5_match_one_column() {
    check_match_one_column(FtsExtension::Fts5);
}

#[test]
fn test_fts5_update_and_delete() {
    check_update_and_delete(FtsExtension::Fts5);
}

#[test]
fn test_fts5_shadow_table() {
    check_shadow_table_module(FtsExtension::Fts5, "fts5");
}

// ============================================================================
// FTS4 Tests
// ============================================================================

#[test]
fn test_fts4_match_all_columns() {
    check_match_all_columns(FtsExtension::Fts4);
}

#[test]
fn test_fts4_match_one_column() {
    check_match_one_column(FtsExtension::Fts4);
}

#[test]
fn test_fts4_update_and_delete() {
    check_update_and_delete(FtsExtension::Fts4);
}

#[test]
fn test_fts4_shadow_table() {
    check_shadow_table_module(FtsExtension::Fts4, "fts4");
}

// ============================================================================
// Error Tests
// ============================================================================

#[test]
fn test_match_requires_full_text_path() {
    let (store, _tmp) = create_articles_store(FtsExtension::Fts5);
    let spec = QuerySpec::matching(ARTICLES, Some("published"), "2021", None, Order::Ascending, 10);
    assert!(store.query(&spec, 0).is_err());

    let (people, _tmp2) = create_test_store();
    seed_employees(&people);
    let spec = QuerySpec::matching(EMPLOYEES, None, "Alice", None, Order::Ascending, 10);
    assert!(people.query(&spec, 0).is_err());
}

#[test]
fn test_clear_soup_empties_full_text() {
    let (store, _tmp) = create_articles_store(FtsExtension::Fts5);
    store.clear_soup(ARTICLES).unwrap();
    let spec = QuerySpec::matching(ARTICLES, None, "rust", None, Order::Ascending, 10);
    assert_eq!(store.count_query(&spec).unwrap(), 0);
}
