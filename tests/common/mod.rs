//! Common test utilities for SmartStore tests
//!
//! Provides shared helper functions for:
//! - Creating stores backed by a temp directory
//! - Reopening a store on the same database file
//! - Seeding a small employees soup

#![allow(dead_code)]

use serde_json::{json, Value};
use smartstore::{IndexSpec, SmartStore, StoreConfig};
use std::path::PathBuf;
use tempfile::TempDir;

pub const EMPLOYEES: &str = "employees";

pub fn db_path(tmp: &TempDir) -> PathBuf {
    tmp.path().join("test.db")
}

pub fn create_test_store() -> (SmartStore, TempDir) {
    create_test_store_with(StoreConfig::default())
}

pub fn create_test_store_with(config: StoreConfig) -> (SmartStore, TempDir) {
    let tmp_dir = TempDir::new().expect("Failed to create temp dir");
    let store = SmartStore::open(db_path(&tmp_dir), config).expect("Failed to open store");
    (store, tmp_dir)
}

pub fn reopen(tmp: &TempDir) -> SmartStore {
    SmartStore::open(db_path(tmp), StoreConfig::default()).expect("Failed to reopen store")
}

/// firstName, lastName, deptCode, employeeId, salary, age, in that order
pub fn employee_specs() -> Vec<IndexSpec> {
    vec![
        IndexSpec::string("firstName"),
        IndexSpec::string("lastName"),
        IndexSpec::string("deptCode"),
        IndexSpec::string("employeeId"),
        IndexSpec::floating("salary"),
        IndexSpec::integer("age"),
    ]
}

pub fn employee_docs() -> Vec<Value> {
    vec![
        json!({"firstName": "Alice", "lastName": "Smith", "deptCode": "eng", "employeeId": "E1", "salary": 120000.5, "age": 34}),
        json!({"firstName": "Bob", "lastName": "Jones", "deptCode": "eng", "employeeId": "E2", "salary": 95000.0, "age": 28}),
        json!({"firstName": "Carol", "lastName": "White", "deptCode": "sales", "employeeId": "E3", "salary": 70000.0, "age": 45}),
        json!({"firstName": "Dave", "lastName": "Brown", "deptCode": "sales", "employeeId": "E4", "salary": 65000.0, "age": 23}),
        json!({"firstName": "Eve", "lastName": "Black", "deptCode": "hr", "employeeId": "E5", "salary": 80000.0, "age": 39}),
    ]
}

/// Register the employees soup and insert the five employees
pub fn seed_employees(store: &SmartStore) -> Vec<Value> {
    store
        .register_soup(EMPLOYEES, &employee_specs())
        .expect("Failed to register employees");
    employee_docs()
        .iter()
        .map(|doc| store.create(EMPLOYEES, doc).expect("Failed to create employee"))
        .collect()
}

pub fn first_names(rows: &[Value]) -> Vec<String> {
    rows.iter()
        .map(|row| row["firstName"].as_str().unwrap_or_default().to_string())
        .collect()
}

pub fn entry_id(doc: &Value) -> i64 {
    doc["_soupEntryId"].as_i64().expect("entry id")
}
