//! Soup operations on [`SmartStore`](crate::storage::SmartStore), split by concern.

pub mod blobs;
pub mod crud;
pub mod fulltext;
pub mod query;
pub mod reindex;

use super::catalog::SoupMeta;
use super::index_spec::{coerce, project, IndexSpec, IndexType};
use crate::error::{DbError, DbResult};
use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use smartsql_core::{CREATED_PATH, ENTRY_ID_PATH, LAST_MODIFIED_PATH};

/// One stored index column computed from a document
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectedColumn {
    pub column: String,
    pub index_type: IndexType,
    pub value: SqlValue,
}

/// Column values for `specs`, skipping generated (`Json1`) ones
pub(crate) fn project_columns<'a, I>(specs: I, element: &Value) -> Vec<ProjectedColumn>
where
    I: IntoIterator<Item = &'a IndexSpec>,
{
    specs
        .into_iter()
        .filter_map(|spec| {
            spec.stored_column().map(|column| ProjectedColumn {
                column: column.to_string(),
                index_type: spec.index_type,
                value: coerce(spec.index_type, &project(element, &spec.path)),
            })
        })
        .collect()
}

pub(crate) fn project_all(meta: &SoupMeta, element: &Value) -> Vec<ProjectedColumn> {
    project_columns(&meta.index_specs, element)
}

/// Clone `doc` after checking it is a JSON object
pub(crate) fn as_document(doc: &Value) -> DbResult<Value> {
    if doc.is_object() {
        Ok(doc.clone())
    } else {
        Err(DbError::InvalidDocument(
            "soup elements must be JSON objects".to_string(),
        ))
    }
}

/// Set the three engine-managed fields on an element
pub(crate) fn stamp(element: &mut Value, id: i64, created: i64, last_modified: i64) {
    if let Some(map) = element.as_object_mut() {
        map.insert(ENTRY_ID_PATH.to_string(), Value::from(id));
        map.insert(CREATED_PATH.to_string(), Value::from(created));
        map.insert(LAST_MODIFIED_PATH.to_string(), Value::from(last_modified));
    }
}

pub(crate) fn entry_id_of(element: &Value) -> Option<i64> {
    element.get(ENTRY_ID_PATH).and_then(Value::as_i64)
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
