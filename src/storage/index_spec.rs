use crate::error::{DbError, DbResult};
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Type of index
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IndexType {
    /// Exact-match text column
    String,
    /// 64-bit integer column
    Integer,
    /// Double precision column
    Floating,
    /// Text column mirrored into the soup's full-text table
    FullText,
    /// Not stored; `json_extract` over the body column at query time
    Json1,
}

impl IndexType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexType::String => "string",
            IndexType::Integer => "integer",
            IndexType::Floating => "floating",
            IndexType::FullText => "full_text",
            IndexType::Json1 => "json1",
        }
    }

    pub fn parse(name: &str) -> DbResult<Self> {
        match name {
            "string" => Ok(IndexType::String),
            "integer" => Ok(IndexType::Integer),
            "floating" => Ok(IndexType::Floating),
            "full_text" => Ok(IndexType::FullText),
            "json1" => Ok(IndexType::Json1),
            other => Err(DbError::InvalidIndexSpec(format!(
                "unknown index type '{}'",
                other
            ))),
        }
    }

    /// Whether values of this type live in a physical column
    pub fn is_stored(&self) -> bool {
        !matches!(self, IndexType::Json1)
    }

    /// SQLite column affinity for stored types
    pub fn sql_type(&self) -> &'static str {
        match self {
            IndexType::Integer => "INTEGER",
            IndexType::Floating => "REAL",
            IndexType::String | IndexType::FullText | IndexType::Json1 => "TEXT",
        }
    }
}

/// Full-text module backing a soup's shadow table
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FtsExtension {
    Fts4,
    #[default]
    Fts5,
}

impl FtsExtension {
    pub fn as_str(&self) -> &'static str {
        match self {
            FtsExtension::Fts4 => "fts4",
            FtsExtension::Fts5 => "fts5",
        }
    }

    pub fn parse(name: &str) -> DbResult<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fts4" => Ok(FtsExtension::Fts4),
            "fts5" => Ok(FtsExtension::Fts5),
            other => Err(DbError::ConfigError(format!(
                "unknown full-text extension '{}'",
                other
            ))),
        }
    }
}

/// One indexed projection of a soup's documents
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    /// Dot-separated path into the document
    pub path: String,
    #[serde(rename = "type")]
    pub index_type: IndexType,
    /// Physical column, or the extraction expression for `Json1`.
    /// Unset until the soup is registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
}

impl PartialEq for IndexSpec {
    fn eq(&self, other: &Self) -> bool {
        if self.path != other.path || self.index_type != other.index_type {
            return false;
        }
        match (&self.column_name, &other.column_name) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

impl IndexSpec {
    pub fn new(path: impl Into<String>, index_type: IndexType) -> Self {
        Self {
            path: path.into(),
            index_type,
            column_name: None,
        }
    }

    pub fn string(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::String)
    }

    pub fn integer(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::Integer)
    }

    pub fn floating(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::Floating)
    }

    pub fn full_text(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::FullText)
    }

    pub fn json1(path: impl Into<String>) -> Self {
        Self::new(path, IndexType::Json1)
    }

    /// Copy of this spec with the column assigned for `table` at `ordinal`
    pub fn with_column_for(&self, table: &str, ordinal: usize) -> Self {
        let column = match self.index_type {
            IndexType::Json1 => json_extract_expression(&self.path),
            _ => format!("{}_{}", table, ordinal),
        };
        Self {
            path: self.path.clone(),
            index_type: self.index_type,
            column_name: Some(column),
        }
    }

    /// Copy without any column assignment
    pub fn without_column(&self) -> Self {
        Self::new(self.path.clone(), self.index_type)
    }

    /// Stored column name, if this spec is stored and registered
    pub fn stored_column(&self) -> Option<&str> {
        if self.index_type.is_stored() {
            self.column_name.as_deref()
        } else {
            None
        }
    }
}

/// `json_extract(soup, '$.path')`
pub fn json_extract_expression(path: &str) -> String {
    format!("json_extract(soup, '$.{}')", path)
}

fn path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^[^.\s{}:'"]+(\.[^.\s{}:'"]+)*$"#).expect("index path pattern is valid")
    })
}

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"^[^\s{}:'"]+$"#).expect("soup name pattern is valid"))
}

/// Soup names are embedded in `{soup}` references and SQL string literals.
pub fn validate_soup_name(name: &str) -> DbResult<()> {
    if !name_pattern().is_match(name) {
        return Err(DbError::InvalidSoupSpec(format!(
            "invalid soup name '{}'",
            name
        )));
    }
    Ok(())
}

/// Non-empty, well-formed, non-reserved and unique paths.
pub fn validate_index_specs(specs: &[IndexSpec]) -> DbResult<()> {
    if specs.is_empty() {
        return Err(DbError::InvalidIndexSpec(
            "at least one index spec is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for spec in specs {
        if !path_pattern().is_match(&spec.path) {
            return Err(DbError::InvalidIndexSpec(format!(
                "invalid path '{}'",
                spec.path
            )));
        }
        if smartsql_core::is_reserved_path(&spec.path) {
            return Err(DbError::InvalidIndexSpec(format!(
                "path '{}' is reserved",
                spec.path
            )));
        }
        if !seen.insert(spec.path.as_str()) {
            return Err(DbError::InvalidIndexSpec(format!(
                "duplicate path '{}'",
                spec.path
            )));
        }
    }
    Ok(())
}

pub fn has_full_text(specs: &[IndexSpec]) -> bool {
    specs.iter().any(|s| s.index_type == IndexType::FullText)
}

pub fn has_json1(specs: &[IndexSpec]) -> bool {
    specs.iter().any(|s| s.index_type == IndexType::Json1)
}

// ==================== Projection ====================

/// Value at a dot-separated path, `Null` when absent.
///
/// When an intermediate value is an array the rest of the path is applied to
/// each element and the results are collected into an array.
pub fn project(doc: &Value, path: &str) -> Value {
    let parts: Vec<&str> = path.split('.').collect();
    project_parts(doc, &parts)
}

fn project_parts(current: &Value, parts: &[&str]) -> Value {
    let Some((head, rest)) = parts.split_first() else {
        return current.clone();
    };
    match current {
        Value::Object(map) => match map.get(*head) {
            Some(next) => project_parts(next, rest),
            None => Value::Null,
        },
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| project_parts(item, parts))
                .collect(),
        ),
        _ => Value::Null,
    }
}

/// Coerce a projected value into the column value for `index_type`.
pub fn coerce(index_type: IndexType, value: &Value) -> SqlValue {
    match index_type {
        IndexType::String | IndexType::FullText => match value {
            Value::Null => SqlValue::Null,
            Value::String(s) => SqlValue::Text(s.clone()),
            other => SqlValue::Text(other.to_string()),
        },
        IndexType::Integer => match value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
                .map(SqlValue::Integer)
                .unwrap_or(SqlValue::Null),
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().map(|f| f.trunc() as i64))
                    .map(SqlValue::Integer)
                    .unwrap_or(SqlValue::Null)
            }
            _ => SqlValue::Null,
        },
        IndexType::Floating => match value {
            Value::Number(n) => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
            Value::Bool(b) => SqlValue::Real(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .map(SqlValue::Real)
                .unwrap_or(SqlValue::Null),
            _ => SqlValue::Null,
        },
        IndexType::Json1 => to_sql_value(value),
    }
}

/// Plain JSON to SQLite conversion for bound arguments.
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}
