//! Soup and path resolution seam.
//!
//! The compiler never talks to storage directly; it asks a [`SoupResolver`]
//! what a soup or a path maps to.

use crate::error::SmartSqlResult;
use std::collections::HashMap;

/// Physical target of a `{soup}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SoupTarget {
    pub table_name: String,
    /// Bodies live outside the row, so the table has no body column.
    pub external_storage: bool,
}

/// Physical target of a `{soup:path}` reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathTarget {
    /// A stored column
    Column(String),
    /// A JSON path extracted from the body column at query time
    Extract(String),
}

/// Resolve logical soup names and paths to physical identifiers.
pub trait SoupResolver {
    /// `Ok(None)` when the soup is not registered.
    fn resolve_soup(&self, soup: &str) -> SmartSqlResult<Option<SoupTarget>>;

    /// `Ok(None)` when the path is not indexed in that soup.
    fn resolve_path(&self, soup: &str, path: &str) -> SmartSqlResult<Option<PathTarget>>;
}

impl<T: SoupResolver + ?Sized> SoupResolver for &T {
    fn resolve_soup(&self, soup: &str) -> SmartSqlResult<Option<SoupTarget>> {
        (**self).resolve_soup(soup)
    }

    fn resolve_path(&self, soup: &str, path: &str) -> SmartSqlResult<Option<PathTarget>> {
        (**self).resolve_path(soup, path)
    }
}

#[derive(Debug, Clone)]
struct InMemorySoup {
    target: SoupTarget,
    paths: HashMap<String, PathTarget>,
}

/// In-memory resolver for tests and tooling
#[derive(Debug, Clone, Default)]
pub struct InMemoryResolver {
    soups: HashMap<String, InMemorySoup>,
}

impl InMemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_soup(&mut self, soup: &str, table_name: &str, external_storage: bool) -> &mut Self {
        self.soups.insert(
            soup.to_string(),
            InMemorySoup {
                target: SoupTarget {
                    table_name: table_name.to_string(),
                    external_storage,
                },
                paths: HashMap::new(),
            },
        );
        self
    }

    /// Map `path` to a stored column. Ignored if the soup was never added.
    pub fn add_column(&mut self, soup: &str, path: &str, column: &str) -> &mut Self {
        if let Some(entry) = self.soups.get_mut(soup) {
            entry
                .paths
                .insert(path.to_string(), PathTarget::Column(column.to_string()));
        }
        self
    }

    /// Map `path` to a body extraction. Ignored if the soup was never added.
    pub fn add_extract(&mut self, soup: &str, path: &str) -> &mut Self {
        if let Some(entry) = self.soups.get_mut(soup) {
            entry
                .paths
                .insert(path.to_string(), PathTarget::Extract(path.to_string()));
        }
        self
    }
}

impl SoupResolver for InMemoryResolver {
    fn resolve_soup(&self, soup: &str) -> SmartSqlResult<Option<SoupTarget>> {
        Ok(self.soups.get(soup).map(|s| s.target.clone()))
    }

    fn resolve_path(&self, soup: &str, path: &str) -> SmartSqlResult<Option<PathTarget>> {
        Ok(self
            .soups
            .get(soup)
            .and_then(|s| s.paths.get(path))
            .cloned())
    }
}
