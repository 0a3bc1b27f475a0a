//! Metadata catalog.
//!
//! Maps soup names to their physical table and ordered index specs. The
//! persisted tables are the source of truth; the in-memory map is a
//! write-through cache scoped to one open connection.

use super::index_spec::{FtsExtension, IndexSpec, IndexType};
use super::soup_spec::SoupSpec;
use crate::error::{DbError, DbResult};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

pub const SOUP_ATTRS_TABLE: &str = "soup_attrs";
pub const SOUP_INDEX_MAP_TABLE: &str = "soup_index_map";
pub const LONG_OPERATIONS_STATUS_TABLE: &str = "long_operations_status";

/// Everything the engine needs to know about one registered soup
#[derive(Debug, Clone, PartialEq)]
pub struct SoupMeta {
    /// Row id in `soup_attrs`; the table name derives from it
    pub id: i64,
    pub spec: SoupSpec,
    pub table_name: String,
    /// Registered specs, column names assigned, in ordinal order
    pub index_specs: Vec<IndexSpec>,
    /// Set when the soup has full-text indexes
    pub fts_extension: Option<FtsExtension>,
}

impl SoupMeta {
    pub fn table_name_for(id: i64) -> String {
        format!("TABLE_{}", id)
    }

    /// Build metadata with column names assigned from ordinals
    pub fn assemble(
        id: i64,
        spec: SoupSpec,
        index_specs: &[IndexSpec],
        fts_extension: FtsExtension,
    ) -> Self {
        let table_name = Self::table_name_for(id);
        let index_specs: Vec<IndexSpec> = index_specs
            .iter()
            .enumerate()
            .map(|(ordinal, spec)| spec.with_column_for(&table_name, ordinal))
            .collect();
        let fts_extension = super::index_spec::has_full_text(&index_specs).then_some(fts_extension);
        Self {
            id,
            spec,
            table_name,
            index_specs,
            fts_extension,
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn external_storage(&self) -> bool {
        self.spec.uses_external_storage()
    }

    pub fn fts_table(&self) -> String {
        format!("{}_fts", self.table_name)
    }

    pub fn has_full_text(&self) -> bool {
        self.fts_extension.is_some()
    }

    pub fn index_spec(&self, path: &str) -> Option<&IndexSpec> {
        self.index_specs.iter().find(|s| s.path == path)
    }

    /// Ordinal position of `path`
    pub fn ordinal_of(&self, path: &str) -> Option<usize> {
        self.index_specs.iter().position(|s| s.path == path)
    }

    pub fn stored_specs(&self) -> impl Iterator<Item = &IndexSpec> {
        self.index_specs.iter().filter(|s| s.index_type.is_stored())
    }

    pub fn full_text_specs(&self) -> impl Iterator<Item = &IndexSpec> {
        self.index_specs
            .iter()
            .filter(|s| s.index_type == IndexType::FullText)
    }

    /// Name of the SQL index backing the spec at `ordinal`
    pub fn index_name(&self, ordinal: usize) -> String {
        format!("{}_{}_idx", self.table_name, ordinal)
    }
}

/// Soup catalog with a write-through cache
#[derive(Debug, Default)]
pub struct Catalog {
    cache: RwLock<HashMap<String, Arc<SoupMeta>>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the catalog tables if missing
    pub fn init_schema(conn: &Connection) -> DbResult<()> {
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {attrs} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                soupName TEXT NOT NULL UNIQUE,
                features TEXT NOT NULL DEFAULT '[]',
                ftsExtension TEXT
            );
            CREATE TABLE IF NOT EXISTS {index_map} (
                soupName TEXT NOT NULL,
                path TEXT NOT NULL,
                columnName TEXT NOT NULL,
                columnType TEXT NOT NULL,
                ordinal INTEGER NOT NULL,
                PRIMARY KEY (soupName, path)
            );
            CREATE TABLE IF NOT EXISTS {long_ops} (
                soupName TEXT PRIMARY KEY,
                type TEXT NOT NULL,
                details TEXT NOT NULL,
                status TEXT NOT NULL,
                created INTEGER NOT NULL,
                lastModified INTEGER NOT NULL
            );",
            attrs = SOUP_ATTRS_TABLE,
            index_map = SOUP_INDEX_MAP_TABLE,
            long_ops = LONG_OPERATIONS_STATUS_TABLE,
        ))?;
        Ok(())
    }

    // ==================== Reads ====================

    pub fn lookup(&self, conn: &Connection, name: &str) -> DbResult<Option<Arc<SoupMeta>>> {
        if let Some(meta) = self.cache.read().get(name) {
            return Ok(Some(meta.clone()));
        }

        let Some(meta) = Self::load(conn, name)? else {
            return Ok(None);
        };
        let meta = Arc::new(meta);
        self.cache.write().insert(name.to_string(), meta.clone());
        Ok(Some(meta))
    }

    pub fn require(&self, conn: &Connection, name: &str) -> DbResult<Arc<SoupMeta>> {
        self.lookup(conn, name)?
            .ok_or_else(|| DbError::SoupNotFound(name.to_string()))
    }

    /// Best effort: lookup failures count as "no such soup"
    pub fn has_soup(&self, conn: &Connection, name: &str) -> bool {
        matches!(self.lookup(conn, name), Ok(Some(_)))
    }

    pub fn table_for(&self, conn: &Connection, name: &str) -> DbResult<Option<String>> {
        Ok(self.lookup(conn, name)?.map(|m| m.table_name.clone()))
    }

    pub fn index_specs_for(&self, conn: &Connection, name: &str) -> DbResult<Vec<IndexSpec>> {
        Ok(self.require(conn, name)?.index_specs.clone())
    }

    pub fn soup_spec_for(&self, conn: &Connection, name: &str) -> DbResult<SoupSpec> {
        Ok(self.require(conn, name)?.spec.clone())
    }

    pub fn soup_names(conn: &Connection) -> DbResult<Vec<String>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT soupName FROM {} ORDER BY id",
            SOUP_ATTRS_TABLE
        ))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn load(conn: &Connection, name: &str) -> DbResult<Option<SoupMeta>> {
        let attrs = conn
            .query_row(
                &format!(
                    "SELECT id, features, ftsExtension FROM {} WHERE soupName = ?1",
                    SOUP_ATTRS_TABLE
                ),
                params![name],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;
        let Some((id, features, fts)) = attrs else {
            return Ok(None);
        };

        let features: BTreeSet<String> = serde_json::from_str(&features)?;
        let fts_extension = fts.as_deref().map(FtsExtension::parse).transpose()?;

        let mut stmt = conn.prepare_cached(&format!(
            "SELECT path, columnName, columnType FROM {} WHERE soupName = ?1 ORDER BY ordinal",
            SOUP_INDEX_MAP_TABLE
        ))?;
        let rows = stmt
            .query_map(params![name], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut index_specs = Vec::with_capacity(rows.len());
        for (path, column, column_type) in rows {
            index_specs.push(IndexSpec {
                path,
                index_type: IndexType::parse(&column_type)?,
                column_name: Some(column),
            });
        }

        Ok(Some(SoupMeta {
            id,
            spec: SoupSpec {
                name: name.to_string(),
                features,
            },
            table_name: SoupMeta::table_name_for(id),
            index_specs,
            fts_extension,
        }))
    }

    // ==================== Writes ====================

    /// Reserve a `soup_attrs` row for a new soup and return its id
    pub fn allocate(&self, conn: &Connection, spec: &SoupSpec) -> DbResult<i64> {
        conn.execute(
            &format!(
                "INSERT INTO {} (soupName, features) VALUES (?1, ?2)",
                SOUP_ATTRS_TABLE
            ),
            params![spec.name, serde_json::to_string(&spec.features)?],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist the attributes and index map of `meta`, replacing any previous mapping
    pub fn register_mapping(&self, conn: &Connection, meta: &SoupMeta) -> DbResult<()> {
        let updated = conn.execute(
            &format!(
                "UPDATE {} SET features = ?1, ftsExtension = ?2 WHERE id = ?3 AND soupName = ?4",
                SOUP_ATTRS_TABLE
            ),
            params![
                serde_json::to_string(&meta.spec.features)?,
                meta.fts_extension.map(|f| f.as_str()),
                meta.id,
                meta.name(),
            ],
        )?;
        if updated == 0 {
            return Err(DbError::SoupNotFound(meta.name().to_string()));
        }

        conn.execute(
            &format!("DELETE FROM {} WHERE soupName = ?1", SOUP_INDEX_MAP_TABLE),
            params![meta.name()],
        )?;
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (soupName, path, columnName, columnType, ordinal) VALUES (?1, ?2, ?3, ?4, ?5)",
            SOUP_INDEX_MAP_TABLE
        ))?;
        for (ordinal, spec) in meta.index_specs.iter().enumerate() {
            let column = spec.column_name.as_deref().ok_or_else(|| {
                DbError::InvalidIndexSpec(format!("path '{}' has no column assigned", spec.path))
            })?;
            stmt.execute(params![
                meta.name(),
                spec.path,
                column,
                spec.index_type.as_str(),
                ordinal as i64
            ])?;
        }

        self.cache
            .write()
            .insert(meta.name().to_string(), Arc::new(meta.clone()));
        tracing::debug!("Catalog mapping written for soup '{}'", meta.name());
        Ok(())
    }

    pub fn drop_mapping(&self, conn: &Connection, name: &str) -> DbResult<()> {
        conn.execute(
            &format!("DELETE FROM {} WHERE soupName = ?1", SOUP_INDEX_MAP_TABLE),
            params![name],
        )?;
        conn.execute(
            &format!("DELETE FROM {} WHERE soupName = ?1", SOUP_ATTRS_TABLE),
            params![name],
        )?;
        self.invalidate(name);
        Ok(())
    }

    // ==================== Invalidation ====================

    pub fn invalidate(&self, name: &str) {
        if self.cache.write().remove(name).is_some() {
            tracing::debug!("Catalog cache invalidated for soup '{}'", name);
        }
    }

    pub fn clear(&self) {
        self.cache.write().clear();
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }
}
