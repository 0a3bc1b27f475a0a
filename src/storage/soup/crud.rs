use super::{as_document, entry_id_of, now_millis, project_all, stamp, ProjectedColumn};
use crate::error::{DbError, DbResult};
use crate::storage::catalog::SoupMeta;
use crate::storage::engine::SmartStore;
use crate::storage::index_spec::{coerce, project};
use crate::storage::query_spec::QuerySpec;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection, OptionalExtension};
use serde_json::Value;
use smartsql_core::ENTRY_ID_PATH;

impl SmartStore {
    // ==================== Create ====================

    /// Insert a document and return it with its entry id and timestamps
    pub fn create(&self, soup: &str, doc: &Value) -> DbResult<Value> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        let element = self.create_in(&sp, &meta, doc)?;
        sp.commit()?;
        Ok(element)
    }

    pub(crate) fn create_in(&self, conn: &Connection, meta: &SoupMeta, doc: &Value) -> DbResult<Value> {
        let mut element = as_document(doc)?;
        let id = next_entry_id(conn, &meta.table_name)?;
        let now = now_millis();
        stamp(&mut element, id, now, now);

        let projected = project_all(meta, &element);
        let mut columns = vec!["id"];
        let mut values = vec![SqlValue::Integer(id)];
        if !meta.external_storage() {
            columns.push("soup");
            values.push(SqlValue::Text(serde_json::to_string(&element)?));
        }
        columns.push("created");
        values.push(SqlValue::Integer(now));
        columns.push("lastModified");
        values.push(SqlValue::Integer(now));
        for p in &projected {
            columns.push(&p.column);
            values.push(p.value.clone());
        }

        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{}", i)).collect();
        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} ({}) VALUES ({})",
            meta.table_name,
            columns.join(", "),
            placeholders.join(", ")
        ))?;
        stmt.execute(params_from_iter(values))?;

        self.write_fts_row(conn, meta, id, &projected)?;
        if meta.external_storage() {
            self.write_blob(&meta.table_name, id, &element)?;
        }
        Ok(element)
    }

    // ==================== Retrieve ====================

    /// Fetch entries in request order; ids that do not exist are skipped
    pub fn retrieve(&self, soup: &str, ids: &[i64]) -> DbResult<Vec<Value>> {
        let conn = self.conn.lock();
        let meta = self.catalog.require(&conn, soup)?;
        let column = if meta.external_storage() { "id" } else { "soup" };
        let mut stmt = conn.prepare_cached(&format!(
            "SELECT {} FROM {} WHERE id = ?1",
            column, meta.table_name
        ))?;

        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            if meta.external_storage() {
                let exists = stmt
                    .query_row(params![id], |row| row.get::<_, i64>(0))
                    .optional()?
                    .is_some();
                if exists {
                    if let Some(element) = self.read_blob(&meta.table_name, *id)? {
                        results.push(element);
                    }
                }
            } else if let Some(body) = stmt
                .query_row(params![id], |row| row.get::<_, String>(0))
                .optional()?
            {
                results.push(serde_json::from_str(&body)?);
            }
        }
        Ok(results)
    }

    // ==================== Update ====================

    /// Replace the document at `id`, keeping its creation date
    pub fn update(&self, soup: &str, id: i64, doc: &Value) -> DbResult<Value> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        let element = self.update_in(&sp, &meta, id, doc)?;
        sp.commit()?;
        Ok(element)
    }

    pub(crate) fn update_in(
        &self,
        conn: &Connection,
        meta: &SoupMeta,
        id: i64,
        doc: &Value,
    ) -> DbResult<Value> {
        let mut element = as_document(doc)?;
        let (created, previous) = conn
            .query_row(
                &format!(
                    "SELECT created, lastModified FROM {} WHERE id = ?1",
                    meta.table_name
                ),
                params![id],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?
            .ok_or_else(|| DbError::EntryNotFound(meta.name().to_string(), id))?;

        // strictly increasing even when two updates land in the same millisecond
        let last_modified = now_millis().max(previous + 1);
        stamp(&mut element, id, created, last_modified);

        let projected = project_all(meta, &element);
        self.write_row_columns(conn, meta, id, &element, last_modified, &projected)?;
        self.write_fts_row(conn, meta, id, &projected)?;
        if meta.external_storage() {
            self.write_blob(&meta.table_name, id, &element)?;
        }
        Ok(element)
    }

    fn write_row_columns(
        &self,
        conn: &Connection,
        meta: &SoupMeta,
        id: i64,
        element: &Value,
        last_modified: i64,
        projected: &[ProjectedColumn],
    ) -> DbResult<()> {
        let mut assignments = vec!["lastModified = ?1".to_string()];
        let mut values = vec![SqlValue::Integer(last_modified)];
        if !meta.external_storage() {
            values.push(SqlValue::Text(serde_json::to_string(element)?));
            assignments.push(format!("soup = ?{}", values.len()));
        }
        for p in projected {
            values.push(p.value.clone());
            assignments.push(format!("{} = ?{}", p.column, values.len()));
        }
        values.push(SqlValue::Integer(id));

        let mut stmt = conn.prepare_cached(&format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            meta.table_name,
            assignments.join(", "),
            values.len()
        ))?;
        stmt.execute(params_from_iter(values))?;
        Ok(())
    }

    // ==================== Upsert ====================

    /// Create or update.
    ///
    /// Without `external_id_path` (or with `_soupEntryId`) the presence of an
    /// entry id decides. Otherwise the document is matched on that indexed path:
    /// no match creates, one match updates, several matches fail.
    pub fn upsert(&self, soup: &str, doc: &Value, external_id_path: Option<&str>) -> DbResult<Value> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        let element = self.upsert_in(&sp, &meta, doc, external_id_path)?;
        sp.commit()?;
        Ok(element)
    }

    fn upsert_in(
        &self,
        conn: &Connection,
        meta: &SoupMeta,
        doc: &Value,
        external_id_path: Option<&str>,
    ) -> DbResult<Value> {
        let path = match external_id_path {
            None | Some(ENTRY_ID_PATH) => {
                return match entry_id_of(doc) {
                    Some(id) => self.update_in(conn, meta, id, doc),
                    None => self.create_in(conn, meta, doc),
                };
            }
            Some(path) => path,
        };

        let spec = meta
            .index_spec(path)
            .ok_or_else(|| DbError::FieldNotIndexed(path.to_string()))?;
        let value = project(doc, path);
        let is_empty = match &value {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(DbError::EmptyExternalId(path.to_string()));
        }

        let smart_sql = format!(
            "SELECT {{{0}:{1}}} FROM {{{0}}} WHERE {{{0}:{2}}} = ?",
            meta.name(),
            ENTRY_ID_PATH,
            path
        );
        let ids = self.select_ids(conn, &smart_sql, &[coerce(spec.index_type, &value)])?;

        match ids.as_slice() {
            [] => self.create_in(conn, meta, doc),
            [id] => self.update_in(conn, meta, *id, doc),
            _ => Err(DbError::ExternalIdNotUnique(path.to_string())),
        }
    }

    // ==================== Delete ====================

    /// Delete entries with their full-text rows and blob files
    pub fn delete(&self, soup: &str, ids: &[i64]) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        self.delete_in(&sp, &meta, ids)?;
        sp.commit()?;
        drop(conn);

        self.remove_blobs(&meta, ids)
    }

    /// Delete every entry matched by `spec`; returns how many were deleted
    pub fn delete_by_query(&self, spec: &QuerySpec) -> DbResult<usize> {
        let soup = spec
            .soup_name()
            .ok_or_else(|| DbError::InvalidQuery("delete by query needs a soup query".to_string()))?;
        let ids_sql = spec.ids_smart_sql().ok_or_else(|| {
            DbError::InvalidQuery("query has no id-only form".to_string())
        })?;

        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        let args = self.query_args(&sp, spec)?;
        let ids = self.select_ids(&sp, ids_sql, &args)?;
        self.delete_in(&sp, &meta, &ids)?;
        sp.commit()?;
        drop(conn);

        self.remove_blobs(&meta, &ids)?;
        Ok(ids.len())
    }

    fn delete_in(&self, conn: &Connection, meta: &SoupMeta, ids: &[i64]) -> DbResult<()> {
        let mut stmt =
            conn.prepare_cached(&format!("DELETE FROM {} WHERE id = ?1", meta.table_name))?;
        for id in ids {
            stmt.execute(params![id])?;
            self.delete_fts_row(conn, meta, *id)?;
        }
        Ok(())
    }

    fn remove_blobs(&self, meta: &SoupMeta, ids: &[i64]) -> DbResult<()> {
        if meta.external_storage() {
            for id in ids {
                self.remove_blob(&meta.table_name, *id)?;
            }
        }
        Ok(())
    }

    /// Remove every entry but keep the soup registered
    pub fn clear_soup(&self, soup: &str) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;
        sp.execute(&format!("DELETE FROM {}", meta.table_name), [])?;
        if meta.has_full_text() {
            sp.execute(&format!("DELETE FROM {}", meta.fts_table()), [])?;
        }
        sp.commit()?;
        drop(conn);

        if meta.external_storage() {
            self.remove_blob_dir(&meta.table_name)?;
        }
        tracing::debug!("Cleared soup '{}'", soup);
        Ok(())
    }
}

/// Next id for an AUTOINCREMENT table; ids of deleted entries are never reused
pub(crate) fn next_entry_id(conn: &Connection, table_name: &str) -> DbResult<i64> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            params![table_name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(seq.unwrap_or(0) + 1)
}
