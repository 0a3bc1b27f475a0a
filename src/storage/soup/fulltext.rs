use super::ProjectedColumn;
use crate::error::{DbError, DbResult};
use crate::storage::catalog::SoupMeta;
use crate::storage::engine::SmartStore;
use crate::storage::index_spec::IndexType;
use rusqlite::{params, params_from_iter, types::Value as SqlValue, Connection};

impl SmartStore {
    /// Create `<table>_fts` over the soup's full-text columns
    pub(crate) fn create_fts_table(&self, conn: &Connection, meta: &SoupMeta) -> DbResult<()> {
        let extension = meta.fts_extension.unwrap_or(self.config().fts_extension);
        let columns: Vec<&str> = meta
            .full_text_specs()
            .filter_map(|spec| spec.stored_column())
            .collect();
        conn.execute_batch(&format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING {}({})",
            meta.fts_table(),
            extension.as_str(),
            columns.join(", ")
        ))?;
        Ok(())
    }

    /// Mirror the full-text columns of entry `id`, replacing any previous row
    pub(crate) fn write_fts_row(
        &self,
        conn: &Connection,
        meta: &SoupMeta,
        id: i64,
        projected: &[ProjectedColumn],
    ) -> DbResult<()> {
        let full_text: Vec<&ProjectedColumn> = projected
            .iter()
            .filter(|p| p.index_type == IndexType::FullText)
            .collect();
        if full_text.is_empty() {
            return Ok(());
        }

        self.delete_fts_row(conn, meta, id)?;

        let columns: Vec<&str> = full_text.iter().map(|p| p.column.as_str()).collect();
        let placeholders: Vec<String> = (0..=columns.len()).map(|i| format!("?{}", i + 1)).collect();
        let mut values = vec![SqlValue::Integer(id)];
        values.extend(full_text.iter().map(|p| p.value.clone()));

        let mut stmt = conn.prepare_cached(&format!(
            "INSERT INTO {} (rowid, {}) VALUES ({})",
            meta.fts_table(),
            columns.join(", "),
            placeholders.join(", ")
        ))?;
        stmt.execute(params_from_iter(values))?;
        Ok(())
    }

    pub(crate) fn delete_fts_row(&self, conn: &Connection, meta: &SoupMeta, id: i64) -> DbResult<()> {
        if !meta.has_full_text() {
            return Ok(());
        }
        let mut stmt =
            conn.prepare_cached(&format!("DELETE FROM {} WHERE rowid = ?1", meta.fts_table()))?;
        stmt.execute(params![id])?;
        Ok(())
    }

    /// Argument for `<table>_fts MATCH ?`, scoped to one column when `path` is given
    pub(crate) fn match_argument(
        &self,
        meta: &SoupMeta,
        path: Option<&str>,
        match_key: &str,
    ) -> DbResult<String> {
        if !meta.has_full_text() {
            return Err(DbError::InvalidQuery(format!(
                "soup '{}' has no full-text index",
                meta.name()
            )));
        }
        let Some(path) = path else {
            return Ok(match_key.to_string());
        };

        let spec = meta
            .index_spec(path)
            .ok_or_else(|| DbError::FieldNotIndexed(path.to_string()))?;
        match (spec.index_type, spec.stored_column()) {
            (IndexType::FullText, Some(column)) => Ok(format!("{}:{}", column, match_key)),
            _ => Err(DbError::InvalidQuery(format!(
                "path '{}' is not a full-text index",
                path
            ))),
        }
    }
}
