use super::project_columns;
use crate::error::{DbError, DbResult};
use crate::storage::catalog::SoupMeta;
use crate::storage::engine::SmartStore;
use crate::storage::index_spec::{IndexSpec, IndexType};
use rusqlite::{params_from_iter, types::Value as SqlValue, Connection};
use serde_json::Value;

impl SmartStore {
    /// Recompute the index columns of `paths` from each stored body.
    ///
    /// With `include_generated`, the expression indexes of `Json1` paths in
    /// `paths` are dropped and rebuilt as well.
    pub fn re_index_soup(&self, soup: &str, paths: &[&str], include_generated: bool) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let sp = conn.savepoint()?;
        let meta = self.catalog.require(&sp, soup)?;

        let mut specs = Vec::with_capacity(paths.len());
        for path in paths {
            let spec = meta
                .index_spec(path)
                .ok_or_else(|| DbError::FieldNotIndexed(path.to_string()))?;
            specs.push(spec.clone());
        }

        if include_generated {
            for spec in specs.iter().filter(|s| s.index_type == IndexType::Json1) {
                let (Some(ordinal), Some(expression)) =
                    (meta.ordinal_of(&spec.path), spec.column_name.as_deref())
                else {
                    continue;
                };
                let index_name = meta.index_name(ordinal);
                sp.execute_batch(&format!(
                    "DROP INDEX IF EXISTS {0}; CREATE INDEX {0} ON {1} ( {2} );",
                    index_name, meta.table_name, expression
                ))?;
            }
        }

        let count = self.reindex_rows(&sp, &meta, &specs)?;
        sp.commit()?;
        tracing::info!(
            "Re-indexed {} entries of soup '{}' for {:?}",
            count,
            soup,
            paths
        );
        Ok(())
    }

    /// Rewrite the stored columns of `specs` for every row; returns rows touched
    pub(crate) fn reindex_rows(
        &self,
        conn: &Connection,
        meta: &SoupMeta,
        specs: &[IndexSpec],
    ) -> DbResult<usize> {
        let stored: Vec<&IndexSpec> = specs.iter().filter(|s| s.index_type.is_stored()).collect();
        if stored.is_empty() {
            return Ok(0);
        }
        let touches_full_text = stored.iter().any(|s| s.index_type == IndexType::FullText);

        let bodies = self.load_bodies(conn, meta)?;
        for (id, body) in &bodies {
            let projected = project_columns(stored.iter().copied(), body);
            let assignments: Vec<String> = projected
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{} = ?{}", p.column, i + 1))
                .collect();
            let mut values: Vec<SqlValue> = projected.iter().map(|p| p.value.clone()).collect();
            values.push(SqlValue::Integer(*id));

            let mut stmt = conn.prepare_cached(&format!(
                "UPDATE {} SET {} WHERE id = ?{}",
                meta.table_name,
                assignments.join(", "),
                values.len()
            ))?;
            stmt.execute(params_from_iter(values))?;

            if touches_full_text {
                let full_text = project_columns(meta.full_text_specs(), body);
                self.write_fts_row(conn, meta, *id, &full_text)?;
            }
        }
        Ok(bodies.len())
    }

    /// Every `(id, body)` of a soup, in id order
    pub(crate) fn load_bodies(&self, conn: &Connection, meta: &SoupMeta) -> DbResult<Vec<(i64, Value)>> {
        if meta.external_storage() {
            let mut stmt = conn.prepare(&format!("SELECT id FROM {} ORDER BY id", meta.table_name))?;
            let ids = stmt
                .query_map([], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, _>>()?;
            let mut bodies = Vec::with_capacity(ids.len());
            for id in ids {
                match self.read_blob(&meta.table_name, id)? {
                    Some(body) => bodies.push((id, body)),
                    None => tracing::warn!(
                        "Missing external body for entry {} of soup '{}'",
                        id,
                        meta.name()
                    ),
                }
            }
            return Ok(bodies);
        }

        let mut stmt = conn.prepare(&format!(
            "SELECT id, soup FROM {} ORDER BY id",
            meta.table_name
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let mut bodies = Vec::with_capacity(rows.len());
        for (id, text) in rows {
            bodies.push((id, serde_json::from_str(&text)?));
        }
        Ok(bodies)
    }
}
