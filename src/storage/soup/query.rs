use crate::error::{DbError, DbResult};
use crate::storage::catalog::Catalog;
use crate::storage::engine::SmartStore;
use crate::storage::index_spec::{coerce, to_sql_value, IndexType};
use crate::storage::query_spec::{QuerySpec, QueryType};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use smartsql_core::{
    BodyColumn, CompiledSql, PathTarget, SmartSqlCompiler, SmartSqlError, SmartSqlResult,
    SoupResolver, SoupTarget,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Resolves Smart SQL references through the catalog
struct CatalogResolver<'a> {
    catalog: &'a Catalog,
    conn: &'a Connection,
}

impl SoupResolver for CatalogResolver<'_> {
    fn resolve_soup(&self, soup: &str) -> SmartSqlResult<Option<SoupTarget>> {
        let meta = self
            .catalog
            .lookup(self.conn, soup)
            .map_err(|e| SmartSqlError::Resolver(e.to_string()))?;
        Ok(meta.map(|m| SoupTarget {
            table_name: m.table_name.clone(),
            external_storage: m.external_storage(),
        }))
    }

    fn resolve_path(&self, soup: &str, path: &str) -> SmartSqlResult<Option<PathTarget>> {
        let meta = self
            .catalog
            .lookup(self.conn, soup)
            .map_err(|e| SmartSqlError::Resolver(e.to_string()))?;
        Ok(meta.and_then(|m| {
            m.index_spec(path).and_then(|spec| match spec.index_type {
                IndexType::Json1 => Some(PathTarget::Extract(spec.path.clone())),
                _ => spec.column_name.clone().map(PathTarget::Column),
            })
        }))
    }
}

impl SmartStore {
    // ==================== Compilation ====================

    /// Compile Smart SQL into SQL against physical tables
    pub fn compile_smart_sql(&self, smart_sql: &str) -> DbResult<String> {
        let conn = self.conn.lock();
        Ok(self.compile_cached(&conn, smart_sql)?.sql.clone())
    }

    pub(crate) fn compile_cached(
        &self,
        conn: &Connection,
        smart_sql: &str,
    ) -> DbResult<Arc<CompiledSql>> {
        if let Some(compiled) = self.sql_cache.lock().get(smart_sql) {
            return Ok(compiled.clone());
        }

        let compiler = SmartSqlCompiler::new(CatalogResolver {
            catalog: &self.catalog,
            conn,
        });
        let compiled = Arc::new(compiler.compile(smart_sql)?);
        tracing::debug!("Compiled smart sql `{}` to `{}`", smart_sql, compiled.sql);
        self.sql_cache
            .lock()
            .put(smart_sql.to_string(), compiled.clone());
        Ok(compiled)
    }

    // ==================== Query ====================

    /// Run one page of a query.
    ///
    /// Rows are whole documents for non-smart specs without select paths and
    /// JSON arrays otherwise.
    pub fn query(&self, spec: &QuerySpec, page_index: usize) -> DbResult<Vec<Value>> {
        if spec.page_size() == 0 {
            return Err(DbError::InvalidQuery("page size must be positive".to_string()));
        }

        let conn = self.conn.lock();
        let compiled = self.compile_cached(&conn, spec.smart_sql())?;
        let args = self.query_args(&conn, spec)?;
        let sql = smartsql_core::page_sql(&compiled.sql, spec.page_size(), page_index)?;

        if self.capture_query_plan.load(Ordering::Relaxed) {
            self.capture_plan(&conn, &sql, &args)?;
        }

        let mut stmt = conn.prepare_cached(&sql)?;
        let column_count = stmt.column_count();
        let mut rows = stmt.query(params_from_iter(args.iter()))?;

        let mut results = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let cell = row.get_ref(i)?;
                let value = match compiled.body_column(i) {
                    Some(body) => self.body_value(&conn, body, cell)?,
                    None => cell_value(cell),
                };
                values.push(value);
            }
            if spec.returns_documents() {
                results.push(values.into_iter().next().unwrap_or(Value::Null));
            } else {
                results.push(Value::Array(values));
            }
        }
        Ok(results)
    }

    /// Total number of rows the query matches, across all pages
    pub fn count_query(&self, spec: &QuerySpec) -> DbResult<usize> {
        let conn = self.conn.lock();
        let compiled = self.compile_cached(&conn, spec.count_smart_sql())?;
        let args = self.query_args(&conn, spec)?;
        let count: i64 = conn.query_row(&compiled.sql, params_from_iter(args.iter()), |row| {
            row.get(0)
        })?;
        Ok(count.max(0) as usize)
    }

    /// Bound arguments for `spec`, coerced like the column they are compared with
    pub(crate) fn query_args(&self, conn: &Connection, spec: &QuerySpec) -> DbResult<Vec<SqlValue>> {
        let Some(soup) = spec.soup_name() else {
            return Ok(spec.args().iter().map(to_sql_value).collect());
        };
        let meta = self.catalog.require(conn, soup)?;

        if spec.query_type() == QueryType::Match {
            let key = spec.match_key().unwrap_or_default();
            let argument = self.match_argument(&meta, spec.path(), key)?;
            return Ok(vec![SqlValue::Text(argument)]);
        }

        let index_type = spec
            .path()
            .and_then(|path| meta.index_spec(path))
            .map(|s| s.index_type)
            .filter(|_| spec.query_type() != QueryType::Like);
        Ok(spec
            .args()
            .iter()
            .map(|arg| match index_type {
                Some(t) => coerce(t, arg),
                None => to_sql_value(arg),
            })
            .collect())
    }

    /// Entry ids returned by an id-only Smart SQL query
    pub(crate) fn select_ids(
        &self,
        conn: &Connection,
        smart_sql: &str,
        args: &[SqlValue],
    ) -> DbResult<Vec<i64>> {
        let compiled = self.compile_cached(conn, smart_sql)?;
        let mut stmt = conn.prepare_cached(&compiled.sql)?;
        let ids = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    /// Document held by a body column: inline JSON or an external blob
    fn body_value(
        &self,
        conn: &Connection,
        body: &BodyColumn,
        cell: ValueRef<'_>,
    ) -> DbResult<Value> {
        let ValueRef::Text(bytes) = cell else {
            // no matching row on the outer side of a join
            return Ok(cell_value(cell));
        };
        let text = String::from_utf8_lossy(bytes);
        if !body.external_storage {
            return Ok(serde_json::from_str(&text)?);
        }
        match body.external_entry_id(&text) {
            Some(id) => {
                let meta = self.catalog.require(conn, &body.soup)?;
                Ok(self.read_blob(&meta.table_name, id)?.unwrap_or(Value::Null))
            }
            None => Ok(Value::String(text.into_owned())),
        }
    }

    // ==================== Query Plans ====================

    /// Record `EXPLAIN QUERY PLAN` output for every subsequent query
    pub fn set_capture_explain_query_plan(&self, enabled: bool) {
        self.capture_query_plan.store(enabled, Ordering::Relaxed);
    }

    /// Plan details of the last query run while capture was enabled
    pub fn last_explain_query_plan(&self) -> Option<Vec<String>> {
        self.last_query_plan.lock().clone()
    }

    fn capture_plan(&self, conn: &Connection, sql: &str, args: &[SqlValue]) -> DbResult<()> {
        let mut stmt = conn.prepare(&format!("EXPLAIN QUERY PLAN {}", sql))?;
        let details = stmt
            .query_map(params_from_iter(args.iter()), |row| row.get::<_, String>(3))?
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("Query plan for `{}`: {:?}", sql, details);
        *self.last_query_plan.lock() = Some(details);
        Ok(())
    }
}

fn cell_value(cell: ValueRef<'_>) -> Value {
    match cell {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
    }
}
