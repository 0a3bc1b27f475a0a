use lru::LruCache;
use parking_lot::Mutex;
use rusqlite::Connection;
use smartsql_core::CompiledSql;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::catalog::{Catalog, SoupMeta, LONG_OPERATIONS_STATUS_TABLE};
use super::index_spec::{validate_index_specs, IndexSpec};
use super::soup::blobs::BlobJournal;
use super::soup_spec::SoupSpec;
use super::transaction::TransactionScope;
use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};

/// Companion files SQLite may leave next to a database
const DB_FILE_SUFFIXES: &[&str] = &["", "-wal", "-shm", "-journal"];

/// The document store: one SQLite connection, its catalog and its blob directory
pub struct SmartStore {
    pub(crate) conn: Mutex<Connection>,
    /// Database file, `None` for in-memory stores
    path: Option<PathBuf>,
    /// Root of externally stored bodies
    external_dir: Option<PathBuf>,
    config: StoreConfig,
    pub(crate) catalog: Catalog,
    /// Compiled Smart SQL keyed by source text
    pub(crate) sql_cache: Mutex<LruCache<String, Arc<CompiledSql>>>,
    pub(crate) capture_query_plan: AtomicBool,
    pub(crate) last_query_plan: Mutex<Option<Vec<String>>>,
    /// Blob files moved aside by open transaction scopes
    pub(crate) blob_journal: Mutex<BlobJournal>,
    transaction_counter: AtomicUsize,
}

impl std::fmt::Debug for SmartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartStore")
            .field("path", &self.path)
            .field("external_dir", &self.external_dir)
            .finish()
    }
}

impl SmartStore {
    /// Open or create a store at the given database path
    pub fn open<P: AsRef<Path>>(path: P, config: StoreConfig) -> DbResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        Self::with_connection(conn, Some(path), config)
    }

    /// Open a transient store. External storage is only available when the
    /// config names a directory.
    pub fn open_in_memory(config: StoreConfig) -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, None, config)
    }

    fn with_connection(
        conn: Connection,
        path: Option<PathBuf>,
        config: StoreConfig,
    ) -> DbResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        Catalog::init_schema(&conn)?;

        let external_dir = config.external_dir_for(path.as_deref());
        let cache_size = NonZeroUsize::new(config.sql_cache_size).unwrap_or(NonZeroUsize::MIN);

        let store = Self {
            conn: Mutex::new(conn),
            path,
            external_dir,
            capture_query_plan: AtomicBool::new(config.capture_explain_query_plan),
            config,
            catalog: Catalog::new(),
            sql_cache: Mutex::new(LruCache::new(cache_size)),
            last_query_plan: Mutex::new(None),
            blob_journal: Mutex::new(BlobJournal::default()),
            transaction_counter: AtomicUsize::new(0),
        };

        tracing::info!(
            "Opened smart store at {}",
            store
                .path
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string())
        );

        if store.config.resume_long_operations_on_open {
            match store.resume_long_operations() {
                Ok(0) => {}
                Ok(n) => tracing::info!("Resumed {} pending long operation(s)", n),
                Err(e) => tracing::warn!("Failed to resume long operations: {}", e),
            }
        }

        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn external_storage_dir(&self) -> Option<&Path> {
        self.external_dir.as_deref()
    }

    // ==================== Catalog ====================

    /// Best effort; never fails
    pub fn has_soup(&self, name: &str) -> bool {
        let conn = self.conn.lock();
        self.catalog.has_soup(&conn, name)
    }

    pub fn get_soup_index_specs(&self, name: &str) -> DbResult<Vec<IndexSpec>> {
        let conn = self.conn.lock();
        self.catalog.index_specs_for(&conn, name)
    }

    pub fn get_soup_spec(&self, name: &str) -> DbResult<SoupSpec> {
        let conn = self.conn.lock();
        self.catalog.soup_spec_for(&conn, name)
    }

    /// Physical table backing `name`, if registered
    pub fn get_soup_table_name(&self, name: &str) -> DbResult<Option<String>> {
        let conn = self.conn.lock();
        self.catalog.table_for(&conn, name)
    }

    pub fn get_all_soup_names(&self) -> DbResult<Vec<String>> {
        let conn = self.conn.lock();
        Catalog::soup_names(&conn)
    }

    pub fn register_soup(&self, name: &str, index_specs: &[IndexSpec]) -> DbResult<()> {
        self.register_soup_with_spec(&SoupSpec::new(name), index_specs)
    }

    /// Register a soup. Registering a name that already exists is a no-op.
    pub fn register_soup_with_spec(
        &self,
        soup_spec: &SoupSpec,
        index_specs: &[IndexSpec],
    ) -> DbResult<()> {
        validate_index_specs(index_specs)?;
        soup_spec.validate_with(index_specs)?;
        if soup_spec.uses_external_storage() && self.external_dir.is_none() {
            return Err(DbError::InvalidSoupSpec(format!(
                "soup '{}': external storage needs a database file or an external storage directory",
                soup_spec.name
            )));
        }

        let mut conn = self.conn.lock();
        if self.catalog.lookup(&conn, &soup_spec.name)?.is_some() {
            tracing::debug!("Soup '{}' already registered", soup_spec.name);
            return Ok(());
        }

        let sp = conn.savepoint()?;
        let result = self
            .register_in(&sp, soup_spec, index_specs)
            .and_then(|meta| {
                sp.commit()?;
                Ok(meta)
            });
        let meta = match result {
            Ok(meta) => meta,
            Err(e) => {
                self.catalog.invalidate(&soup_spec.name);
                return Err(e);
            }
        };
        drop(conn);

        self.sql_cache.lock().clear();
        if meta.external_storage() {
            std::fs::create_dir_all(self.soup_blob_dir(&meta.table_name)?)?;
        }
        tracing::info!(
            "Registered soup '{}' as {} with {} index(es)",
            meta.name(),
            meta.table_name,
            meta.index_specs.len()
        );
        Ok(())
    }

    fn register_in(
        &self,
        conn: &Connection,
        soup_spec: &SoupSpec,
        index_specs: &[IndexSpec],
    ) -> DbResult<SoupMeta> {
        let id = self.catalog.allocate(conn, soup_spec)?;
        let bare: Vec<IndexSpec> = index_specs.iter().map(IndexSpec::without_column).collect();
        let meta = SoupMeta::assemble(id, soup_spec.clone(), &bare, self.config.fts_extension);
        self.create_soup_schema(conn, &meta)?;
        self.catalog.register_mapping(conn, &meta)?;
        Ok(meta)
    }

    /// Create the soup table, its indexes and its full-text table if missing
    pub(crate) fn create_soup_schema(&self, conn: &Connection, meta: &SoupMeta) -> DbResult<()> {
        let mut columns = vec!["id INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
        if !meta.external_storage() {
            columns.push("soup TEXT".to_string());
        }
        columns.push("created INTEGER".to_string());
        columns.push("lastModified INTEGER".to_string());
        for spec in meta.stored_specs() {
            if let Some(column) = spec.stored_column() {
                columns.push(format!("{} {}", column, spec.index_type.sql_type()));
            }
        }

        let mut ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({});\n",
            meta.table_name,
            columns.join(", ")
        );
        for (ordinal, spec) in meta.index_specs.iter().enumerate() {
            if let Some(column) = spec.column_name.as_deref() {
                ddl.push_str(&format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ( {} );\n",
                    meta.index_name(ordinal),
                    meta.table_name,
                    column
                ));
            }
        }
        for column in ["created", "lastModified"] {
            ddl.push_str(&format!(
                "CREATE INDEX IF NOT EXISTS {0}_{1}_idx ON {0} ( {1} );\n",
                meta.table_name, column
            ));
        }
        conn.execute_batch(&ddl)?;

        if meta.has_full_text() {
            self.create_fts_table(conn, meta)?;
        }
        Ok(())
    }

    /// Drop a soup with its table, full-text table, blobs and catalog rows
    pub fn drop_soup(&self, name: &str) -> DbResult<()> {
        let mut conn = self.conn.lock();
        let meta = self.catalog.require(&conn, name)?;

        let sp = conn.savepoint()?;
        sp.execute_batch(&format!(
            "DROP TABLE IF EXISTS {0};
             DROP TABLE IF EXISTS {0}_fts;
             DROP TABLE IF EXISTS {0}_old;
             DROP TABLE IF EXISTS {0}_fts_old;",
            meta.table_name
        ))?;
        sp.execute(
            &format!(
                "DELETE FROM {} WHERE soupName = ?1",
                LONG_OPERATIONS_STATUS_TABLE
            ),
            [name],
        )?;
        self.catalog.drop_mapping(&sp, name)?;
        sp.commit()?;
        drop(conn);

        self.sql_cache.lock().clear();
        if self.external_dir.is_some() {
            self.remove_blob_dir(&meta.table_name)?;
        }
        tracing::info!("Dropped soup '{}' ({})", name, meta.table_name);
        Ok(())
    }

    pub fn drop_all_soups(&self) -> DbResult<()> {
        for name in self.get_all_soup_names()? {
            self.drop_soup(&name)?;
        }
        Ok(())
    }

    // ==================== Transactions ====================

    /// Start a scoped transaction; see [`TransactionScope`]
    pub fn begin_transaction(&self) -> DbResult<TransactionScope<'_>> {
        let sequence = self.transaction_counter.fetch_add(1, Ordering::SeqCst);
        TransactionScope::begin(self, sequence)
    }

    // ==================== Cache Invalidation ====================

    pub(crate) fn invalidate_soup(&self, name: &str) {
        self.catalog.invalidate(name);
        self.sql_cache.lock().clear();
    }

    pub(crate) fn invalidate_all(&self) {
        self.catalog.clear();
        self.sql_cache.lock().clear();
    }

    // ==================== Sizes ====================

    /// Size of the database file in bytes; 0 when it does not exist
    pub fn database_size(&self) -> u64 {
        match &self.path {
            Some(path) => std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
            None => {
                let conn = self.conn.lock();
                conn.query_row(
                    "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                    [],
                    |row| row.get::<_, i64>(0),
                )
                .map(|size| size.max(0) as u64)
                .unwrap_or(0)
            }
        }
    }

    // ==================== Lifecycle ====================

    /// Close the connection and drop cached metadata
    pub fn close(self) -> DbResult<()> {
        self.invalidate_all();
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| e.into())
    }

    /// Delete a database file, its SQLite companions and its external storage
    pub fn delete_database<P: AsRef<Path>>(path: P, config: &StoreConfig) -> DbResult<()> {
        let path = path.as_ref();
        for suffix in DB_FILE_SUFFIXES {
            let mut file = path.as_os_str().to_owned();
            file.push(suffix);
            match std::fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if let Some(dir) = config.external_dir_for(Some(path)) {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        tracing::info!("Deleted database {}", path.display());
        Ok(())
    }
}
