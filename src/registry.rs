//! Keyed set of open stores
//!
//! Each key maps to `<root>/<key>.db`. Stores are opened lazily and shared
//! through `Arc`; `reset` closes the handle without touching the file,
//! `delete` also removes the database and its external storage.

use crate::config::StoreConfig;
use crate::error::{DbError, DbResult};
use crate::storage::index_spec::validate_soup_name;
use crate::storage::SmartStore;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct StoreRegistry {
    root: PathBuf,
    config: StoreConfig,
    stores: DashMap<String, Arc<SmartStore>>,
}

impl StoreRegistry {
    pub fn new<P: AsRef<Path>>(root: P, config: StoreConfig) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            config,
            stores: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Database file backing `key`
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.db", key))
    }

    /// Config for `key`; a shared external directory gets one subdirectory per key
    fn config_for(&self, key: &str) -> StoreConfig {
        let mut config = self.config.clone();
        if let Some(dir) = &self.config.external_storage_dir {
            config.external_storage_dir = Some(dir.join(key));
        }
        config
    }

    pub fn get_or_open(&self, key: &str) -> DbResult<Arc<SmartStore>> {
        validate_key(key)?;
        let entry = self.stores.entry(key.to_string()).or_try_insert_with(|| {
            tracing::debug!("Opening store '{}'", key);
            SmartStore::open(self.path_for(key), self.config_for(key)).map(Arc::new)
        })?;
        Ok(entry.value().clone())
    }

    /// Already-open store, if any
    pub fn get(&self, key: &str) -> Option<Arc<SmartStore>> {
        self.stores.get(key).map(|entry| entry.value().clone())
    }

    /// Forget the handle for `key`; returns whether one was open.
    /// The connection closes once the last `Arc` is dropped.
    pub fn reset(&self, key: &str) -> bool {
        match self.stores.remove(key) {
            Some((_, store)) => {
                store.invalidate_all();
                true
            }
            None => false,
        }
    }

    pub fn reset_all(&self) {
        for key in self.keys() {
            self.reset(&key);
        }
    }

    /// Close the handle for `key` and delete its files
    pub fn delete(&self, key: &str) -> DbResult<()> {
        validate_key(key)?;
        self.reset(key);
        SmartStore::delete_database(self.path_for(key), &self.config_for(key))
    }

    /// Keys of open stores, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.stores.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }
}

fn validate_key(key: &str) -> DbResult<()> {
    if key.contains('/') || key.contains('\\') || key == "." || key == ".." {
        return Err(DbError::ConfigError(format!("invalid store key '{}'", key)));
    }
    validate_soup_name(key).map_err(|_| DbError::ConfigError(format!("invalid store key '{}'", key)))
}
