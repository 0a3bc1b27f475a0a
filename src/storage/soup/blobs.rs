//! External body storage.
//!
//! Soups with the external storage feature keep each document body in
//! `<external dir>/<table>/soupelt_<id>` instead of in the row.
//!
//! While a transaction scope is open, files are never overwritten or deleted
//! in place: whatever sits at the target path is first moved aside and
//! recorded in the [`BlobJournal`], so a rolled-back scope can put it back.

use crate::error::{DbError, DbResult};
use crate::storage::engine::SmartStore;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const BLOB_FILE_PREFIX: &str = "soupelt_";

/// A path moved aside inside an open transaction scope
#[derive(Debug)]
struct StagedPath {
    original: PathBuf,
    /// Where the previous file or directory went; `None` when there was none
    backup: Option<PathBuf>,
}

/// Undo log for blob files, one frame per open transaction scope
#[derive(Debug, Default)]
pub(crate) struct BlobJournal {
    frames: Vec<Vec<StagedPath>>,
    next_backup: usize,
}

impl BlobJournal {
    pub(crate) fn begin(&mut self) {
        self.frames.push(Vec::new());
    }

    pub(crate) fn is_active(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Move whatever is at `path` aside. No-op outside a scope.
    fn stage(&mut self, path: &Path) -> DbResult<()> {
        let Some(frame) = self.frames.last_mut() else {
            return Ok(());
        };
        let backup = match std::fs::symlink_metadata(path) {
            Ok(_) => {
                self.next_backup += 1;
                let mut name = path.as_os_str().to_owned();
                name.push(format!(".staged{}", self.next_backup));
                let backup = PathBuf::from(name);
                std::fs::rename(path, &backup)?;
                Some(backup)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        frame.push(StagedPath {
            original: path.to_path_buf(),
            backup,
        });
        Ok(())
    }

    /// Close the innermost frame.
    ///
    /// A committed frame is folded into its parent, or has its backups
    /// discarded when it is the outermost one. A rolled-back frame restores
    /// every staged path, newest first.
    pub(crate) fn finish(&mut self, commit: bool) -> DbResult<()> {
        let Some(frame) = self.frames.pop() else {
            return Ok(());
        };

        let mut first_error = None;
        if commit {
            if let Some(parent) = self.frames.last_mut() {
                parent.extend(frame);
                return Ok(());
            }
            for backup in frame.into_iter().filter_map(|staged| staged.backup) {
                if let Err(e) = remove_path(&backup) {
                    tracing::warn!("Failed to discard {}: {}", backup.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        } else {
            for staged in frame.into_iter().rev() {
                let restored = remove_path(&staged.original).and_then(|()| match &staged.backup {
                    Some(backup) => std::fs::rename(backup, &staged.original),
                    None => Ok(()),
                });
                if let Err(e) = restored {
                    tracing::warn!("Failed to restore {}: {}", staged.original.display(), e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}

/// Remove a file or a whole directory; missing paths are fine
fn remove_path(path: &Path) -> std::io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl SmartStore {
    pub(crate) fn soup_blob_dir(&self, table_name: &str) -> DbResult<PathBuf> {
        self.external_storage_dir()
            .map(|dir| dir.join(table_name))
            .ok_or_else(|| {
                DbError::InvalidSoupSpec("no external storage directory configured".to_string())
            })
    }

    fn blob_path(&self, table_name: &str, id: i64) -> DbResult<PathBuf> {
        Ok(self
            .soup_blob_dir(table_name)?
            .join(format!("{}{}", BLOB_FILE_PREFIX, id)))
    }

    /// Write (or replace) the body of entry `id`. Creates the directory on demand.
    pub(crate) fn write_blob(&self, table_name: &str, id: i64, element: &Value) -> DbResult<()> {
        let dir = self.soup_blob_dir(table_name)?;
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{}{}", BLOB_FILE_PREFIX, id));
        let tmp = dir.join(format!("{}{}.tmp", BLOB_FILE_PREFIX, id));
        std::fs::write(&tmp, serde_json::to_vec(element)?)?;
        self.blob_journal.lock().stage(&path)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Body of entry `id`, `None` when the file (or its directory) is missing
    pub(crate) fn read_blob(&self, table_name: &str, id: i64) -> DbResult<Option<Value>> {
        let path = self.blob_path(table_name, id)?;
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn remove_blob(&self, table_name: &str, id: i64) -> DbResult<()> {
        let path = self.blob_path(table_name, id)?;
        let mut journal = self.blob_journal.lock();
        if journal.is_active() {
            return journal.stage(&path);
        }
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub(crate) fn remove_blob_dir(&self, table_name: &str) -> DbResult<()> {
        let dir = self.soup_blob_dir(table_name)?;
        let mut journal = self.blob_journal.lock();
        if journal.is_active() {
            return journal.stage(&dir);
        }
        match std::fs::remove_dir_all(&dir) {
            Ok(()) => {
                tracing::debug!("Removed external storage for {}", table_name);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Total bytes used by externally stored bodies; 0 when there are none
    pub fn external_storage_size(&self) -> u64 {
        let Some(dir) = self.external_storage_dir() else {
            return 0;
        };
        if !dir.exists() {
            return 0;
        }

        WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    tracing::warn!("Skipping unreadable external storage entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn read(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    #[test]
    fn test_stage_outside_scope_is_noop() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("soupelt_1");
        std::fs::write(&file, "a").unwrap();

        let mut journal = BlobJournal::default();
        assert!(!journal.is_active());
        journal.stage(&file).unwrap();
        assert_eq!(read(&file).as_deref(), Some("a"));
        journal.finish(false).unwrap();
    }

    #[test]
    fn test_rollback_restores_newest_first() {
        let tmp = TempDir::new().unwrap();
        let file = tmp.path().join("soupelt_1");
        std::fs::write(&file, "original").unwrap();

        let mut journal = BlobJournal::default();
        journal.begin();
        journal.stage(&file).unwrap();
        std::fs::write(&file, "first").unwrap();
        journal.stage(&file).unwrap();
        std::fs::write(&file, "second").unwrap();
        let created = tmp.path().join("soupelt_2");
        journal.stage(&created).unwrap();
        std::fs::write(&created, "new").unwrap();

        journal.finish(false).unwrap();
        assert_eq!(read(&file).as_deref(), Some("original"));
        assert!(!created.exists());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_commit_folds_into_parent_then_discards_backups() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("TABLE_1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("soupelt_1"), "a").unwrap();

        let mut journal = BlobJournal::default();
        journal.begin();
        journal.begin();
        journal.stage(&dir).unwrap();
        assert!(!dir.exists());
        journal.finish(true).unwrap();
        assert!(journal.is_active());

        // still undoable by the outer scope
        journal.finish(false).unwrap();
        assert!(!journal.is_active());
        assert_eq!(read(&dir.join("soupelt_1")).as_deref(), Some("a"));

        let mut journal = BlobJournal::default();
        journal.begin();
        journal.stage(&dir).unwrap();
        journal.finish(true).unwrap();
        assert!(!journal.is_active());
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 0);
    }
}
