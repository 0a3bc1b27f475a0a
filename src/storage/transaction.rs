use super::engine::SmartStore;
use crate::error::DbResult;
use parking_lot::MutexGuard;
use rusqlite::Connection;

/// Scoped transaction over a [`SmartStore`].
///
/// Backed by a named SQL savepoint, so scopes nest. Changes are kept only if
/// [`mark_successful`](Self::mark_successful) was called before the scope ends;
/// otherwise everything done inside the scope is rolled back, including blob
/// files written or removed for externally stored soups.
pub struct TransactionScope<'a> {
    store: &'a SmartStore,
    name: String,
    successful: bool,
    finished: bool,
}

impl<'a> TransactionScope<'a> {
    pub(crate) fn begin(store: &'a SmartStore, sequence: usize) -> DbResult<Self> {
        let name = format!("smartstore_tx_{}", sequence);
        store
            .conn
            .lock()
            .execute_batch(&format!("SAVEPOINT {}", name))?;
        store.blob_journal.lock().begin();
        tracing::debug!("Transaction {} started", name);
        Ok(Self {
            store,
            name,
            successful: false,
            finished: false,
        })
    }

    pub fn mark_successful(&mut self) {
        self.successful = true;
    }

    pub fn is_successful(&self) -> bool {
        self.successful
    }

    /// End the scope now, surfacing any error from commit or rollback
    pub fn end(mut self) -> DbResult<()> {
        self.finish()
    }

    fn finish(&mut self) -> DbResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let conn = self.store.conn.lock();
        if self.successful {
            let released = conn.execute_batch(&format!("RELEASE {}", self.name));
            match released {
                Ok(()) => {
                    self.store.blob_journal.lock().finish(true)?;
                    tracing::debug!("Transaction {} committed", self.name);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Failed to commit transaction {}: {}", self.name, e);
                    let rolled_back = self.rollback(conn);
                    return Err(rolled_back.err().unwrap_or_else(|| e.into()));
                }
            }
        }
        self.rollback(conn)?;
        tracing::debug!("Transaction {} rolled back", self.name);
        Ok(())
    }

    fn rollback(&self, conn: MutexGuard<'_, Connection>) -> DbResult<()> {
        let sql = conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0}", self.name));
        drop(conn);
        let files = self.store.blob_journal.lock().finish(false);
        // catalog rows may have been rolled back underneath the cache
        self.store.invalidate_all();
        sql?;
        files
    }
}

impl Drop for TransactionScope<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("Failed to end transaction {}: {}", self.name, e);
        }
    }
}
