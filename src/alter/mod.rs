//! Long-running soup operations
//!
//! Each operation persists its last completed step in `long_operations_status`
//! in the same transaction as the step's work, so an interrupted operation
//! resumes from that step the next time the store is opened.

pub mod alter_soup;

pub use alter_soup::{AlterSoupDetails, AlterSoupOperation, AlterSoupStep};

use crate::error::{DbError, DbResult};
use crate::storage::catalog::LONG_OPERATIONS_STATUS_TABLE;
use crate::storage::{IndexSpec, SmartStore, SoupSpec};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

/// Operation type stored for alter-soup records
pub const ALTER_SOUP_TYPE: &str = "AlterSoup";

/// A persisted, resumable operation
#[derive(Debug, Clone, PartialEq)]
pub enum LongOperation {
    AlterSoup(AlterSoupOperation),
}

impl LongOperation {
    pub fn soup_name(&self) -> &str {
        match self {
            LongOperation::AlterSoup(op) => &op.details().soup_name,
        }
    }

    pub fn operation_type(&self) -> &'static str {
        match self {
            LongOperation::AlterSoup(_) => ALTER_SOUP_TYPE,
        }
    }

    /// Last completed step, as persisted
    pub fn status(&self) -> &'static str {
        match self {
            LongOperation::AlterSoup(op) => op.last_step().as_str(),
        }
    }

    /// Continue from the last completed step to the end
    pub fn run(&mut self, store: &SmartStore) -> DbResult<()> {
        match self {
            LongOperation::AlterSoup(op) => op.run(store),
        }
    }

    fn from_record(record: LongOperationRecord) -> DbResult<Self> {
        match record.operation_type.as_str() {
            ALTER_SOUP_TYPE => {
                let details: AlterSoupDetails = serde_json::from_value(record.details)?;
                let last_step = AlterSoupStep::parse(&record.status)?;
                Ok(LongOperation::AlterSoup(AlterSoupOperation::from_parts(
                    details, last_step,
                )))
            }
            other => Err(DbError::Migration(format!(
                "unknown long operation type '{}' for soup '{}'",
                other, record.soup_name
            ))),
        }
    }
}

/// Raw row of `long_operations_status`
#[derive(Debug, Clone)]
pub struct LongOperationRecord {
    pub soup_name: String,
    pub operation_type: String,
    pub details: Value,
    pub status: String,
    pub created: i64,
    pub last_modified: i64,
}

// ==================== Persistence ====================

pub(crate) fn save_record(
    conn: &Connection,
    soup_name: &str,
    operation_type: &str,
    details: &Value,
    status: &str,
) -> DbResult<()> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        &format!(
            "INSERT INTO {} (soupName, type, details, status, created, lastModified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(soupName) DO UPDATE SET
                type = excluded.type,
                details = excluded.details,
                status = excluded.status,
                lastModified = excluded.lastModified",
            LONG_OPERATIONS_STATUS_TABLE
        ),
        params![
            soup_name,
            operation_type,
            serde_json::to_string(details)?,
            status,
            now
        ],
    )?;
    Ok(())
}

pub(crate) fn delete_record(conn: &Connection, soup_name: &str) -> DbResult<()> {
    conn.execute(
        &format!(
            "DELETE FROM {} WHERE soupName = ?1",
            LONG_OPERATIONS_STATUS_TABLE
        ),
        params![soup_name],
    )?;
    Ok(())
}

pub(crate) fn has_record(conn: &Connection, soup_name: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            &format!(
                "SELECT 1 FROM {} WHERE soupName = ?1",
                LONG_OPERATIONS_STATUS_TABLE
            ),
            params![soup_name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

pub(crate) fn load_records(conn: &Connection) -> DbResult<Vec<LongOperationRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT soupName, type, details, status, created, lastModified FROM {} ORDER BY created",
        LONG_OPERATIONS_STATUS_TABLE
    ))?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
                row.get::<_, i64>(5)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut records = Vec::with_capacity(rows.len());
    for (soup_name, operation_type, details, status, created, last_modified) in rows {
        records.push(LongOperationRecord {
            soup_name,
            operation_type,
            details: serde_json::from_str(&details)?,
            status,
            created,
            last_modified,
        });
    }
    Ok(records)
}

// ==================== Store API ====================

impl SmartStore {
    /// Operations that were started but not finished
    pub fn get_long_operations(&self) -> DbResult<Vec<LongOperation>> {
        let records = {
            let conn = self.conn.lock();
            load_records(&conn)?
        };
        records.into_iter().map(LongOperation::from_record).collect()
    }

    /// Resume every unfinished operation; returns how many completed.
    ///
    /// All operations are attempted even if one fails. A failed operation
    /// keeps its record at the last completed step.
    pub fn resume_long_operations(&self) -> DbResult<usize> {
        let mut completed = 0;
        let mut failures = Vec::new();
        for mut operation in self.get_long_operations()? {
            tracing::info!(
                "Resuming {} of soup '{}' after step {}",
                operation.operation_type(),
                operation.soup_name(),
                operation.status()
            );
            match operation.run(self) {
                Ok(()) => completed += 1,
                Err(e) => failures.push(e.to_string()),
            }
        }

        if failures.is_empty() {
            Ok(completed)
        } else {
            Err(DbError::Migration(failures.join("; ")))
        }
    }

    /// Change the index specs and/or storage features of a soup in place.
    ///
    /// `new_soup_spec` keeps the current features when `None`. With `re_index`
    /// every new index column is recomputed from the bodies; otherwise only
    /// paths present in both schemas carry values over.
    pub fn alter_soup(
        &self,
        soup: &str,
        new_index_specs: &[IndexSpec],
        new_soup_spec: Option<&SoupSpec>,
        re_index: bool,
    ) -> DbResult<()> {
        let mut operation = self.start_alter_soup(soup, new_index_specs, new_soup_spec, re_index)?;
        operation.run(self)
    }

    /// Persist a new alter-soup operation without running any step
    pub fn start_alter_soup(
        &self,
        soup: &str,
        new_index_specs: &[IndexSpec],
        new_soup_spec: Option<&SoupSpec>,
        re_index: bool,
    ) -> DbResult<AlterSoupOperation> {
        AlterSoupOperation::start(self, soup, new_index_specs, new_soup_spec, re_index)
    }
}
