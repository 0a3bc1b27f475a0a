//! Alter-soup migration
//!
//! Rebuilds a soup under its existing table name with new index specs or
//! storage features. Steps run in order and each one commits together with
//! its status row:
//!
//! STARTING -> RENAME_OLD_TABLE -> DROP_OLD_INDEXES
//!   -> REGISTER_NEW_SOUP_UNDER_OLD_TABLE_NAME -> COPY_ROWS -> RE_INDEX
//!   -> DROP_OLD_TABLE -> DONE

use super::{delete_record, has_record, save_record, ALTER_SOUP_TYPE};
use crate::error::{DbError, DbResult};
use crate::storage::index_spec::{coerce, project, validate_index_specs};
use crate::storage::soup::ProjectedColumn;
use crate::storage::{FtsExtension, IndexSpec, IndexType, SmartStore, SoupMeta, SoupSpec};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlterSoupStep {
    Starting,
    RenameOldTable,
    DropOldIndexes,
    RegisterNewSoupUnderOldTableName,
    CopyRows,
    ReIndex,
    DropOldTable,
    Done,
}

impl AlterSoupStep {
    pub const ALL: [AlterSoupStep; 8] = [
        AlterSoupStep::Starting,
        AlterSoupStep::RenameOldTable,
        AlterSoupStep::DropOldIndexes,
        AlterSoupStep::RegisterNewSoupUnderOldTableName,
        AlterSoupStep::CopyRows,
        AlterSoupStep::ReIndex,
        AlterSoupStep::DropOldTable,
        AlterSoupStep::Done,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlterSoupStep::Starting => "STARTING",
            AlterSoupStep::RenameOldTable => "RENAME_OLD_TABLE",
            AlterSoupStep::DropOldIndexes => "DROP_OLD_INDEXES",
            AlterSoupStep::RegisterNewSoupUnderOldTableName => {
                "REGISTER_NEW_SOUP_UNDER_OLD_TABLE_NAME"
            }
            AlterSoupStep::CopyRows => "COPY_ROWS",
            AlterSoupStep::ReIndex => "RE_INDEX",
            AlterSoupStep::DropOldTable => "DROP_OLD_TABLE",
            AlterSoupStep::Done => "DONE",
        }
    }

    pub fn parse(name: &str) -> DbResult<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|step| step.as_str() == name)
            .ok_or_else(|| DbError::Migration(format!("unknown alter soup step '{}'", name)))
    }

    pub fn next(&self) -> Option<Self> {
        let position = Self::ALL.iter().position(|step| step == self)?;
        Self::ALL.get(position + 1).copied()
    }
}

/// Everything needed to resume the migration, persisted as the record details
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlterSoupDetails {
    pub soup_name: String,
    pub soup_id: i64,
    pub table_name: String,
    /// Registered specs, with their column names
    pub old_index_specs: Vec<IndexSpec>,
    pub new_index_specs: Vec<IndexSpec>,
    pub old_soup_spec: SoupSpec,
    pub new_soup_spec: SoupSpec,
    #[serde(default)]
    pub old_fts_extension: Option<FtsExtension>,
    pub new_fts_extension: FtsExtension,
    pub re_index: bool,
}

impl AlterSoupDetails {
    fn old_table(&self) -> String {
        format!("{}_old", self.table_name)
    }

    fn old_fts_table(&self) -> String {
        format!("{}_fts_old", self.table_name)
    }

    fn new_meta(&self) -> SoupMeta {
        SoupMeta::assemble(
            self.soup_id,
            self.new_soup_spec.clone(),
            &self.new_index_specs,
            self.new_fts_extension,
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlterSoupOperation {
    details: AlterSoupDetails,
    last_step: AlterSoupStep,
}

struct OldRow {
    id: i64,
    created: i64,
    last_modified: i64,
    body: Option<Value>,
    columns: HashMap<String, SqlValue>,
}

impl AlterSoupOperation {
    pub(crate) fn from_parts(details: AlterSoupDetails, last_step: AlterSoupStep) -> Self {
        Self { details, last_step }
    }

    pub fn details(&self) -> &AlterSoupDetails {
        &self.details
    }

    pub fn last_step(&self) -> AlterSoupStep {
        self.last_step
    }

    pub fn is_done(&self) -> bool {
        self.last_step == AlterSoupStep::Done
    }

    /// Validate the request and persist it at STARTING
    pub(crate) fn start(
        store: &SmartStore,
        soup: &str,
        new_index_specs: &[IndexSpec],
        new_soup_spec: Option<&SoupSpec>,
        re_index: bool,
    ) -> DbResult<Self> {
        validate_index_specs(new_index_specs)?;

        let conn = store.conn.lock();
        let meta = store.catalog.require(&conn, soup)?;

        let new_soup_spec = match new_soup_spec {
            Some(spec) => spec.clone(),
            None => meta.spec.clone(),
        };
        if new_soup_spec.name != soup {
            return Err(DbError::InvalidSoupSpec(format!(
                "cannot rename soup '{}' to '{}'",
                soup, new_soup_spec.name
            )));
        }
        new_soup_spec.validate_with(new_index_specs)?;
        if new_soup_spec.uses_external_storage() && store.external_storage_dir().is_none() {
            return Err(DbError::InvalidSoupSpec(format!(
                "soup '{}' uses external storage but the store has no external storage directory",
                soup
            )));
        }
        if has_record(&conn, soup)? {
            return Err(DbError::Migration(format!(
                "soup '{}' already has an operation in progress",
                soup
            )));
        }

        let details = AlterSoupDetails {
            soup_name: soup.to_string(),
            soup_id: meta.id,
            table_name: meta.table_name.clone(),
            old_index_specs: meta.index_specs.clone(),
            new_index_specs: new_index_specs.iter().map(IndexSpec::without_column).collect(),
            old_soup_spec: meta.spec.clone(),
            new_soup_spec,
            old_fts_extension: meta.fts_extension,
            new_fts_extension: store.config().fts_extension,
            re_index,
        };
        save_record(
            &conn,
            soup,
            ALTER_SOUP_TYPE,
            &serde_json::to_value(&details)?,
            AlterSoupStep::Starting.as_str(),
        )?;
        tracing::info!(
            "ALTER_SOUP: started for soup '{}' ({} -> {} index specs)",
            soup,
            details.old_index_specs.len(),
            details.new_index_specs.len()
        );

        Ok(Self {
            details,
            last_step: AlterSoupStep::Starting,
        })
    }

    /// Run every remaining step
    pub fn run(&mut self, store: &SmartStore) -> DbResult<()> {
        self.run_to(store, AlterSoupStep::Done)?;
        tracing::info!("ALTER_SOUP: soup '{}' migrated", self.details.soup_name);
        Ok(())
    }

    /// Run steps until `target` has completed
    pub fn run_to(&mut self, store: &SmartStore, target: AlterSoupStep) -> DbResult<()> {
        while self.last_step < target {
            let step = self.last_step.next().ok_or_else(|| {
                DbError::Migration(format!(
                    "no step after {} for soup '{}'",
                    self.last_step.as_str(),
                    self.details.soup_name
                ))
            })?;
            self.execute_step(store, step)?;
        }
        Ok(())
    }

    fn execute_step(&mut self, store: &SmartStore, step: AlterSoupStep) -> DbResult<()> {
        let soup = self.details.soup_name.clone();
        tracing::debug!("ALTER_SOUP: soup '{}' running {}", soup, step.as_str());

        let mut conn = store.conn.lock();
        let sp = conn.savepoint()?;
        let result = self.perform(store, &sp, step).and_then(|_| {
            if step == AlterSoupStep::Done {
                delete_record(&sp, &soup)
            } else {
                save_record(
                    &sp,
                    &soup,
                    ALTER_SOUP_TYPE,
                    &serde_json::to_value(&self.details)?,
                    step.as_str(),
                )
            }
        });
        let result = result.and_then(|_| sp.commit().map_err(DbError::from));
        drop(conn);
        store.invalidate_soup(&soup);

        match result {
            Ok(()) => {
                self.last_step = step;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(
                    "ALTER_SOUP: soup '{}' failed at {}: {}",
                    soup,
                    step.as_str(),
                    e
                );
                Err(DbError::Migration(format!(
                    "alter soup '{}' failed at {}: {}",
                    soup,
                    step.as_str(),
                    e
                )))
            }
        }
    }

    fn perform(&self, store: &SmartStore, conn: &Connection, step: AlterSoupStep) -> DbResult<()> {
        match step {
            AlterSoupStep::Starting | AlterSoupStep::Done => Ok(()),
            AlterSoupStep::RenameOldTable => self.rename_old_table(conn),
            AlterSoupStep::DropOldIndexes => self.drop_old_indexes(conn),
            AlterSoupStep::RegisterNewSoupUnderOldTableName => self.register_new_soup(store, conn),
            AlterSoupStep::CopyRows => self.copy_rows(store, conn),
            AlterSoupStep::ReIndex => self.re_index(store, conn),
            AlterSoupStep::DropOldTable => self.drop_old_table(store, conn),
        }
    }

    // ==================== Steps ====================

    fn rename_old_table(&self, conn: &Connection) -> DbResult<()> {
        let d = &self.details;
        let fts_table = format!("{}_fts", d.table_name);
        for (from, to) in [
            (d.table_name.clone(), d.old_table()),
            (fts_table, d.old_fts_table()),
        ] {
            if table_exists(conn, &from)? && !table_exists(conn, &to)? {
                conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {}", from, to))?;
            }
        }
        Ok(())
    }

    fn drop_old_indexes(&self, conn: &Connection) -> DbResult<()> {
        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 AND sql IS NOT NULL",
        )?;
        let names = stmt
            .query_map(params![self.details.old_table()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        for name in names {
            conn.execute_batch(&format!("DROP INDEX IF EXISTS {}", name))?;
        }
        Ok(())
    }

    fn register_new_soup(&self, store: &SmartStore, conn: &Connection) -> DbResult<()> {
        let meta = self.details.new_meta();
        store.create_soup_schema(conn, &meta)?;
        store.catalog.register_mapping(conn, &meta)?;
        Ok(())
    }

    fn copy_rows(&self, store: &SmartStore, conn: &Connection) -> DbResult<()> {
        let d = &self.details;
        let meta = d.new_meta();
        let old_external = d.old_soup_spec.uses_external_storage();
        let new_external = meta.external_storage();

        conn.execute_batch(&format!("DELETE FROM {}", meta.table_name))?;
        if meta.has_full_text() {
            conn.execute_batch(&format!("DELETE FROM {}", meta.fts_table()))?;
        }

        let rows = self.read_old_rows(store, conn)?;
        let stored: Vec<&IndexSpec> = meta.stored_specs().collect();

        let mut columns = vec!["id".to_string()];
        if !new_external {
            columns.push("soup".to_string());
        }
        columns.push("created".to_string());
        columns.push("lastModified".to_string());
        columns.extend(stored.iter().filter_map(|s| s.stored_column()).map(String::from));
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let insert = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            meta.table_name,
            columns.join(", "),
            placeholders.join(", ")
        );

        let mut copied = 0usize;
        for row in rows {
            if row.body.is_none() && !(old_external && new_external) {
                tracing::warn!(
                    "ALTER_SOUP: skipping entry {} of soup '{}' without a body",
                    row.id,
                    d.soup_name
                );
                continue;
            }

            let projected: Vec<ProjectedColumn> = stored
                .iter()
                .filter_map(|spec| {
                    let column = spec.stored_column()?.to_string();
                    Some(ProjectedColumn {
                        column,
                        index_type: spec.index_type,
                        value: self.carried_value(spec, &row),
                    })
                })
                .collect();

            let mut values = vec![SqlValue::Integer(row.id)];
            if !new_external {
                let text = match &row.body {
                    Some(body) => serde_json::to_string(body)?,
                    None => continue,
                };
                values.push(SqlValue::Text(text));
            }
            values.push(SqlValue::Integer(row.created));
            values.push(SqlValue::Integer(row.last_modified));
            values.extend(projected.iter().map(|p| p.value.clone()));
            conn.prepare_cached(&insert)?
                .execute(params_from_iter(values))?;

            if new_external && !old_external {
                if let Some(body) = &row.body {
                    store.write_blob(&meta.table_name, row.id, body)?;
                }
            }
            if meta.has_full_text() {
                store.write_fts_row(conn, &meta, row.id, &projected)?;
            }
            copied += 1;
        }

        carry_sequence(conn, &d.old_table(), &meta.table_name)?;
        tracing::info!(
            "ALTER_SOUP: copied {} entries of soup '{}'",
            copied,
            d.soup_name
        );
        Ok(())
    }

    fn re_index(&self, store: &SmartStore, conn: &Connection) -> DbResult<()> {
        if !self.details.re_index {
            return Ok(());
        }
        let meta = self.details.new_meta();
        let count = store.reindex_rows(conn, &meta, &meta.index_specs)?;
        tracing::info!(
            "ALTER_SOUP: re-indexed {} entries of soup '{}'",
            count,
            self.details.soup_name
        );
        Ok(())
    }

    fn drop_old_table(&self, store: &SmartStore, conn: &Connection) -> DbResult<()> {
        let d = &self.details;
        conn.execute_batch(&format!(
            "DROP TABLE IF EXISTS {};\nDROP TABLE IF EXISTS {};",
            d.old_table(),
            d.old_fts_table()
        ))?;
        if d.old_soup_spec.uses_external_storage() && !d.new_soup_spec.uses_external_storage() {
            store.remove_blob_dir(&d.table_name)?;
        }
        Ok(())
    }

    // ==================== Helpers ====================

    fn read_old_rows(&self, store: &SmartStore, conn: &Connection) -> DbResult<Vec<OldRow>> {
        let d = &self.details;
        let old_external = d.old_soup_spec.uses_external_storage();
        let old_stored: Vec<(&str, &str)> = d
            .old_index_specs
            .iter()
            .filter_map(|s| s.stored_column().map(|c| (s.path.as_str(), c)))
            .collect();

        let mut columns = vec!["id", "created", "lastModified"];
        if !old_external {
            columns.push("soup");
        }
        columns.extend(old_stored.iter().map(|(_, column)| *column));
        let first_index_column = columns.len() - old_stored.len();

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} ORDER BY id",
            columns.join(", "),
            d.old_table()
        ))?;
        let raw = stmt
            .query_map([], |row| {
                let mut indexed = HashMap::with_capacity(old_stored.len());
                for (offset, (path, _)) in old_stored.iter().enumerate() {
                    indexed.insert(
                        path.to_string(),
                        row.get::<_, SqlValue>(first_index_column + offset)?,
                    );
                }
                let text = if old_external {
                    None
                } else {
                    row.get::<_, Option<String>>(3)?
                };
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Option<i64>>(1)?.unwrap_or_default(),
                    row.get::<_, Option<i64>>(2)?.unwrap_or_default(),
                    text,
                    indexed,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, created, last_modified, text, columns) in raw {
            let body = if old_external {
                store.read_blob(&d.table_name, id)?
            } else {
                text.map(|t| serde_json::from_str::<Value>(&t)).transpose()?
            };
            rows.push(OldRow {
                id,
                created,
                last_modified,
                body,
                columns,
            });
        }
        Ok(rows)
    }

    /// Value for a new stored column: the old column when path and type
    /// match, otherwise projected from the body
    fn carried_value(&self, spec: &IndexSpec, row: &OldRow) -> SqlValue {
        let old = self
            .details
            .old_index_specs
            .iter()
            .find(|old| old.path == spec.path);
        match old {
            None => SqlValue::Null,
            Some(old) if old.index_type == spec.index_type && old.index_type != IndexType::Json1 => row
                .columns
                .get(&spec.path)
                .cloned()
                .unwrap_or(SqlValue::Null),
            Some(_) => match &row.body {
                Some(body) => coerce(spec.index_type, &project(body, &spec.path)),
                None => SqlValue::Null,
            },
        }
    }
}

fn table_exists(conn: &Connection, name: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![name],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Keep AUTOINCREMENT ids from going backwards after the copy
fn carry_sequence(conn: &Connection, from: &str, to: &str) -> DbResult<()> {
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            params![from],
            |row| row.get(0),
        )
        .optional()?;
    let Some(seq) = seq else {
        return Ok(());
    };
    let updated = conn.execute(
        "UPDATE sqlite_sequence SET seq = max(seq, ?1) WHERE name = ?2",
        params![seq, to],
    )?;
    if updated == 0 {
        conn.execute(
            "INSERT INTO sqlite_sequence (name, seq) VALUES (?1, ?2)",
            params![to, seq],
        )?;
    }
    Ok(())
}
