/// Table State Store
///
/// `TableStore` is the single authority over table state. It owns the
/// schemas, the rows of every table, a persistence backend and a changeset.
///
/// # Invariants
///
/// - every schema id has an entry, possibly empty, and no other ids exist
/// - after any mutation, derived columns equal what the deriver computes
///   (except after [`TableStore::replace_rows`], which stores rows verbatim)
/// - every mutation is persisted once and recorded in the changeset
///
/// Persistence failures are logged and swallowed: the in-memory state stays
/// authoritative and the next successful write catches storage up.

use crate::changeset::{Changeset, TableChange};
use crate::derive::{derive_row, derive_rows};
use crate::mapper::map_sheet_to_rows;
use crate::merge::MergePlan;
use crate::persist::{StateStorage, STATE_KEY};
use crate::row::{Row, TableState};
use crate::schema::TableSchema;
use crate::value::CellValue;
use crate::workbook::Workbook;
use serde::Serialize;

/// What a cell edit did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    /// The cell changed; `row` is the re-derived row at `index`
    Applied { index: usize, row: Row },
    UnknownTable,
    UnknownRow,
    UnknownField,
    /// The column is imported or computed, not captured from the user
    ReadOnlyField,
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied { .. })
    }
}

pub struct TableStore {
    schemas: Vec<TableSchema>,
    state: TableState,
    storage: Box<dyn StateStorage>,
    changeset: Changeset,
}

impl std::fmt::Debug for TableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableStore")
            .field("tables", &self.state.keys().collect::<Vec<_>>())
            .field("generation", &self.changeset.generation())
            .finish()
    }
}

impl TableStore {
    /// Create a store for `schemas`, rehydrating from `storage`.
    ///
    /// Persisted tables whose id is not in `schemas` are dropped; schema ids
    /// with nothing persisted start empty. Unreadable storage is treated as
    /// empty.
    ///
    /// Schemas that fail [`TableSchema::validate`] are logged and left out.
    pub fn create(schemas: Vec<TableSchema>, storage: Box<dyn StateStorage>) -> Self {
        let schemas: Vec<TableSchema> = schemas
            .into_iter()
            .filter(|schema| match schema.validate() {
                Ok(()) => true,
                Err(e) => {
                    log::error!("skipping invalid schema: {}", e);
                    false
                }
            })
            .collect();
        let persisted = load_state(storage.as_ref());
        let mut state = empty_state(&schemas);
        for (id, rows) in persisted {
            match state.get_mut(&id) {
                Some(slot) => *slot = rows,
                None => log::info!("dropping persisted table '{}' with no schema", id),
            }
        }
        TableStore {
            schemas,
            state,
            storage,
            changeset: Changeset::new(),
        }
    }

    pub fn state(&self) -> &TableState {
        &self.state
    }

    pub fn rows(&self, table_id: &str) -> Option<&[Row]> {
        self.state.get(table_id).map(|rows| rows.as_slice())
    }

    pub fn schema(&self, table_id: &str) -> Option<&TableSchema> {
        self.schemas.iter().find(|s| s.id == table_id)
    }

    pub fn schemas(&self) -> &[TableSchema] {
        &self.schemas
    }

    pub fn changeset(&self) -> &Changeset {
        &self.changeset
    }

    /// Take the pending changes for forwarding to listeners.
    pub fn drain_changes(&mut self) -> Vec<TableChange> {
        self.changeset.drain()
    }

    /// Replace every table with rows mapped from `workbook`.
    ///
    /// All tables are mapped into a fresh state first and swapped in
    /// together, so a reader never sees a half-imported state.
    pub fn import_workbook(&mut self, workbook: &Workbook) {
        let mut fresh = TableState::new();
        for schema in &self.schemas {
            let rows = map_sheet_to_rows(workbook, schema);
            log::info!("imported {} rows into {}", rows.len(), schema.id);
            fresh.insert(schema.id.clone(), rows);
        }
        self.state = fresh;
        self.changeset.push(TableChange::Reloaded);
        self.persist();
    }

    /// Set one cell and re-derive its row.
    ///
    /// The value is coerced to the column's type. Only editable columns
    /// accept edits. Unknown tables, rows and fields, and read-only columns,
    /// are reported through the outcome and change nothing.
    pub fn edit_cell(
        &mut self,
        table_id: &str,
        row_id: &str,
        field: &str,
        value: CellValue,
    ) -> EditOutcome {
        let Some(schema) = self.schemas.iter().find(|s| s.id == table_id) else {
            log::warn!("edit ignored: unknown table '{}'", table_id);
            return EditOutcome::UnknownTable;
        };
        let Some(column) = schema.get_column(field) else {
            log::warn!("edit ignored: unknown field '{}.{}'", table_id, field);
            return EditOutcome::UnknownField;
        };
        if !column.is_editable() {
            log::warn!("edit ignored: '{}.{}' is read-only", table_id, field);
            return EditOutcome::ReadOnlyField;
        }
        let rows = self.state.entry(table_id.to_string()).or_default();
        let Some(index) = rows.iter().position(|r| r.id == row_id) else {
            log::warn!("edit ignored: unknown row '{}' in '{}'", row_id, table_id);
            return EditOutcome::UnknownRow;
        };

        let mut row = rows[index].clone();
        row.set(field, value.coerce_to(column.value_type));
        let row = derive_row(&row, schema);
        rows[index] = row.clone();

        self.changeset.push(TableChange::CellEdited {
            table: table_id.to_string(),
            index,
            field: field.to_string(),
            row: row.clone(),
        });
        self.persist();
        EditOutcome::Applied { index, row }
    }

    /// Replace a table's rows verbatim. Returns false for an unknown table.
    pub fn replace_rows(&mut self, table_id: &str, rows: Vec<Row>) -> bool {
        if !self.install(table_id, rows) {
            return false;
        }
        self.persist();
        true
    }

    /// Re-derive every row of a table. Returns false for an unknown table.
    pub fn recompute(&mut self, table_id: &str) -> bool {
        let Some(schema) = self.schema(table_id) else {
            log::warn!("recompute ignored: unknown table '{}'", table_id);
            return false;
        };
        let rows = derive_rows(self.rows(table_id).unwrap_or(&[]), schema);
        self.install(table_id, rows);
        self.persist();
        true
    }

    /// Swap in the tables of a merge plan and persist once.
    pub fn apply_merge(&mut self, plan: MergePlan) {
        let mut changed = 0;
        for (table_id, rows) in plan.tables {
            if self.install(&table_id, rows) {
                changed += 1;
            }
        }
        if changed > 0 {
            self.persist();
        }
    }

    /// Forget the persisted state. In-memory tables are untouched.
    pub fn clear_persisted(&mut self) {
        if let Err(e) = self.storage.remove(STATE_KEY) {
            log::error!("failed to clear persisted state: {}", e);
        }
    }

    fn install(&mut self, table_id: &str, rows: Vec<Row>) -> bool {
        let Some(slot) = self.state.get_mut(table_id) else {
            log::warn!("ignoring rows for unknown table '{}'", table_id);
            return false;
        };
        *slot = rows;
        self.changeset.push(TableChange::TableReplaced {
            table: table_id.to_string(),
        });
        true
    }

    fn persist(&self) {
        let json = match serde_json::to_string(&self.state) {
            Ok(json) => json,
            Err(e) => {
                log::error!("failed to serialize table state: {}", e);
                return;
            }
        };
        if let Err(e) = self.storage.write(STATE_KEY, &json) {
            log::error!("failed to persist table state: {}", e);
        }
    }
}

fn empty_state(schemas: &[TableSchema]) -> TableState {
    schemas
        .iter()
        .map(|s| (s.id.clone(), Vec::new()))
        .collect()
}

fn load_state(storage: &dyn StateStorage) -> TableState {
    let text = match storage.read(STATE_KEY) {
        Ok(Some(text)) => text,
        Ok(None) => return TableState::new(),
        Err(e) => {
            log::warn!("could not read persisted state: {}", e);
            return TableState::new();
        }
    };
    match serde_json::from_str(&text) {
        Ok(state) => state,
        Err(e) => {
            log::warn!("discarding corrupt persisted state: {}", e);
            TableState::new()
        }
    }
}
