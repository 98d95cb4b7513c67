/// Changeset - Change Propagation for the Table Store
///
/// Every mutation of a `TableStore` records what it touched, so listeners
/// (the WebSocket sessions) can push just that instead of re-sending all
/// tables.
///
/// # Change Types
///
/// - `CellEdited`: one cell was edited; carries the re-derived row
/// - `TableReplaced`: a table's rows were replaced wholesale (merge, replace,
///   recompute)
/// - `Reloaded`: every table changed at once (workbook import)
///
/// # Usage Pattern
///
/// 1. Store operations generate `TableChange` events
/// 2. Changes accumulate in the store's changeset buffer
/// 3. The owner calls `drain()` and forwards the changes
/// 4. The generation counts drained batches

use crate::row::Row;

/// Represents a single change to the table state
#[derive(Debug, Clone, PartialEq)]
pub enum TableChange {
    /// A cell was edited; `row` is the full row after re-derivation
    CellEdited {
        table: String,
        index: usize,
        field: String,
        row: Row,
    },

    /// All rows of a table were replaced
    TableReplaced { table: String },

    /// The whole state was replaced
    Reloaded,
}

/// A collection of pending changes
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    changes: Vec<TableChange>,
    /// Generation counter - incremented each time the changeset is drained
    generation: u64,
}

impl Changeset {
    pub fn new() -> Self {
        Changeset {
            changes: Vec::new(),
            generation: 0,
        }
    }

    /// Add a change to the changeset
    pub fn push(&mut self, change: TableChange) {
        self.changes.push(change);
    }

    /// Returns the current generation number
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Drain changes, returning ownership and clearing the buffer
    pub fn drain(&mut self) -> Vec<TableChange> {
        self.generation += 1;
        std::mem::take(&mut self.changes)
    }
}
