/// WebSocket message types for client-server communication
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::aggregate::display_rows;
use crate::row::Row;
use crate::schema::ColumnSpec;
use crate::store::TableStore;

/// Messages sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Subscribe to table updates
    Subscribe { table_name: String },

    /// Request current table data
    Query { table_name: String },

    /// Edit a single cell, addressed by row id
    EditCell {
        table_name: String,
        row_id: String,
        field: String,
        value: JsonValue,
    },
}

/// Messages sent from server to client
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full table data in response to Query
    TableData {
        table_name: String,
        display_name: String,
        columns: Vec<ColumnSpec>,
        rows: Vec<Row>,
        total: Option<Row>,
    },

    /// A cell was edited; carries the re-derived row and the new total
    CellUpdated {
        table_name: String,
        row_index: usize,
        field: String,
        row: Row,
        total: Option<Row>,
    },

    /// All rows of a table changed
    TableReplaced {
        table_name: String,
        rows: Vec<Row>,
        total: Option<Row>,
    },

    /// Subscription confirmed
    Subscribed { table_name: String },

    /// Error occurred
    Error { message: String },
}

impl ServerMessage {
    /// Full snapshot of one table, `None` if the store has no such table.
    pub fn table_data(store: &TableStore, table_name: &str) -> Option<Self> {
        let schema = store.schema(table_name)?;
        let (rows, total) = display_rows(store.rows(table_name).unwrap_or(&[]), schema);
        Some(ServerMessage::TableData {
            table_name: table_name.to_string(),
            display_name: schema.display_name.clone(),
            columns: schema.columns.clone(),
            rows,
            total,
        })
    }

    pub fn table_replaced(store: &TableStore, table_name: &str) -> Option<Self> {
        let schema = store.schema(table_name)?;
        let (rows, total) = display_rows(store.rows(table_name).unwrap_or(&[]), schema);
        Some(ServerMessage::TableReplaced {
            table_name: table_name.to_string(),
            rows,
            total,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"Error","message":"serialization failed: {}"}}"#, e)
        })
    }
}
