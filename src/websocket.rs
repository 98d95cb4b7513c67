/// WebSocket sessions for live table updates
use actix::prelude::*;
use actix_web_actors::ws;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::aggregate::aggregate_row;
use crate::changeset::TableChange;
use crate::messages::{ClientMessage, ServerMessage};
use crate::optimizer::OptimizerClient;
use crate::store::{EditOutcome, TableStore};
use crate::value::CellValue;

/// How often heartbeat pings are sent
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// How long before lack of client response causes a timeout
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared state for all connections
pub struct AppState {
    pub store: Arc<Mutex<TableStore>>,
    pub subscribers: Arc<Mutex<HashMap<String, Vec<Addr<TableWebSocket>>>>>,
    pub optimizer: OptimizerClient,
}

impl AppState {
    pub fn new(store: TableStore, optimizer: OptimizerClient) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            optimizer,
        }
    }

    /// Lock the store. A panic in another holder does not make the tables
    /// unreadable.
    pub fn store(&self) -> MutexGuard<'_, TableStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe a WebSocket connection to a table
    pub fn subscribe(&self, table_name: &str, addr: Addr<TableWebSocket>) {
        let mut subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        let addrs = subscribers.entry(table_name.to_string()).or_default();
        addrs.retain(|a| a.connected());
        addrs.push(addr);
    }

    /// Broadcast a message to all subscribers of a table
    pub fn broadcast(&self, table_name: &str, msg: ServerMessage) {
        let subscribers = self.subscribers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(addrs) = subscribers.get(table_name) {
            for addr in addrs {
                addr.do_send(BroadcastMessage(msg.clone()));
            }
        }
    }

    /// Drain the store's pending changes and push them to subscribers.
    ///
    /// Messages are built under the store lock and sent after releasing it.
    pub fn publish_changes(&self) {
        let outgoing: Vec<(String, ServerMessage)> = {
            let mut store = self.store();
            let changes = store.drain_changes();
            changes
                .into_iter()
                .flat_map(|change| change_messages(&store, change))
                .collect()
        };
        for (table, msg) in outgoing {
            self.broadcast(&table, msg);
        }
    }
}

/// Messages announcing one change, keyed by the table they concern.
fn change_messages(store: &TableStore, change: TableChange) -> Vec<(String, ServerMessage)> {
    match change {
        TableChange::CellEdited {
            table,
            index,
            field,
            row,
        } => {
            let total = store
                .schema(&table)
                .and_then(|s| aggregate_row(store.rows(&table).unwrap_or(&[]), s));
            let msg = ServerMessage::CellUpdated {
                table_name: table.clone(),
                row_index: index,
                field,
                row,
                total,
            };
            vec![(table, msg)]
        }
        TableChange::TableReplaced { table } => ServerMessage::table_replaced(store, &table)
            .map(|msg| vec![(table, msg)])
            .unwrap_or_default(),
        TableChange::Reloaded => store
            .schemas()
            .iter()
            .filter_map(|s| {
                ServerMessage::table_replaced(store, &s.id).map(|msg| (s.id.clone(), msg))
            })
            .collect(),
    }
}

/// Error text for an edit that was not applied.
fn edit_problem(outcome: &EditOutcome, table_name: &str, row_id: &str, field: &str) -> Option<String> {
    match outcome {
        EditOutcome::Applied { .. } => None,
        EditOutcome::UnknownTable => Some(format!("Unknown table '{}'", table_name)),
        EditOutcome::UnknownRow => Some(format!("Unknown row '{}'", row_id)),
        EditOutcome::UnknownField => Some(format!("Unknown field '{}'", field)),
        EditOutcome::ReadOnlyField => Some(format!("Field '{}' is read-only", field)),
    }
}

/// Message to broadcast to clients
#[derive(Message)]
#[rtype(result = "()")]
struct BroadcastMessage(ServerMessage);

/// WebSocket connection actor
pub struct TableWebSocket {
    hb: Instant,
    state: actix_web::web::Data<AppState>,
    subscribed_tables: Vec<String>,
}

impl TableWebSocket {
    pub fn new(state: actix_web::web::Data<AppState>) -> Self {
        Self {
            hb: Instant::now(),
            state,
            subscribed_tables: Vec::new(),
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                log::info!("websocket client heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMessage) {
        ctx.text(msg.to_json_string());
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg {
            ClientMessage::Subscribe { table_name } => {
                if self.state.store().schema(&table_name).is_none() {
                    self.send(ctx, &ServerMessage::error(format!("Unknown table '{}'", table_name)));
                    return;
                }
                if !self.subscribed_tables.contains(&table_name) {
                    self.subscribed_tables.push(table_name.clone());
                    self.state.subscribe(&table_name, ctx.address());
                }
                self.send(ctx, &ServerMessage::Subscribed { table_name });
            }

            ClientMessage::Query { table_name } => {
                let response = ServerMessage::table_data(&self.state.store(), &table_name)
                    .unwrap_or_else(|| ServerMessage::error(format!("Unknown table '{}'", table_name)));
                self.send(ctx, &response);
            }

            ClientMessage::EditCell {
                table_name,
                row_id,
                field,
                value,
            } => {
                let outcome = self.state.store().edit_cell(
                    &table_name,
                    &row_id,
                    &field,
                    CellValue::from_json(&value),
                );
                let problem = edit_problem(&outcome, &table_name, &row_id, &field);
                match problem {
                    Some(message) => self.send(ctx, &ServerMessage::error(message)),
                    None => self.state.publish_changes(),
                }
            }
        }
    }
}

impl Actor for TableWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for TableWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => self.handle_client_message(client_msg, ctx),
                Err(e) => {
                    self.send(ctx, &ServerMessage::error(format!("Invalid message format: {}", e)))
                }
            },
            Ok(ws::Message::Binary(_)) => {
                log::debug!("ignoring binary websocket message");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            _ => ctx.stop(),
        }
    }
}

impl Handler<BroadcastMessage> for TableWebSocket {
    type Result = ();

    fn handle(&mut self, msg: BroadcastMessage, ctx: &mut Self::Context) {
        self.send(ctx, &msg.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::persist::MemoryStorage;
    use crate::row::Row;

    #[test]
    fn test_change_messages() {
        let mut store = TableStore::create(catalog::all_schemas(), Box::new(MemoryStorage::new()));
        store.replace_rows(
            "systems",
            vec![Row::at(0).with("item", "275D").with("demand_12m", 5.0).with("finished_12m", 1.0)],
        );
        store.edit_cell("systems", "0", "finished_12m", CellValue::Number(2.0));
        let changes = store.drain_changes();

        let replaced = change_messages(&store, changes[0].clone());
        assert_eq!(replaced.len(), 1);
        assert!(matches!(&replaced[0].1, ServerMessage::TableReplaced { rows, .. } if rows.len() == 1));

        let edited = change_messages(&store, changes[1].clone());
        match &edited[0].1 {
            ServerMessage::CellUpdated { row, total, row_index, .. } => {
                assert_eq!(*row_index, 0);
                assert_eq!(row.number("required_12m"), 3.0);
                assert_eq!(total.as_ref().map(|t| t.number("required_12m")), Some(3.0));
            }
            other => panic!("unexpected {:?}", other),
        }

        let reloaded = change_messages(&store, TableChange::Reloaded);
        assert_eq!(reloaded.len(), 7);
    }

    #[test]
    fn test_read_only_edit_reports_error() {
        let mut store = TableStore::create(catalog::all_schemas(), Box::new(MemoryStorage::new()));
        store.replace_rows(
            catalog::MACHINE_RECOMMENDATION,
            vec![Row::at(0).with("machine_type", "275D").with("qtc_avg_bb_price", 1200.0)],
        );
        store.drain_changes();

        let outcome = store.edit_cell(
            catalog::MACHINE_RECOMMENDATION,
            "0",
            "qtc_avg_bb_price",
            CellValue::from_json(&serde_json::json!(999)),
        );
        assert_eq!(
            edit_problem(&outcome, catalog::MACHINE_RECOMMENDATION, "0", "qtc_avg_bb_price").as_deref(),
            Some("Field 'qtc_avg_bb_price' is read-only")
        );
        assert!(store.drain_changes().is_empty());
        assert_eq!(store.rows(catalog::MACHINE_RECOMMENDATION).unwrap()[0].number("qtc_avg_bb_price"), 1200.0);
    }
}
