//! WebSocket upgrade handler and per-connection event loop.
//!
//! Each connection starts with an empty subscription: the client sends a
//! `subscribe` command naming event types (or `"*"`), after which
//! matching [`GridEvent`]s are forwarded as they are published.

use std::collections::HashSet;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast;

use super::messages::{WsCommand, WsMessage, WsMessageType};
use crate::app_state::AppState;
use crate::domain::GridEvent;

/// Per-connection event-type filter.
#[derive(Debug, Default)]
struct EventFilter {
    kinds: HashSet<String>,
    all: bool,
}

impl EventFilter {
    fn subscribe(&mut self, event_types: &[String]) {
        for kind in event_types {
            if kind == "*" {
                self.all = true;
            } else {
                self.kinds.insert(kind.clone());
            }
        }
    }

    fn unsubscribe(&mut self, event_types: &[String]) {
        for kind in event_types {
            if kind == "*" {
                self.all = false;
            } else {
                self.kinds.remove(kind);
            }
        }
    }

    fn matches(&self, event: &GridEvent) -> bool {
        self.all || self.kinds.contains(event.kind())
    }
}

/// `GET /ws` — Upgrade HTTP connection to the grid event feed.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let event_rx = state.event_bus.subscribe();
    ws.on_upgrade(move |socket| run_connection(socket, event_rx))
}

/// Runs the read/write loop for a single WebSocket connection.
async fn run_connection(socket: WebSocket, mut event_rx: broadcast::Receiver<GridEvent>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut filter = EventFilter::default();

    loop {
        tokio::select! {
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(response) = handle_text_message(&text, &mut filter)
                            && ws_tx.send(Message::text(response)).await.is_err() {
                                break;
                            }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            // Event from EventBus
            event = event_rx.recv() => {
                match event {
                    Ok(grid_event) => {
                        if filter.matches(&grid_event) {
                            let msg = WsMessage {
                                id: uuid::Uuid::new_v4().to_string(),
                                msg_type: WsMessageType::Event,
                                timestamp: chrono::Utc::now(),
                                payload: serde_json::to_value(&grid_event).unwrap_or_default(),
                            };
                            let json = serde_json::to_string(&msg).unwrap_or_default();
                            if ws_tx.send(Message::text(json)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(lagged = n, "ws client lagged behind event bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }

    tracing::debug!("ws connection closed");
}

/// Handles a text message from the client, returning an optional JSON
/// response.
fn handle_text_message(text: &str, filter: &mut EventFilter) -> Option<String> {
    let Ok(msg) = serde_json::from_str::<WsMessage>(text) else {
        let err = WsMessage {
            id: String::new(),
            msg_type: WsMessageType::Error,
            timestamp: chrono::Utc::now(),
            payload: serde_json::json!({
                "code": 400,
                "message": "malformed JSON"
            }),
        };
        return serde_json::to_string(&err).ok();
    };

    match serde_json::from_value::<WsCommand>(msg.payload.clone()) {
        Ok(WsCommand::Subscribe { event_types }) => {
            filter.subscribe(&event_types);
            let response = WsMessage {
                id: msg.id,
                msg_type: WsMessageType::Response,
                timestamp: chrono::Utc::now(),
                payload: serde_json::json!({
                    "subscribed": event_types,
                    "wildcard": filter.all,
                }),
            };
            serde_json::to_string(&response).ok()
        }
        Ok(WsCommand::Unsubscribe { event_types }) => {
            filter.unsubscribe(&event_types);
            let response = WsMessage {
                id: msg.id,
                msg_type: WsMessageType::Response,
                timestamp: chrono::Utc::now(),
                payload: serde_json::json!({
                    "unsubscribed": event_types,
                }),
            };
            serde_json::to_string(&response).ok()
        }
        Err(_) => {
            let err = WsMessage {
                id: msg.id,
                msg_type: WsMessageType::Error,
                timestamp: chrono::Utc::now(),
                payload: serde_json::json!({
                    "code": 404,
                    "message": "unknown command"
                }),
            };
            serde_json::to_string(&err).ok()
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn reserved_event() -> GridEvent {
        GridEvent::TokenReserved {
            token_id: "tok-1".to_string(),
            owner: "caller-1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_filter_matches_nothing() {
        let filter = EventFilter::default();
        assert!(!filter.matches(&reserved_event()));
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut filter = EventFilter::default();
        filter.subscribe(&["*".to_string()]);
        assert!(filter.matches(&reserved_event()));
    }

    #[test]
    fn specific_kind_filters_other_events() {
        let mut filter = EventFilter::default();
        filter.subscribe(&["token_reserved".to_string()]);
        assert!(filter.matches(&reserved_event()));
        assert!(!filter.matches(&GridEvent::AgentExpired {
            agent_id: "agent-1".to_string(),
            timestamp: Utc::now(),
        }));
    }

    #[test]
    fn unsubscribe_removes_kind() {
        let mut filter = EventFilter::default();
        filter.subscribe(&["token_reserved".to_string()]);
        filter.unsubscribe(&["token_reserved".to_string()]);
        assert!(!filter.matches(&reserved_event()));
    }

    #[test]
    fn subscribe_command_updates_filter_via_envelope() {
        let mut filter = EventFilter::default();
        let text = serde_json::json!({
            "id": "req-1",
            "type": "command",
            "timestamp": Utc::now(),
            "payload": {"command": "subscribe", "event_types": ["*"]}
        })
        .to_string();

        let response = handle_text_message(&text, &mut filter);
        assert!(response.is_some());
        assert!(filter.matches(&reserved_event()));
    }

    #[test]
    fn malformed_json_yields_error_response() {
        let mut filter = EventFilter::default();
        let Some(response) = handle_text_message("not json", &mut filter) else {
            panic!("expected error response");
        };
        assert!(response.contains("malformed JSON"));
    }
}
