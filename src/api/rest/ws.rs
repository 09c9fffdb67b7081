use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::hub::{ConnectionId, Identity};
use crate::state::AppState;

/// Messages a client may send over the socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Identity already verified by the auth layer.
    Authenticate(Identity),
    Ping,
}

#[derive(Debug, Serialize)]
struct Reply {
    event: &'static str,
    payload: serde_json::Value,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, mut events) = state.hub.connect();
    let (reply_tx, mut reply_rx) = mpsc::channel::<Reply>(8);

    info!(connection_id = %connection_id, "websocket client connected");

    let send_task = tokio::spawn(async move {
        loop {
            let json = tokio::select! {
                event = events.recv() => match event {
                    Some(event) => serde_json::to_string(&*event),
                    None => break,
                },
                reply = reply_rx.recv() => match reply {
                    Some(reply) => serde_json::to_string(&reply),
                    None => break,
                },
            };

            let json = match json {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize outbound message");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_state = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = receiver.next().await {
            match message {
                Message::Text(text) => {
                    if let Some(reply) = handle_client_message(&recv_state, connection_id, &text) {
                        if reply_tx.send(reply).await.is_err() {
                            break;
                        }
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {},
        _ = recv_task => {},
    }

    state.hub.disconnect(connection_id);
    info!(connection_id = %connection_id, "websocket client disconnected");
}

fn handle_client_message(state: &AppState, connection_id: ConnectionId, text: &str) -> Option<Reply> {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(err) => {
            debug!(connection_id = %connection_id, error = %err, "unrecognized client message");
            return Some(Reply {
                event: "error",
                payload: json!({ "message": format!("unrecognized message: {err}") }),
            });
        }
    };

    match message {
        ClientMessage::Authenticate(identity) => {
            match state.hub.authenticate(connection_id, identity) {
                Ok(rooms) => Some(Reply {
                    event: "authenticated",
                    payload: json!({
                        "rooms": rooms.iter().map(ToString::to_string).collect::<Vec<_>>()
                    }),
                }),
                Err(err) => Some(Reply {
                    event: "error",
                    payload: json!({ "message": err.to_string() }),
                }),
            }
        }
        ClientMessage::Ping => Some(Reply {
            event: "pong",
            payload: serde_json::Value::Null,
        }),
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::ClientMessage;
    use crate::hub::Role;

    #[test]
    fn parses_authenticate_message() {
        let driver_id = Uuid::new_v4();
        let text = format!(
            r#"{{"type":"authenticate","account_id":"{}","role":"driver","driver_id":"{driver_id}"}}"#,
            Uuid::new_v4()
        );

        match serde_json::from_str::<ClientMessage>(&text).unwrap() {
            ClientMessage::Authenticate(identity) => {
                assert_eq!(identity.role, Role::Driver);
                assert_eq!(identity.driver_id, Some(driver_id));
                assert!(identity.restaurant_id.is_none());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }
}
