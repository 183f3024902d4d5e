//! WebSocket transport for realtime chat events.
//!
//! Each connection gets a fresh [`ConnectionId`] and a bounded outbound
//! queue in the client registry. Two halves per socket:
//! 1. Sender task: serializes [`ServerEvent`]s from the queue onto the
//!    wire.
//! 2. Receiver loop: parses [`ClientEvent`]s and dispatches them into
//!    the chat service.
//!
//! On close the service handles implicit room departures and the
//! presence transition before the queue is dropped.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{debug, warn};

use hirelink_chat::{ClientEvent, MessageDraft};
use hirelink_shared::{ConnectionId, UserId};

use crate::api::AppState;
use crate::auth::AuthUser;

pub async fn ws_handler(
    AuthUser(user): AuthUser,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn handle_socket(socket: WebSocket, state: AppState, user: UserId) {
    let (mut ws_sender, mut ws_receiver) = socket.split();
    let conn = ConnectionId::new();

    let mut rx = state.registry.register(conn, user).await;
    state.service.on_connect(user, conn).await;
    debug!(user = %user, conn = %conn, "WebSocket connected");

    // Forward queued events onto the wire.
    let sender_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize event");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = ws_receiver.next().await {
        match msg {
            Message::Text(text) => {
                let event: ClientEvent = match serde_json::from_str(&text) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(conn = %conn, error = %e, "invalid client event");
                        continue;
                    }
                };
                dispatch(&state, conn, user, event).await;
            }
            Message::Close(_) => break,
            // Binary frames are not part of the protocol; pings are
            // answered by the tungstenite layer.
            _ => {}
        }
    }

    debug!(user = %user, conn = %conn, "WebSocket disconnected");
    state.service.on_disconnect(conn).await;
    state.registry.unregister(conn).await;
    sender_task.abort();
}

async fn dispatch(state: &AppState, conn: ConnectionId, user: UserId, event: ClientEvent) {
    match event {
        ClientEvent::JoinChatRoom { room_id } => {
            if let Err(e) = state.service.join_room(room_id, conn, user).await {
                warn!(user = %user, room = %room_id, error = %e, "room join rejected");
            }
        }
        ClientEvent::LeaveChatRoom { room_id } => {
            state.service.leave_room(room_id, conn).await;
        }
        ClientEvent::SendChatMessage {
            room_id,
            text,
            parent,
            location,
        } => {
            let draft = MessageDraft {
                text,
                parent,
                location,
                attachment: None,
            };
            if let Err(e) = state.service.send_message(room_id, user, draft).await {
                // The send already failed client-side validation or
                // access control; report back on this connection only.
                warn!(user = %user, room = %room_id, error = %e, "websocket send rejected");
            }
        }
        ClientEvent::MarkRoomRead { room_id } => {
            if let Err(e) = state.service.mark_room_read(room_id, user).await {
                warn!(user = %user, room = %room_id, error = %e, "mark-read rejected");
            }
        }
        ClientEvent::Typing { room_id } => {
            state.service.typing(room_id, user, true).await;
        }
        ClientEvent::StopTyping { room_id } => {
            state.service.typing(room_id, user, false).await;
        }
    }
}
