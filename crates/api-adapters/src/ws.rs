//! `GET /api/ws?token=...`: the realtime channel.
//!
//! A session starts in the caller's own user room and the shared
//! `questions` room. Clients may send `{"action":"join","room":"..."}` or
//! `{"action":"leave","room":"..."}`; joins are limited to those same two
//! rooms. Server frames are `{"event": "...", "data": {...}}`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use domains::Identity;
use services::events::QUESTIONS_ROOM;
use storage_adapters::{ConnectionId, RoomHub, ServerMessage};

use crate::error::ApiResult;
use crate::extract::ApiQuery;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientMessage {
    Join { room: String },
    Leave { room: String },
}

pub async fn upgrade(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<WsParams>,
    ws: WebSocketUpgrade,
) -> ApiResult<Response> {
    // Browsers cannot set headers on the upgrade request, hence the query token.
    let identity = state.services.users.authenticate(&params.token).await?;
    let hub = state.hub.clone();
    Ok(ws.on_upgrade(move |socket| session(socket, hub, identity)))
}

async fn session(socket: WebSocket, hub: Arc<RoomHub>, identity: Identity) {
    let (connection, mut outbound) = hub.connect();
    hub.join_room(connection, &identity.user_id.to_string());
    hub.join_room(connection, QUESTIONS_ROOM);
    info!(%connection, user_id = %identity.user_id, "realtime session started");

    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                let Some(message) = message else { break };
                if !send(&mut sink, &message).await {
                    break;
                }
            }
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Some(reply) = handle_client_message(&hub, connection, &identity, text.as_str()) {
                        if !send(&mut sink, &reply).await {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(%connection, error = %err, "websocket read failed");
                    break;
                }
            },
        }
    }

    hub.disconnect(connection);
    info!(%connection, user_id = %identity.user_id, "realtime session ended");
}

async fn send<S>(sink: &mut S, message: &ServerMessage) -> bool
where
    S: SinkExt<Message> + Unpin,
{
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, event = %message.event, "unencodable realtime frame dropped");
            return true;
        }
    };
    sink.send(Message::Text(text.into())).await.is_ok()
}

fn may_join(identity: &Identity, room: &str) -> bool {
    room == QUESTIONS_ROOM || room == identity.user_id.to_string()
}

fn handle_client_message(
    hub: &RoomHub,
    connection: ConnectionId,
    identity: &Identity,
    text: &str,
) -> Option<ServerMessage> {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::Join { room }) if may_join(identity, &room) => {
            hub.join_room(connection, &room);
            None
        }
        Ok(ClientMessage::Join { room }) => Some(error_frame(format!("cannot join room {room}"))),
        Ok(ClientMessage::Leave { room }) => {
            hub.leave_room(connection, &room);
            None
        }
        Err(_) => Some(error_frame("unrecognized message".to_string())),
    }
}

fn error_frame(message: String) -> ServerMessage {
    ServerMessage {
        event: "error".into(),
        data: json!({ "message": message }),
    }
}
