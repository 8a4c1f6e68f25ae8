//! WebSocket transport. Frames are JSON objects with a `type` field, the
//! same shape the bus events serialize to. A `resync` frame means the
//! socket fell behind and the client should re-fetch over HTTP.

use axum::{
    debug_handler,
    extract::{
        Path, State, WebSocketUpgrade,
        ws::{Message as WsMessage, WebSocket},
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    AppResult,
    appresult::AppError,
    bus::{Delivery, PresenceEvent, RealtimeBus, RoomEvent, RoomListEvent, Subscription},
    models::{MessageId, RoomId, UserId},
    presence::PresenceTracker,
    session::CurrentUser,
};

use super::ConversationRooms;

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Send { body: String },
    Typing { is_typing: bool },
    Read { message_ids: Vec<MessageId> },
    Heartbeat,
}

/// Keeps the user online for as long as the socket lives.
struct PresenceConnection {
    presence: PresenceTracker,
    user_id: UserId,
    key: String,
}

impl PresenceConnection {
    fn open(presence: PresenceTracker, user_id: UserId) -> Self {
        let key = Uuid::now_v7().to_string();
        presence.join(user_id, key.clone());
        Self { presence, user_id, key }
    }

    fn touch(&self) {
        // swept while the client was quiet
        if !self.presence.heartbeat(self.user_id, &self.key) {
            self.presence.join(self.user_id, self.key.clone());
        }
    }
}

impl Drop for PresenceConnection {
    fn drop(&mut self) {
        self.presence.leave(self.user_id, &self.key);
    }
}

fn encode<E: Serialize>(delivery: &Delivery<E>) -> serde_json::Result<String> {
    match delivery {
        Delivery::Event(event) => serde_json::to_string(event),
        Delivery::Resync { missed } => {
            serde_json::to_string(&json!({ "type": "resync", "missed": missed }))
        }
    }
}

fn error_frame(err: AppError) -> String {
    json!({
        "type": "error",
        "error": { "code": err.error_code(), "message": err.to_string() },
    })
    .to_string()
}

/// The room is gone; nothing more will arrive on this socket.
fn closes_room_socket(delivery: &Delivery<RoomEvent>) -> bool {
    matches!(delivery, Delivery::Event(RoomEvent::RoomRemoved { .. }))
}

async fn forward<E: Serialize>(
    sender: &mut SplitSink<WebSocket, WsMessage>,
    delivery: &Delivery<E>,
) -> bool {
    match encode(delivery) {
        Ok(text) => sender.send(WsMessage::Text(text.into())).await.is_ok(),
        Err(err) => {
            warn!(error = %err, "dropping unencodable event");
            true
        }
    }
}

#[debug_handler(state = crate::AppState)]
pub async fn room_ws(
    CurrentUser(user_id): CurrentUser,
    Path(room_id): Path<Uuid>,
    State(rooms): State<ConversationRooms>,
    State(bus): State<RealtimeBus>,
    State(presence): State<PresenceTracker>,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    rooms.member_room(room_id, user_id).await?;
    let subscription = bus.subscribe_room(room_id, user_id);

    Ok(ws.on_upgrade(move |socket| async move {
        let connection = PresenceConnection::open(presence, user_id);
        room_socket(socket, rooms, subscription, room_id, &connection).await;
        debug!(%room_id, %user_id, "room socket closed");
    }))
}

async fn room_socket(
    socket: WebSocket,
    rooms: ConversationRooms,
    mut subscription: Subscription<RoomEvent>,
    room_id: RoomId,
    connection: &PresenceConnection,
) {
    let user_id = connection.user_id;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            delivery = subscription.recv() => {
                let Some(delivery) = delivery else { break };
                if !forward(&mut sender, &delivery).await {
                    break;
                }
                if closes_room_socket(&delivery) {
                    let _ = sender.send(WsMessage::Close(None)).await;
                    break;
                }
            }
            incoming = receiver.next() => {
                let Some(Ok(msg)) = incoming else { break };
                let text = match msg {
                    WsMessage::Text(text) => text,
                    WsMessage::Close(_) => break,
                    _ => continue,
                };
                connection.touch();

                if let Err(err) = handle_room_frame(&rooms, room_id, user_id, text.as_str()).await {
                    if sender.send(WsMessage::Text(error_frame(err).into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    }
}

/// Results come back through the bus, so only failures are answered here.
async fn handle_room_frame(
    rooms: &ConversationRooms,
    room_id: RoomId,
    user_id: UserId,
    text: &str,
) -> AppResult<()> {
    let frame: ClientFrame = serde_json::from_str(text)
        .map_err(|err| AppError::BadRequest(format!("unreadable frame: {err}")))?;

    match frame {
        ClientFrame::Send { body } => {
            rooms.post_message(room_id, user_id, &body).await?;
        }
        ClientFrame::Typing { is_typing } => {
            rooms.set_typing(room_id, user_id, is_typing).await?;
        }
        ClientFrame::Read { message_ids } => {
            rooms.mark_read(room_id, user_id, &message_ids).await?;
        }
        ClientFrame::Heartbeat => {}
    }
    Ok(())
}

/// Room-list and presence events for the signed-in user.
#[debug_handler(state = crate::AppState)]
pub async fn user_ws(
    CurrentUser(user_id): CurrentUser,
    State(bus): State<RealtimeBus>,
    State(presence): State<PresenceTracker>,
    ws: WebSocketUpgrade,
) -> Response {
    let room_list = bus.subscribe_user_rooms(user_id);
    let presence_events = bus.subscribe_presence();

    ws.on_upgrade(move |socket| async move {
        let connection = PresenceConnection::open(presence, user_id);
        user_socket(socket, room_list, presence_events, &connection).await;
        debug!(%user_id, "user socket closed");
    })
}

async fn user_socket(
    socket: WebSocket,
    mut room_list: Subscription<RoomListEvent>,
    mut presence_events: Subscription<PresenceEvent>,
    connection: &PresenceConnection,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut online: Vec<UserId> = connection.presence.snapshot().into_iter().collect();
    online.sort();
    let snapshot = json!({ "type": "presence.snapshot", "online": online }).to_string();
    if sender.send(WsMessage::Text(snapshot.into())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            delivery = room_list.recv() => {
                let Some(delivery) = delivery else { break };
                if !forward(&mut sender, &delivery).await {
                    break;
                }
            }
            delivery = presence_events.recv() => {
                let Some(delivery) = delivery else { break };
                if !forward(&mut sender, &delivery).await {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => connection.touch(),
                }
            }
        }
    }
}
