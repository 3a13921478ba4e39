//! WebSocket bridge between browser clients and the presence hub

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use kolab_core::Clock;
use kolab_guard::{sanitize_location, sanitize_text};
use kolab_presence_sdk::{
    presence_channel_name, ChannelEvent, ChannelHandle, EventKind, PresenceChannel,
    PresenceRecord, PresenceState, Status,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::rest::{ApiResponse, MAX_KEY_CHARS};
use crate::AppState;

/// Messages a socket may have queued before it counts as stalled.
pub const OUTBOX_CAPACITY: usize = 256;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub room: String,
    pub participant_id: String,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Response {
    let room = sanitize_text(&params.room, MAX_KEY_CHARS);
    let participant_id = sanitize_text(&params.participant_id, MAX_KEY_CHARS);
    if room.is_empty() || participant_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            ApiResponse::<()>::error("room and participant_id are required"),
        )
            .into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, room, participant_id))
}

/// Server-to-client WebSocket messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Subscribed { room: String, participant_id: String },
    Sync { state: PresenceState },
    Join { key: String, new_presences: Vec<PresenceRecord> },
    Leave { key: String, left_presences: Vec<PresenceRecord> },
    Pong,
    Error { code: String, message: String },
}

impl WsMessage {
    fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl From<ChannelEvent> for WsMessage {
    fn from(event: ChannelEvent) -> Self {
        match event {
            ChannelEvent::Sync { state } => Self::Sync { state },
            ChannelEvent::Join { key, new_presences } => Self::Join { key, new_presences },
            ChannelEvent::Leave { key, left_presences } => Self::Leave { key, left_presences },
        }
    }
}

/// Client-to-server WebSocket messages
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Track {
        #[serde(default = "default_status")]
        status: Status,
        #[serde(default)]
        location: String,
        #[serde(default)]
        display_name: Option<String>,
        #[serde(default)]
        avatar_ref: Option<String>,
    },
    Ping,
}

fn default_status() -> Status {
    Status::Online
}

/// Record published for a `track` message. The key and timestamp come from
/// the server, never from the client.
pub fn tracked_record(
    key: &str,
    status: Status,
    location: &str,
    display_name: Option<&str>,
    avatar_ref: Option<&str>,
    now: DateTime<Utc>,
) -> PresenceRecord {
    let mut record = PresenceRecord::new(key).with_location(sanitize_location(location));
    record.status = status;
    record.last_seen_at = now;
    record.display_name = display_name
        .map(|name| sanitize_text(name, MAX_KEY_CHARS))
        .filter(|name| !name.is_empty());
    record.avatar_ref = avatar_ref
        .map(|avatar| sanitize_text(avatar, 2 * MAX_KEY_CHARS))
        .filter(|avatar| !avatar.is_empty());
    record
}

/// Bounded queue between hub callbacks and the socket writer.
///
/// Hub callbacks must not block, so a full queue is never waited on: the
/// message is dropped and the socket is flagged for disconnect. The client
/// gets a fresh `sync` when it reconnects.
#[derive(Clone)]
pub struct SocketOutbox {
    tx: mpsc::Sender<WsMessage>,
    overflow: Arc<Notify>,
}

impl SocketOutbox {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        let outbox = Self {
            tx,
            overflow: Arc::new(Notify::new()),
        };
        (outbox, rx)
    }

    /// Queue `msg` without waiting. Returns false if it was dropped.
    pub fn push(&self, msg: WsMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!(capacity = self.tx.max_capacity(), "Socket outbox full, disconnecting client");
                self.overflow.notify_one();
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Resolves once a push has found the queue full.
    pub async fn overflowed(&self) {
        self.overflow.notified().await
    }
}

/// Forward sync, join and leave events for `handle` into `outbox`.
pub(crate) fn attach_listeners(state: &AppState, handle: &ChannelHandle, outbox: &SocketOutbox) {
    for kind in [EventKind::Sync, EventKind::Join, EventKind::Leave] {
        let outbox = outbox.clone();
        state.hub.on_event(
            handle,
            kind,
            Arc::new(move |event: ChannelEvent| {
                outbox.push(WsMessage::from(event));
            }),
        );
    }
}

type WsSender = SplitSink<WebSocket, Message>;

async fn send_json(sender: &mut WsSender, msg: &WsMessage) -> Result<(), axum::Error> {
    match serde_json::to_string(msg) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "Failed to encode WebSocket message");
            Ok(())
        }
    }
}

/// Handle WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, room: String, participant_id: String) {
    let channel_name = presence_channel_name(&room);
    let (mut sender, mut receiver) = socket.split();

    let handle = match state.hub.subscribe(&channel_name, &participant_id).await {
        Ok(handle) => handle,
        Err(e) => {
            warn!(%room, %participant_id, error = %e, "Presence subscribe failed");
            let _ = send_json(&mut sender, &WsMessage::error("subscribe_failed", e.to_string())).await;
            return;
        }
    };
    state.refresh_room_gauge();
    info!(%room, %participant_id, handle = handle.id, "Presence socket opened");

    let (outbox, mut rx) = SocketOutbox::new(OUTBOX_CAPACITY);
    attach_listeners(&state, &handle, &outbox);

    outbox.push(WsMessage::Subscribed {
        room: room.clone(),
        participant_id: participant_id.clone(),
    });
    outbox.push(WsMessage::Sync {
        state: state.hub.state(&channel_name),
    });

    let mut forward = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if send_json(&mut sender, &msg).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = &mut forward => break,
            _ = outbox.overflowed() => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(msg) => handle_client_message(&state, &handle, msg, &outbox).await,
                        Err(e) => {
                            outbox.push(WsMessage::error("bad_message", e.to_string()));
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    if let Err(e) = state.hub.unsubscribe(&handle).await {
        debug!(handle = handle.id, error = %e, "Presence unsubscribe failed");
    }
    forward.abort();
    state.refresh_room_gauge();
    info!(%room, %participant_id, handle = handle.id, "Presence socket closed");
}

pub(crate) async fn handle_client_message(
    state: &AppState,
    handle: &ChannelHandle,
    msg: ClientMessage,
    outbox: &SocketOutbox,
) {
    match msg {
        ClientMessage::Track {
            status,
            location,
            display_name,
            avatar_ref,
        } => {
            let record = tracked_record(
                &handle.key,
                status,
                &location,
                display_name.as_deref(),
                avatar_ref.as_deref(),
                state.clock.now(),
            );
            if let Err(e) = state.hub.track(handle, &record).await {
                warn!(handle = handle.id, error = %e, "Presence track failed");
                outbox.push(WsMessage::error("track_failed", e.to_string()));
            }
        }
        ClientMessage::Ping => {
            outbox.push(WsMessage::Pong);
        }
    }
}
