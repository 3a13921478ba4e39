//! Pub/sub channel contract
//!
//! The tracker only needs four things from a realtime transport: subscribe to
//! a named channel under a participant key, publish ("track") a record,
//! register callbacks for sync/join/leave, and unsubscribe. Delivery is
//! treated as at-least-once with the last full state winning.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::record::PresenceRecord;

/// Participant key -> records announced under that key, oldest first.
pub type PresenceState = HashMap<String, Vec<PresenceRecord>>;

pub type EventCallback = Arc<dyn Fn(ChannelEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Sync,
    Join,
    Leave,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    /// Authoritative full state of the channel.
    Sync { state: PresenceState },
    Join {
        key: String,
        new_presences: Vec<PresenceRecord>,
    },
    Leave {
        key: String,
        left_presences: Vec<PresenceRecord>,
    },
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Sync { .. } => EventKind::Sync,
            Self::Join { .. } => EventKind::Join,
            Self::Leave { .. } => EventKind::Leave,
        }
    }
}

/// A live subscription. Opaque to callers beyond identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelHandle {
    pub id: u64,
    pub channel_name: String,
    pub key: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Invalid channel name: {0:?}")]
    InvalidChannel(String),

    #[error("Subscription failed: {0}")]
    SubscribeFailed(String),

    #[error("Handle {0} is not subscribed")]
    NotSubscribed(u64),

    #[error("Transport error: {0}")]
    Transport(String),
}

#[async_trait]
pub trait PresenceChannel: Send + Sync {
    async fn subscribe(&self, channel_name: &str, key: &str) -> Result<ChannelHandle, ChannelError>;

    async fn track(&self, handle: &ChannelHandle, record: &PresenceRecord) -> Result<(), ChannelError>;

    fn on_event(&self, handle: &ChannelHandle, kind: EventKind, callback: EventCallback);

    async fn unsubscribe(&self, handle: &ChannelHandle) -> Result<(), ChannelError>;

    /// Whether the transport broadcasts full state on every change. Without
    /// it the tracker merges join/leave deltas itself.
    fn supports_full_sync(&self) -> bool {
        true
    }
}

/// Channel name used for a presence room.
pub fn presence_channel_name(room: &str) -> String {
    format!("presence:{}", room)
}
