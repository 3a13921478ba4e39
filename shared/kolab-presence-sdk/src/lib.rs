//! Kolab Presence SDK
//!
//! Who is online, where, doing what. A [`PresenceTracker`] publishes the local
//! participant onto a shared pub/sub channel and keeps a snapshot of every
//! participant the channel reports for the same room.

pub mod channel;
pub mod memory;
pub mod record;
pub mod tracker;


pub use channel::{
    presence_channel_name, ChannelError, ChannelEvent, ChannelHandle, EventCallback, EventKind,
    PresenceChannel, PresenceState,
};
pub use memory::InMemoryChannel;
pub use record::{PresenceRecord, PresenceSnapshot, Status, Visibility};
pub use tracker::{PresenceTracker, TrackerPhase};
