//! In-process channel hub
//!
//! Complete implementation of [`PresenceChannel`] backed by shared memory.
//! Every subscriber of a channel receives `join` and then `sync` after a
//! track, and `leave` then `sync` after an unsubscribe.

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::{HashMap, VecDeque};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::channel::{
    ChannelError, ChannelEvent, ChannelHandle, EventCallback, EventKind, PresenceChannel,
    PresenceState,
};
use crate::record::PresenceRecord;

#[derive(Clone, Default)]
pub struct InMemoryChannel {
    hub: Arc<Hub>,
}

#[derive(Default)]
struct Hub {
    next_id: AtomicU64,
    next_seq: AtomicU64,
    channels: DashMap<String, Room>,
}

/// One channel: its members plus the events not yet handed to listeners.
#[derive(Default)]
struct Room {
    members: HashMap<u64, Member>,
    outbox: VecDeque<(EventCallback, ChannelEvent)>,
    draining: bool,
}

struct Member {
    key: String,
    tracked: Option<(u64, PresenceRecord)>,
    listeners: HashMap<EventKind, Vec<EventCallback>>,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current full state of `channel_name` (empty if nobody is subscribed).
    pub fn state(&self, channel_name: &str) -> PresenceState {
        self.hub
            .channels
            .get(channel_name)
            .map(|room| full_state(&room.members))
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, channel_name: &str) -> usize {
        self.hub
            .channels
            .get(channel_name)
            .map(|room| room.members.len())
            .unwrap_or(0)
    }

    pub fn channel_count(&self) -> usize {
        self.hub.channels.len()
    }
}

fn full_state(members: &HashMap<u64, Member>) -> PresenceState {
    let mut tracked: Vec<&(u64, PresenceRecord)> =
        members.values().filter_map(|m| m.tracked.as_ref()).collect();
    tracked.sort_by_key(|(seq, _)| *seq);

    let mut state = PresenceState::new();
    for (_, record) in tracked {
        state
            .entry(record.participant_id.clone())
            .or_default()
            .push(record.clone());
    }
    state
}

impl Room {
    /// Queue `events` for every listener. Returns true when the caller must
    /// drain, i.e. nobody else is draining this room.
    fn enqueue(&mut self, events: &[ChannelEvent]) -> bool {
        for event in events {
            for member in self.members.values() {
                if let Some(callbacks) = member.listeners.get(&event.kind()) {
                    for cb in callbacks {
                        self.outbox.push_back((cb.clone(), event.clone()));
                    }
                }
            }
        }
        if self.draining || self.outbox.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    fn is_idle_and_empty(&self) -> bool {
        self.members.is_empty() && self.outbox.is_empty() && !self.draining
    }
}

impl Hub {
    // Callbacks run after the channel lock is released so they may call back
    // in. Only one drainer per room, so listeners see events in the order the
    // state changes were made.
    fn drain(&self, channel_name: &str) {
        loop {
            let batch: Vec<(EventCallback, ChannelEvent)> = {
                let Some(mut room) = self.channels.get_mut(channel_name) else {
                    return;
                };
                if room.outbox.is_empty() {
                    room.draining = false;
                    break;
                }
                room.outbox.drain(..).collect()
            };

            for (cb, event) in batch {
                let kind = event.kind();
                if catch_unwind(AssertUnwindSafe(|| cb(event))).is_err() {
                    warn!(channel = channel_name, ?kind, "Presence listener panicked");
                }
            }
        }
        self.channels
            .remove_if(channel_name, |_, room| room.is_idle_and_empty());
    }
}

#[async_trait]
impl PresenceChannel for InMemoryChannel {
    async fn subscribe(&self, channel_name: &str, key: &str) -> Result<ChannelHandle, ChannelError> {
        if channel_name.trim().is_empty() {
            return Err(ChannelError::InvalidChannel(channel_name.to_string()));
        }
        if key.trim().is_empty() {
            return Err(ChannelError::SubscribeFailed("empty presence key".to_string()));
        }

        let id = self.hub.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.hub
            .channels
            .entry(channel_name.to_string())
            .or_default()
            .members
            .insert(
                id,
                Member {
                    key: key.to_string(),
                    tracked: None,
                    listeners: HashMap::new(),
                },
            );

        debug!(channel = channel_name, key, handle = id, "Subscribed");

        Ok(ChannelHandle {
            id,
            channel_name: channel_name.to_string(),
            key: key.to_string(),
        })
    }

    async fn track(&self, handle: &ChannelHandle, record: &PresenceRecord) -> Result<(), ChannelError> {
        let must_drain = {
            let mut room = self
                .hub
                .channels
                .get_mut(&handle.channel_name)
                .ok_or(ChannelError::NotSubscribed(handle.id))?;

            // seq taken under the room lock so state order matches delivery order
            let seq = self.hub.next_seq.fetch_add(1, Ordering::Relaxed);
            let member = room
                .members
                .get_mut(&handle.id)
                .ok_or(ChannelError::NotSubscribed(handle.id))?;

            // the channel keys presence by subscription key, not by payload
            let mut record = record.clone();
            record.participant_id = member.key.clone();
            member.tracked = Some((seq, record.clone()));

            let events = [
                ChannelEvent::Join {
                    key: record.participant_id.clone(),
                    new_presences: vec![record],
                },
                ChannelEvent::Sync {
                    state: full_state(&room.members),
                },
            ];
            room.enqueue(&events)
        };

        if must_drain {
            self.hub.drain(&handle.channel_name);
        }
        Ok(())
    }

    fn on_event(&self, handle: &ChannelHandle, kind: EventKind, callback: EventCallback) {
        let Some(mut room) = self.hub.channels.get_mut(&handle.channel_name) else {
            debug!(handle = handle.id, "on_event for unknown channel ignored");
            return;
        };
        match room.members.get_mut(&handle.id) {
            Some(member) => member.listeners.entry(kind).or_default().push(callback),
            None => debug!(handle = handle.id, "on_event for stale handle ignored"),
        }
    }

    async fn unsubscribe(&self, handle: &ChannelHandle) -> Result<(), ChannelError> {
        let must_drain = {
            let mut room = self
                .hub
                .channels
                .get_mut(&handle.channel_name)
                .ok_or(ChannelError::NotSubscribed(handle.id))?;

            let removed = room
                .members
                .remove(&handle.id)
                .ok_or(ChannelError::NotSubscribed(handle.id))?;

            match removed.tracked {
                Some((_, record)) => {
                    let events = [
                        ChannelEvent::Leave {
                            key: removed.key,
                            left_presences: vec![record],
                        },
                        ChannelEvent::Sync {
                            state: full_state(&room.members),
                        },
                    ];
                    room.enqueue(&events)
                }
                None => false,
            }
        };

        debug!(channel = %handle.channel_name, handle = handle.id, "Unsubscribed");
        if must_drain {
            self.hub.drain(&handle.channel_name);
        } else {
            self.hub
                .channels
                .remove_if(&handle.channel_name, |_, room| room.is_idle_and_empty());
        }
        Ok(())
    }
}
