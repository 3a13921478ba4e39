//! Presence Tracker
//!
//! Owns the local [`PresenceSnapshot`] for one mounted room. The snapshot is
//! only ever mutated from channel events, and only while the subscription
//! that registered the callbacks is still the current one.

use kolab_core::{Clock, SystemClock};
use kolab_guard::sanitize_location;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::channel::{
    presence_channel_name, ChannelEvent, ChannelHandle, EventCallback, EventKind, PresenceChannel,
};
use crate::record::{PresenceRecord, PresenceSnapshot, Status, Visibility};

/// Lifecycle of one tracker. `Failed` and `Left` are terminal for the
/// mount; remount (build a new tracker) to retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerPhase {
    Idle,
    Joining,
    Joined,
    Failed,
    Left,
}

struct TrackerState {
    phase: TrackerPhase,
    handle: Option<ChannelHandle>,
    self_record: Option<PresenceRecord>,
    snapshot: PresenceSnapshot,
}

struct Shared {
    state: Mutex<TrackerState>,
    snapshot_tx: watch::Sender<PresenceSnapshot>,
    full_sync: bool,
}

pub struct PresenceTracker {
    channel: Arc<dyn PresenceChannel>,
    clock: Arc<dyn Clock>,
    shared: Arc<Shared>,
}

impl PresenceTracker {
    pub fn new(channel: Arc<dyn PresenceChannel>) -> Self {
        Self::with_clock(channel, Arc::new(SystemClock))
    }

    pub fn with_clock(channel: Arc<dyn PresenceChannel>, clock: Arc<dyn Clock>) -> Self {
        let (snapshot_tx, _) = watch::channel(PresenceSnapshot::new());
        let full_sync = channel.supports_full_sync();
        Self {
            channel,
            clock,
            shared: Arc::new(Shared {
                state: Mutex::new(TrackerState {
                    phase: TrackerPhase::Idle,
                    handle: None,
                    self_record: None,
                    snapshot: PresenceSnapshot::new(),
                }),
                snapshot_tx,
                full_sync,
            }),
        }
    }

    /// Subscribe to `room` and announce `self_record` as online.
    ///
    /// Returns whether the subscription succeeded. A failed publish after a
    /// successful subscribe is logged and still counts as joined.
    pub async fn join(&self, room: &str, self_record: PresenceRecord) -> bool {
        {
            let mut state = self.shared.state.lock();
            if state.phase != TrackerPhase::Idle {
                warn!(room, phase = ?state.phase, "join ignored, tracker already used");
                return false;
            }
            state.phase = TrackerPhase::Joining;
        }

        let channel_name = presence_channel_name(room);
        let handle = match self
            .channel
            .subscribe(&channel_name, &self_record.participant_id)
            .await
        {
            Ok(handle) => handle,
            Err(e) => {
                warn!(room, error = %e, "Presence subscription failed");
                let mut state = self.shared.state.lock();
                if state.phase == TrackerPhase::Joining {
                    state.phase = TrackerPhase::Failed;
                }
                return false;
            }
        };

        for kind in [EventKind::Sync, EventKind::Join, EventKind::Leave] {
            self.channel
                .on_event(&handle, kind, self.event_callback(handle.id));
        }

        let record = PresenceRecord {
            status: Status::Online,
            location: sanitize_location(&self_record.location),
            last_seen_at: self.clock.now(),
            ..self_record
        };

        let still_joining = {
            let mut state = self.shared.state.lock();
            if state.phase == TrackerPhase::Joining {
                state.phase = TrackerPhase::Joined;
                state.handle = Some(handle.clone());
                state.self_record = Some(record.clone());
                true
            } else {
                false
            }
        };
        if !still_joining {
            // left while the subscribe was in flight
            self.release(&handle).await;
            return false;
        }

        info!(room, participant = %record.participant_id, "Joined presence room");

        if let Err(e) = self.channel.track(&handle, &record).await {
            warn!(room, error = %e, "Initial presence announce failed");
        }
        true
    }

    /// Re-publish the local record with a new status and location.
    /// Returns false (and logs) when not joined or the publish fails.
    pub async fn announce(&self, status: Status, location: &str) -> bool {
        let (handle, record) = {
            let mut state = self.shared.state.lock();
            let (Some(handle), Some(previous)) = (state.handle.clone(), state.self_record.as_ref())
            else {
                warn!(status = status.as_str(), "announce ignored, not joined");
                return false;
            };
            if state.phase != TrackerPhase::Joined {
                warn!(status = status.as_str(), "announce ignored, not joined");
                return false;
            }

            let now = self.clock.now();
            let record = PresenceRecord {
                status,
                location: sanitize_location(location),
                last_seen_at: now.max(previous.last_seen_at),
                ..previous.clone()
            };
            state.self_record = Some(record.clone());
            (handle, record)
        };

        let result = self.channel.track(&handle, &record).await;

        if !self.is_current(&handle) {
            debug!("announce result dropped, tracker left");
            return false;
        }
        match result {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, status = status.as_str(), "Presence announce failed");
                false
            }
        }
    }

    /// Change status, keeping the current location.
    pub async fn update_status(&self, status: Status) -> bool {
        let location = self.current_location();
        self.announce(status, &location).await
    }

    /// Host callback for page visibility changes.
    pub async fn on_visibility_change(&self, visibility: Visibility) -> bool {
        debug!(?visibility, "Visibility changed");
        self.update_status(visibility.status()).await
    }

    /// Unsubscribe and discard the snapshot.
    pub async fn leave(&self) {
        let handle = {
            let mut state = self.shared.state.lock();
            state.phase = TrackerPhase::Left;
            state.self_record = None;
            state.snapshot = PresenceSnapshot::new();
            state.handle.take()
        };
        self.shared.snapshot_tx.send_replace(PresenceSnapshot::new());

        if let Some(handle) = handle {
            self.release(&handle).await;
            info!(channel = %handle.channel_name, "Left presence room");
        }
    }

    pub fn phase(&self) -> TrackerPhase {
        self.shared.state.lock().phase.clone()
    }

    pub fn presences(&self) -> PresenceSnapshot {
        self.shared.state.lock().snapshot.clone()
    }

    pub fn online_count(&self) -> usize {
        self.shared.state.lock().snapshot.online_count()
    }

    pub fn is_online(&self, participant_id: &str) -> bool {
        self.shared.state.lock().snapshot.contains(participant_id)
    }

    pub fn self_record(&self) -> Option<PresenceRecord> {
        self.shared.state.lock().self_record.clone()
    }

    /// Receiver updated after every applied channel event.
    pub fn watch(&self) -> watch::Receiver<PresenceSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    fn current_location(&self) -> String {
        self.shared
            .state
            .lock()
            .self_record
            .as_ref()
            .map(|r| r.location.clone())
            .unwrap_or_default()
    }

    fn is_current(&self, handle: &ChannelHandle) -> bool {
        let state = self.shared.state.lock();
        state.phase == TrackerPhase::Joined && state.handle.as_ref() == Some(handle)
    }

    async fn release(&self, handle: &ChannelHandle) {
        if let Err(e) = self.channel.unsubscribe(handle).await {
            warn!(error = %e, "Presence unsubscribe failed");
        }
    }

    fn event_callback(&self, handle_id: u64) -> EventCallback {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move |event: ChannelEvent| {
            if let Some(shared) = shared.upgrade() {
                shared.apply(handle_id, event);
            }
        })
    }
}

impl Shared {
    fn apply(&self, handle_id: u64, event: ChannelEvent) {
        let snapshot = {
            let mut state = self.state.lock();
            let current = state.handle.as_ref().map(|h| h.id);
            // events for a subscription we are still joining are accepted:
            // the hub may deliver the first sync before join() records the handle
            let accept = match state.phase {
                TrackerPhase::Joined => current == Some(handle_id),
                TrackerPhase::Joining => true,
                _ => false,
            };
            if !accept {
                return;
            }

            match event {
                ChannelEvent::Sync { state: full } => {
                    state.snapshot = PresenceSnapshot::from_state(&full);
                }
                ChannelEvent::Join { key, new_presences } => {
                    debug!(%key, count = new_presences.len(), "Presence join");
                    if self.full_sync {
                        return;
                    }
                    if let Some(record) = new_presences.into_iter().last() {
                        state.snapshot.upsert(&key, record);
                    }
                }
                ChannelEvent::Leave { key, left_presences } => {
                    debug!(%key, count = left_presences.len(), "Presence leave");
                    if self.full_sync {
                        return;
                    }
                    state.snapshot.remove(&key);
                }
            }
            state.snapshot.clone()
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        let handle = {
            let mut state = self.shared.state.lock();
            state.phase = TrackerPhase::Left;
            state.handle.take()
        };
        let Some(handle) = handle else {
            return;
        };

        // unmount without leave(): release the subscription in the background
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let channel = self.channel.clone();
                runtime.spawn(async move {
                    if let Err(e) = channel.unsubscribe(&handle).await {
                        warn!(error = %e, "Presence unsubscribe on drop failed");
                    } else {
                        debug!(channel = %handle.channel_name, "Released presence subscription on drop");
                    }
                });
            }
            Err(_) => {
                warn!(
                    channel = %handle.channel_name,
                    "Tracker dropped outside a runtime, subscription left open"
                );
            }
        }
    }
}
