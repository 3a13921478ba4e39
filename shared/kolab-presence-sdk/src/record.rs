//! Presence data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Announced participant status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Online,
    Away,
    Busy,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Away => "away",
            Self::Busy => "busy",
        }
    }
}

/// Page visibility as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

impl Visibility {
    /// Status announced when the page enters this visibility.
    pub fn status(&self) -> Status {
        match self {
            Self::Visible => Status::Online,
            Self::Hidden => Status::Away,
        }
    }
}

/// One participant's announced state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub participant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    pub last_seen_at: DateTime<Utc>,
    pub status: Status,
    #[serde(default)]
    pub location: String,
}

impl PresenceRecord {
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: participant_id.into(),
            display_name: None,
            avatar_ref: None,
            last_seen_at: Utc::now(),
            status: Status::Online,
            location: String::new(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_avatar(mut self, avatar_ref: impl Into<String>) -> Self {
        self.avatar_ref = Some(avatar_ref.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }
}

/// Participant id -> latest record. At most one entry per participant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    participants: HashMap<String, PresenceRecord>,
}

impl PresenceSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a channel's full state. Each key maps to the records it has
    /// announced in delivery order; the last one is the current one.
    pub fn from_state(state: &HashMap<String, Vec<PresenceRecord>>) -> Self {
        let participants = state
            .iter()
            .filter_map(|(key, metas)| metas.last().map(|r| (key.clone(), r.clone())))
            .collect();
        Self { participants }
    }

    /// Last-write-wins insert keyed on `last_seen_at`. Returns false if the
    /// stored record is newer.
    pub fn upsert(&mut self, key: &str, record: PresenceRecord) -> bool {
        match self.participants.get(key) {
            Some(existing) if existing.last_seen_at > record.last_seen_at => false,
            _ => {
                self.participants.insert(key.to_string(), record);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<PresenceRecord> {
        self.participants.remove(key)
    }

    pub fn get(&self, participant_id: &str) -> Option<&PresenceRecord> {
        self.participants.get(participant_id)
    }

    pub fn contains(&self, participant_id: &str) -> bool {
        self.participants.contains_key(participant_id)
    }

    pub fn online_count(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PresenceRecord)> {
        self.participants.iter()
    }
}
