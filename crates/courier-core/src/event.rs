use std::num::NonZeroU64;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Identifier assigned by the event log on insertion.
///
/// Ids are strictly increasing and never zero, so "no event" is always
/// expressed as `Option::None` and never as a zeroed id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(NonZeroU64);

impl EventId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<i64> for EventId {
    type Error = StorageError;

    /// Convert a database row id. Zero and negative values are rejected.
    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        u64::try_from(raw)
            .ok()
            .and_then(EventId::new)
            .ok_or_else(|| StorageError::Corrupt(format!("invalid event id {}", raw)))
    }
}

impl From<EventId> for i64 {
    fn from(id: EventId) -> Self {
        id.get() as i64
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "event-{}", self.0)
    }
}

/// Delivery status of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Done,
    /// Dead-lettered after exhausting the retry policy.
    Failed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Done => "done",
            EventStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Pending)
    }
}

impl std::fmt::Display for EventStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventStatus {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(EventStatus::Pending),
            "done" => Ok(EventStatus::Done),
            "failed" => Ok(EventStatus::Failed),
            other => Err(StorageError::Corrupt(format!("unknown status {:?}", other))),
        }
    }
}

/// What happened in the domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Event type, e.g. `url.saved`.
    pub kind: String,
    /// Identifier of the thing the event is about (an alias for URL events).
    pub subject: String,
    pub occurred_at: DateTime<Utc>,
}

impl Payload {
    pub const URL_SAVED: &'static str = "url.saved";
    pub const URL_DELETED: &'static str = "url.deleted";

    pub fn new(kind: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            subject: subject.into(),
            occurred_at: Utc::now(),
        }
    }

    pub fn url_saved(alias: impl Into<String>) -> Self {
        Self::new(Self::URL_SAVED, alias)
    }

    pub fn url_deleted(alias: impl Into<String>) -> Self {
        Self::new(Self::URL_DELETED, alias)
    }
}

/// A persisted event awaiting (or done with) delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub payload: Payload,
    pub status: EventStatus,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// A freshly appended event.
    pub fn pending(id: EventId, payload: Payload, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            payload,
            status: EventStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_id_rejects_zero() {
        assert!(EventId::new(0).is_none());
        assert!(EventId::try_from(0i64).is_err());
        assert!(EventId::try_from(-3i64).is_err());
        assert_eq!(EventId::try_from(7i64).unwrap().get(), 7);
    }

    #[test]
    fn test_event_id_display() {
        let id = EventId::new(42).unwrap();
        assert_eq!(id.to_string(), "event-42");
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [EventStatus::Pending, EventStatus::Done, EventStatus::Failed] {
            assert_eq!(status.as_str().parse::<EventStatus>().unwrap(), status);
        }
        assert!("archived".parse::<EventStatus>().is_err());
    }

    #[test]
    fn test_only_pending_is_not_terminal() {
        assert!(!EventStatus::Pending.is_terminal());
        assert!(EventStatus::Done.is_terminal());
        assert!(EventStatus::Failed.is_terminal());
    }

    #[test]
    fn test_url_payloads() {
        let saved = Payload::url_saved("abc123");
        assert_eq!(saved.kind, "url.saved");
        assert_eq!(saved.subject, "abc123");

        let deleted = Payload::url_deleted("abc123");
        assert_eq!(deleted.kind, "url.deleted");
    }

    #[test]
    fn test_event_serializes_id_as_number() {
        let event = Event::pending(
            EventId::new(5).unwrap(),
            Payload::url_saved("xyz"),
            Utc::now(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["id"], 5);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["payload"]["subject"], "xyz");
    }
}
