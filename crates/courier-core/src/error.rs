use std::time::Duration;

use thiserror::Error;

use crate::event::{EventId, EventStatus};

/// Errors surfaced by an event log.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The backing store could not be reached or rejected the query.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Event not found: {0}")]
    NotFound(EventId),

    #[error("Event {id} is {status} and cannot change status")]
    InvalidTransition { id: EventId, status: EventStatus },

    /// A stored row could not be turned back into an event.
    #[error("Corrupt event row: {0}")]
    Corrupt(String),

    /// An event could not be serialized for storage.
    #[error("Encode error: {0}")]
    Encode(String),
}

impl StorageError {
    /// True when the error points at a data-integrity problem rather than an
    /// unavailable store.
    pub fn is_inconsistent_state(&self) -> bool {
        matches!(
            self,
            StorageError::NotFound(_) | StorageError::InvalidTransition { .. }
        )
    }
}

/// Errors returned by a sender for a single delivery attempt.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeliveryError {
    #[error("Delivery rejected: {0}")]
    Rejected(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Delivery timed out after {0:?}")]
    Timeout(Duration),
}
