//! Courier Core - Event model, event log and sender contracts.
//!
//! This crate has no dependencies on other Courier crates. Storage backends
//! implement [`EventLog`], delivery mechanisms implement [`Sender`].

pub mod error;
pub mod event;
pub mod log;
pub mod retry;
pub mod sender;

pub use error::{DeliveryError, StorageError};
pub use event::{Event, EventId, EventStatus, Payload};
pub use log::EventLog;
pub use retry::RetryPolicy;
pub use sender::Sender;

#[cfg(any(test, feature = "test-utils"))]
pub use log::memory::InMemoryEventLog;
