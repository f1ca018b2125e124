use std::future::Future;

use crate::error::StorageError;
use crate::event::{Event, EventId, Payload};

/// Append-only log of events with a delivery status.
///
/// Producers only call [`EventLog::append`]; the dispatcher reads the oldest
/// pending event and moves it to a terminal status. The contract is
/// read-then-write, which is sound only while a single dispatcher runs
/// against the log.
pub trait EventLog: Send + Sync {
    /// The oldest pending event, or `None` when nothing is pending.
    fn get_oldest_pending(
        &self,
    ) -> impl Future<Output = Result<Option<Event>, StorageError>> + Send;

    /// Move an event from pending to done. Marking a done event again is not
    /// an error.
    fn mark_done(&self, id: EventId) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Insert a new pending event and return it with its assigned id.
    fn append(&self, payload: Payload) -> impl Future<Output = Result<Event, StorageError>> + Send;

    /// Record a failed delivery attempt. Returns the attempt count after the
    /// increment.
    fn record_failure(
        &self,
        id: EventId,
        error: &str,
    ) -> impl Future<Output = Result<u32, StorageError>> + Send;

    /// Move a pending event to the dead-letter status.
    fn mark_failed(
        &self,
        id: EventId,
        error: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

#[cfg(any(test, feature = "test-utils"))]
pub mod memory {
    use super::*;
    use crate::event::EventStatus;
    use chrono::Utc;
    use std::sync::RwLock;

    /// In-memory event log for testing.
    #[derive(Default)]
    pub struct InMemoryEventLog {
        events: RwLock<Vec<Event>>,
        last_id: RwLock<u64>,
    }

    impl InMemoryEventLog {
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of a single event.
        pub fn get(&self, id: EventId) -> Option<Event> {
            self.events
                .read()
                .unwrap()
                .iter()
                .find(|e| e.id == id)
                .cloned()
        }

        fn transition(
            &self,
            id: EventId,
            to: EventStatus,
            error: Option<&str>,
        ) -> Result<(), StorageError> {
            let mut events = self.events.write().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(StorageError::NotFound(id))?;

            let current = event.status;
            match current {
                EventStatus::Pending => {
                    event.status = to;
                    if let Some(error) = error {
                        event.last_error = Some(error.to_string());
                    }
                    Ok(())
                }
                status if status == to => Ok(()),
                status => Err(StorageError::InvalidTransition { id, status }),
            }
        }
    }

    impl EventLog for InMemoryEventLog {
        async fn get_oldest_pending(&self) -> Result<Option<Event>, StorageError> {
            let events = self.events.read().unwrap();
            Ok(events
                .iter()
                .find(|e| e.status == EventStatus::Pending)
                .cloned())
        }

        async fn mark_done(&self, id: EventId) -> Result<(), StorageError> {
            self.transition(id, EventStatus::Done, None)
        }

        async fn append(&self, payload: Payload) -> Result<Event, StorageError> {
            let mut events = self.events.write().unwrap();
            let mut last_id = self.last_id.write().unwrap();

            *last_id += 1;
            let id = EventId::new(*last_id)
                .ok_or_else(|| StorageError::Database("id sequence overflow".to_string()))?;

            let event = Event::pending(id, payload, Utc::now());
            events.push(event.clone());
            Ok(event)
        }

        async fn record_failure(&self, id: EventId, error: &str) -> Result<u32, StorageError> {
            let mut events = self.events.write().unwrap();
            let event = events
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(StorageError::NotFound(id))?;

            if event.status != EventStatus::Pending {
                return Err(StorageError::InvalidTransition {
                    id,
                    status: event.status,
                });
            }

            event.attempts += 1;
            event.last_error = Some(error.to_string());
            Ok(event.attempts)
        }

        async fn mark_failed(&self, id: EventId, error: &str) -> Result<(), StorageError> {
            self.transition(id, EventStatus::Failed, Some(error))
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_append_assigns_increasing_ids() {
            let log = InMemoryEventLog::new();

            let a = log.append(Payload::url_saved("a")).await.unwrap();
            let b = log.append(Payload::url_saved("b")).await.unwrap();

            assert_eq!(a.id.get(), 1);
            assert_eq!(b.id.get(), 2);
            assert_eq!(a.status, EventStatus::Pending);
        }

        #[tokio::test]
        async fn test_oldest_pending_follows_insertion_order() {
            let log = InMemoryEventLog::new();
            let a = log.append(Payload::url_saved("a")).await.unwrap();
            let b = log.append(Payload::url_deleted("a")).await.unwrap();

            assert_eq!(log.get_oldest_pending().await.unwrap().unwrap().id, a.id);
            log.mark_done(a.id).await.unwrap();
            assert_eq!(log.get_oldest_pending().await.unwrap().unwrap().id, b.id);
        }

        #[tokio::test]
        async fn test_only_done_events_yields_none() {
            let log = InMemoryEventLog::new();
            let a = log.append(Payload::url_saved("a")).await.unwrap();
            log.mark_done(a.id).await.unwrap();

            assert!(log.get_oldest_pending().await.unwrap().is_none());
        }

        #[tokio::test]
        async fn test_mark_done_is_idempotent() {
            let log = InMemoryEventLog::new();
            let a = log.append(Payload::url_saved("a")).await.unwrap();

            log.mark_done(a.id).await.unwrap();
            log.mark_done(a.id).await.unwrap();
            assert_eq!(log.get(a.id).unwrap().status, EventStatus::Done);
        }

        #[tokio::test]
        async fn test_mark_done_unknown_id() {
            let log = InMemoryEventLog::new();
            let id = EventId::new(99).unwrap();

            assert_eq!(log.mark_done(id).await, Err(StorageError::NotFound(id)));
        }

        #[tokio::test]
        async fn test_failed_is_terminal() {
            let log = InMemoryEventLog::new();
            let a = log.append(Payload::url_saved("a")).await.unwrap();

            assert_eq!(log.record_failure(a.id, "boom").await.unwrap(), 1);
            log.mark_failed(a.id, "boom").await.unwrap();
            log.mark_failed(a.id, "boom").await.unwrap();

            assert!(matches!(
                log.mark_done(a.id).await,
                Err(StorageError::InvalidTransition { .. })
            ));
            assert!(log.get_oldest_pending().await.unwrap().is_none());
        }
    }
}
