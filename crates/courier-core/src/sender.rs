use std::future::Future;

use crate::error::DeliveryError;
use crate::event::Event;

/// Delivers one event to an external system.
///
/// A call either succeeds or fails as a whole. The dispatcher may call it more
/// than once for the same event, so the receiving side has to tolerate
/// duplicates (the event id is stable across retries).
pub trait Sender: Send + Sync {
    fn send(&self, event: &Event) -> impl Future<Output = Result<(), DeliveryError>> + Send;
}
