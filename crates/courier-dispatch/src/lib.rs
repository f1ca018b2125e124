//! Courier Dispatch - Background delivery of pending events.

pub mod dispatcher;
pub mod senders;
pub mod stats;

pub use dispatcher::{Dispatcher, DispatcherConfig, DispatcherHandle, TickOutcome};
pub use senders::{AnySender, HttpSender, LogSender};
pub use stats::{DispatchStats, DispatcherState, StatsSnapshot};
