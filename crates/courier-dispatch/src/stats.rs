use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use serde::Serialize;

use crate::dispatcher::TickOutcome;

/// Where the dispatcher loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatcherState {
    /// Waiting for the next tick or for cancellation.
    Idle,
    /// Handling at most one event.
    Dispatching,
    /// Cancelled; no further ticks run.
    Stopped,
}

impl DispatcherState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => DispatcherState::Dispatching,
            2 => DispatcherState::Stopped,
            _ => DispatcherState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            DispatcherState::Idle => 0,
            DispatcherState::Dispatching => 1,
            DispatcherState::Stopped => 2,
        }
    }
}

/// Counters shared between the dispatcher task and whoever observes it.
#[derive(Debug, Default)]
pub struct DispatchStats {
    state: AtomicU8,
    ticks: AtomicU64,
    delivered: AtomicU64,
    unmarked_deliveries: AtomicU64,
    delivery_failures: AtomicU64,
    dead_lettered: AtomicU64,
    storage_errors: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub state: DispatcherState,
    pub ticks: u64,
    pub delivered: u64,
    /// Sent but not marked done; these events will be sent again.
    pub unmarked_deliveries: u64,
    pub delivery_failures: u64,
    pub dead_lettered: u64,
    pub storage_errors: u64,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> DispatcherState {
        DispatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: DispatcherState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn record(&self, outcome: &TickOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);

        let counter = match outcome {
            TickOutcome::Delivered(_) => &self.delivered,
            TickOutcome::DeliveredNotMarked(_) => &self.unmarked_deliveries,
            TickOutcome::DeliveryFailed { .. } => &self.delivery_failures,
            TickOutcome::DeadLettered(_) => &self.dead_lettered,
            TickOutcome::StorageUnavailable => &self.storage_errors,
            TickOutcome::NoPendingEvents | TickOutcome::BackingOff => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            state: self.state(),
            ticks: self.ticks.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            unmarked_deliveries: self.unmarked_deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            dead_lettered: self.dead_lettered.load(Ordering::Relaxed),
            storage_errors: self.storage_errors.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::EventId;

    #[test]
    fn test_starts_idle() {
        let stats = DispatchStats::new();
        assert_eq!(stats.state(), DispatcherState::Idle);
        assert_eq!(stats.snapshot().ticks, 0);
    }

    #[test]
    fn test_record_counts_outcomes() {
        let stats = DispatchStats::new();
        let id = EventId::new(1).unwrap();

        stats.record(&TickOutcome::NoPendingEvents);
        stats.record(&TickOutcome::Delivered(id));
        stats.record(&TickOutcome::DeliveryFailed { id, attempts: 1 });
        stats.record(&TickOutcome::StorageUnavailable);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.ticks, 4);
        assert_eq!(snapshot.delivered, 1);
        assert_eq!(snapshot.delivery_failures, 1);
        assert_eq!(snapshot.storage_errors, 1);
        assert_eq!(snapshot.dead_lettered, 0);
    }

    #[test]
    fn test_state_round_trip() {
        let stats = DispatchStats::new();
        stats.set_state(DispatcherState::Stopped);
        assert_eq!(stats.state(), DispatcherState::Stopped);
    }
}
