use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use courier_core::{DeliveryError, Event, EventId, EventLog, RetryPolicy, Sender};

use crate::stats::{DispatchStats, DispatcherState};

/// Settings for a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Time between two dispatch attempts. One event is handled per tick.
    pub tick_interval: Duration,
    /// Upper bound for a single sender call. `None` waits forever.
    pub send_timeout: Option<Duration>,
    pub retry: RetryPolicy,
}

impl DispatcherConfig {
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            tick_interval,
            ..Self::default()
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_secs(5),
            send_timeout: Some(Duration::from_secs(10)),
            retry: RetryPolicy::default(),
        }
    }
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    NoPendingEvents,
    Delivered(EventId),
    /// The sender succeeded but the event is still pending in the log, so it
    /// will be sent again on a later tick.
    DeliveredNotMarked(EventId),
    DeliveryFailed { id: EventId, attempts: u32 },
    /// Moved to the failed status after exhausting the retry policy.
    DeadLettered(EventId),
    /// The head event is waiting out its retry delay.
    BackingOff,
    /// The log could not be read.
    StorageUnavailable,
}

/// Retry delay for the event at the head of the log.
#[derive(Debug, Clone, Copy)]
struct Backoff {
    id: EventId,
    failures: u32,
    until: Instant,
}

/// Moves pending events to the sender, one per tick, oldest first.
///
/// There must be only one dispatcher per event log: the log is read and then
/// updated without a claim, so two dispatchers would send the same event.
pub struct Dispatcher<L, S>
where
    L: EventLog,
    S: Sender,
{
    log: Arc<L>,
    sender: Arc<S>,
    config: DispatcherConfig,
    stats: Arc<DispatchStats>,
    backoff: Option<Backoff>,
}

impl<L, S> Dispatcher<L, S>
where
    L: EventLog + 'static,
    S: Sender + 'static,
{
    pub fn new(log: Arc<L>, sender: Arc<S>, config: DispatcherConfig) -> Self {
        Self {
            log,
            sender,
            config,
            stats: Arc::new(DispatchStats::new()),
            backoff: None,
        }
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    /// Spawn the dispatch loop and return right away.
    ///
    /// The loop runs until `cancel` fires or the returned handle is stopped.
    pub fn start(self, cancel: CancellationToken) -> DispatcherHandle {
        let stats = self.stats.clone();
        let task = tokio::spawn(self.run(cancel.clone()));

        DispatcherHandle {
            cancel,
            task,
            stats,
        }
    }

    /// Run the dispatch loop on the current task until cancelled.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.config.tick_interval.max(Duration::from_millis(1));
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(tick_interval_ms = period.as_millis() as u64, "starting event processing");

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.tick().await;
        }

        self.stats.set_state(DispatcherState::Stopped);
        tracing::info!("stopping event processing");
    }

    /// Handle at most one pending event.
    pub async fn tick(&mut self) -> TickOutcome {
        self.stats.set_state(DispatcherState::Dispatching);
        let outcome = self.dispatch_next().await;
        self.stats.record(&outcome);
        self.stats.set_state(DispatcherState::Idle);
        outcome
    }

    async fn dispatch_next(&mut self) -> TickOutcome {
        if let Some(backoff) = self.backoff {
            if Instant::now() < backoff.until {
                tracing::debug!(event_id = %backoff.id, failures = backoff.failures, "waiting before retry");
                return TickOutcome::BackingOff;
            }
        }

        let event = match self.log.get_oldest_pending().await {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!("no new events");
                return TickOutcome::NoPendingEvents;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to get new event");
                return TickOutcome::StorageUnavailable;
            }
        };

        match self.deliver(&event).await {
            Ok(()) => {
                self.backoff = None;
                self.mark_done(event.id).await
            }
            Err(e) => self.handle_failure(&event, e).await,
        }
    }

    async fn deliver(&self, event: &Event) -> Result<(), DeliveryError> {
        match self.config.send_timeout {
            Some(limit) => timeout(limit, self.sender.send(event))
                .await
                .unwrap_or(Err(DeliveryError::Timeout(limit))),
            None => self.sender.send(event).await,
        }
    }

    async fn mark_done(&self, id: EventId) -> TickOutcome {
        match self.log.mark_done(id).await {
            Ok(()) => {
                tracing::info!(event_id = %id, "event sent");
                TickOutcome::Delivered(id)
            }
            Err(e) if e.is_inconsistent_state() => {
                tracing::error!(event_id = %id, error = %e, "sent event is in an inconsistent state");
                TickOutcome::DeliveredNotMarked(id)
            }
            Err(e) => {
                tracing::error!(event_id = %id, error = %e, "failed to set event done, it will be sent again");
                TickOutcome::DeliveredNotMarked(id)
            }
        }
    }

    async fn handle_failure(&mut self, event: &Event, error: DeliveryError) -> TickOutcome {
        let id = event.id;
        let message = error.to_string();
        tracing::warn!(event_id = %id, error = %message, "failed to send event");

        let streak = match self.backoff {
            Some(backoff) if backoff.id == id => backoff.failures + 1,
            _ => 1,
        };

        let attempts = match self.log.record_failure(id, &message).await {
            Ok(attempts) => attempts,
            Err(e) => {
                tracing::error!(event_id = %id, error = %e, "failed to record delivery attempt");
                // Dead-lettering is decided on the persisted count only.
                self.schedule_retry(id, streak);
                return TickOutcome::DeliveryFailed {
                    id,
                    attempts: streak,
                };
            }
        };

        if self.config.retry.is_exhausted(attempts) {
            match self.log.mark_failed(id, &message).await {
                Ok(()) => {
                    self.backoff = None;
                    tracing::error!(event_id = %id, attempts, "giving up on event, moved to failed");
                    return TickOutcome::DeadLettered(id);
                }
                Err(e) => {
                    tracing::error!(event_id = %id, error = %e, "failed to dead-letter event");
                }
            }
        }

        self.schedule_retry(id, attempts);
        TickOutcome::DeliveryFailed { id, attempts }
    }

    fn schedule_retry(&mut self, id: EventId, failures: u32) {
        let delay = self.config.retry.delay_for(failures);
        if !delay.is_zero() {
            tracing::debug!(event_id = %id, delay_ms = delay.as_millis() as u64, "retry scheduled");
        }

        self.backoff = Some(Backoff {
            id,
            failures,
            until: Instant::now() + delay,
        });
    }
}

/// Owner of a running dispatcher task.
pub struct DispatcherHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
    stats: Arc<DispatchStats>,
}

impl DispatcherHandle {
    pub fn state(&self) -> DispatcherState {
        self.stats.state()
    }

    pub fn stats(&self) -> Arc<DispatchStats> {
        self.stats.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancel the loop and wait for it to exit. A send in progress is allowed
    /// to finish; its event stays pending if it did not reach done.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "event dispatcher task failed");
        }
    }
}
