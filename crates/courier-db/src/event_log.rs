use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{SqliteExecutor, SqlitePool};

use courier_core::{Event, EventId, EventLog, EventStatus, Payload, StorageError};

fn db_err(e: sqlx::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

fn encode_err(e: serde_json::Error) -> StorageError {
    StorageError::Encode(format!("payload: {}", e))
}

fn current_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}

const EVENT_COLUMNS: &str = "id, payload, status, attempts, last_error, created_at_ms";

/// Raw `event_log` row.
#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    payload: String,
    status: String,
    attempts: i64,
    last_error: Option<String>,
    created_at_ms: i64,
}

impl TryFrom<EventRow> for Event {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let id = EventId::try_from(row.id)?;
        let payload: Payload = serde_json::from_str(&row.payload)
            .map_err(|e| StorageError::Corrupt(format!("payload of {}: {}", id, e)))?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(row.created_at_ms)
            .ok_or_else(|| StorageError::Corrupt(format!("created_at of {}", id)))?;
        let attempts = u32::try_from(row.attempts)
            .map_err(|_| StorageError::Corrupt(format!("attempts of {}", id)))?;

        Ok(Event {
            id,
            payload,
            status: row.status.parse()?,
            attempts,
            last_error: row.last_error,
            created_at,
        })
    }
}

/// Number of events per status.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct EventCounts {
    pub pending: u64,
    pub done: u64,
    pub failed: u64,
}

/// Append a pending event through any executor.
///
/// Producers pass their open transaction here so the event commits together
/// with the domain write that caused it.
pub async fn append_in<'e, E>(executor: E, payload: &Payload) -> Result<Event, StorageError>
where
    E: SqliteExecutor<'e>,
{
    let now = current_epoch_ms();
    let body = serde_json::to_string(payload).map_err(encode_err)?;

    let row = sqlx::query_as::<_, EventRow>(&format!(
        r#"
        INSERT INTO event_log (event_type, payload, status, attempts, created_at_ms, updated_at_ms)
        VALUES (?, ?, 'pending', 0, ?, ?)
        RETURNING {EVENT_COLUMNS}
        "#
    ))
    .bind(&payload.kind)
    .bind(body)
    .bind(now)
    .bind(now)
    .fetch_one(executor)
    .await
    .map_err(db_err)?;

    row.try_into()
}

/// SQLite implementation of [`EventLog`].
#[derive(Clone)]
pub struct SqliteEventLog {
    pool: SqlitePool,
}

impl SqliteEventLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Fetch a single event by id.
    pub async fn get(&self, id: EventId) -> Result<Option<Event>, StorageError> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM event_log WHERE id = ?"
        ))
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        row.map(Event::try_from).transpose()
    }

    pub async fn counts(&self) -> Result<EventCounts, StorageError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM event_log GROUP BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(db_err)?;

        let mut counts = EventCounts::default();
        for (status, count) in rows {
            let count = count.max(0) as u64;
            match status.parse::<EventStatus>()? {
                EventStatus::Pending => counts.pending = count,
                EventStatus::Done => counts.done = count,
                EventStatus::Failed => counts.failed = count,
            }
        }

        Ok(counts)
    }

    async fn status_of(&self, id: EventId) -> Result<Option<EventStatus>, StorageError> {
        let status: Option<String> = sqlx::query_scalar("SELECT status FROM event_log WHERE id = ?")
            .bind(i64::from(id))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

        status.map(|s| s.parse::<EventStatus>()).transpose()
    }

    /// Dead-letter a pending row that cannot be decoded.
    async fn quarantine(&self, raw_id: i64, err: &StorageError) -> Result<(), StorageError> {
        let reason = err.to_string();
        tracing::warn!(event_id = raw_id, error = %reason, "moving undecodable event to failed");

        sqlx::query(
            r#"
            UPDATE event_log
            SET status = 'failed', last_error = ?, updated_at_ms = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(reason)
        .bind(current_epoch_ms())
        .bind(raw_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Move a pending event to a terminal status. Repeating the same
    /// transition is a no-op.
    async fn settle(
        &self,
        id: EventId,
        to: EventStatus,
        error: Option<&str>,
    ) -> Result<(), StorageError> {
        let result = sqlx::query(
            r#"
            UPDATE event_log
            SET status = ?, last_error = COALESCE(?, last_error), updated_at_ms = ?
            WHERE id = ? AND status = 'pending'
            "#,
        )
        .bind(to.as_str())
        .bind(error)
        .bind(current_epoch_ms())
        .bind(i64::from(id))
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        match self.status_of(id).await? {
            None => Err(StorageError::NotFound(id)),
            Some(status) if status == to => Ok(()),
            Some(status) => Err(StorageError::InvalidTransition { id, status }),
        }
    }
}

impl EventLog for SqliteEventLog {
    /// Rows that no longer decode into an [`Event`] are moved to `failed`
    /// on the way, so they cannot hold back the rows behind them.
    async fn get_oldest_pending(&self) -> Result<Option<Event>, StorageError> {
        loop {
            let row = sqlx::query_as::<_, EventRow>(&format!(
                r#"
                SELECT {EVENT_COLUMNS}
                FROM event_log
                WHERE status = 'pending'
                ORDER BY id ASC
                LIMIT 1
                "#
            ))
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;

            let Some(row) = row else {
                return Ok(None);
            };

            let raw_id = row.id;
            match Event::try_from(row) {
                Ok(event) => return Ok(Some(event)),
                Err(err @ StorageError::Corrupt(_)) => self.quarantine(raw_id, &err).await?,
                Err(err) => return Err(err),
            }
        }
    }

    async fn mark_done(&self, id: EventId) -> Result<(), StorageError> {
        self.settle(id, EventStatus::Done, None).await
    }

    async fn append(&self, payload: Payload) -> Result<Event, StorageError> {
        append_in(&self.pool, &payload).await
    }

    async fn record_failure(&self, id: EventId, error: &str) -> Result<u32, StorageError> {
        let attempts: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE event_log
            SET attempts = attempts + 1, last_error = ?, updated_at_ms = ?
            WHERE id = ? AND status = 'pending'
            RETURNING attempts
            "#,
        )
        .bind(error)
        .bind(current_epoch_ms())
        .bind(i64::from(id))
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match attempts {
            Some(attempts) => u32::try_from(attempts)
                .map_err(|_| StorageError::Corrupt(format!("attempts of {}", id))),
            None => match self.status_of(id).await? {
                None => Err(StorageError::NotFound(id)),
                Some(status) => Err(StorageError::InvalidTransition { id, status }),
            },
        }
    }

    async fn mark_failed(&self, id: EventId, error: &str) -> Result<(), StorageError> {
        self.settle(id, EventStatus::Failed, Some(error)).await
    }
}
