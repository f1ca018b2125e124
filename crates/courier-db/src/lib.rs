//! Courier DB - SQLite implementation of the event log.

pub mod event_log;

pub use event_log::{append_in, EventCounts, SqliteEventLog};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

/// Initialize database connection pool with recommended pragmas.
///
/// WAL mode lets producers append while the dispatcher reads; the busy timeout
/// keeps a locked database from blocking a caller forever.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .synchronous(SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
}

/// Run database migrations.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(include_str!("../migrations/001_create_event_log.sql"))
        .execute(pool)
        .await?;
    tracing::debug!("event_log schema is up to date");
    Ok(())
}
