use std::sync::Arc;

use courier_db::SqliteEventLog;
use courier_dispatch::DispatchStats;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub event_log: Arc<SqliteEventLog>,
    pub stats: Arc<DispatchStats>,
}

impl AppState {
    pub fn new(event_log: Arc<SqliteEventLog>, stats: Arc<DispatchStats>) -> Self {
        Self { event_log, stats }
    }
}
