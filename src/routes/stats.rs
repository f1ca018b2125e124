use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use courier_db::EventCounts;
use courier_dispatch::StatsSnapshot;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub dispatcher: StatsSnapshot,
    pub events: EventCounts,
}

/// GET /stats - Dispatcher counters and event backlog.
pub async fn get_stats(State(state): State<AppState>) -> Response {
    match state.event_log.counts().await {
        Ok(events) => Json(StatsResponse {
            dispatcher: state.stats.snapshot(),
            events,
        })
        .into_response(),
        Err(e) => {
            tracing::error!("Failed to count events: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
            )
                .into_response()
        }
    }
}
