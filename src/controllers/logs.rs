use std::sync::Arc;

use axum::{extract::State, Json};

use crate::models::server::{LogsResponse, WebServerState};

/// Lines returned by `GET /logs`.
pub const LOG_TAIL_LINES: usize = 50;

pub async fn get_logs(State(state): State<Arc<WebServerState>>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: state.logs.recent(LOG_TAIL_LINES),
    })
}
