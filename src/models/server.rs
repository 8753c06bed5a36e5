use serde::Serialize;
use std::sync::Arc;

use crate::database::Database;
use crate::utils::logging::LogBuffer;

pub struct WebServerState {
    pub database: Arc<Database>,
    pub logs: LogBuffer,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Serialize)]
pub struct LogsResponse {
    pub logs: Vec<String>,
}
