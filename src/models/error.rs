use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use rusqlite::ErrorCode;
use thiserror::Error;

use super::rule::RuleType;
use crate::utils::response::get_error_response;

#[derive(Error, Debug)]
pub enum FirewallError {
    #[error("Invalid {}: {value}", .rule_type.label())]
    Validation { rule_type: RuleType, value: String },

    #[error("Rule already exists: {value}")]
    Duplicate { value: String },

    #[error("{0}")]
    NotFound(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl FirewallError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            FirewallError::Validation { .. }
            | FirewallError::Duplicate { .. }
            | FirewallError::NotFound(_)
            | FirewallError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            FirewallError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for FirewallError {
    fn from(e: rusqlite::Error) -> Self {
        FirewallError::StoreUnavailable(e.to_string())
    }
}

/// True when the error comes from a UNIQUE constraint.
pub(crate) fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
    )
}

impl IntoResponse for FirewallError {
    fn into_response(self) -> Response {
        get_error_response(self.status_code(), &self.to_string()).into_response()
    }
}
