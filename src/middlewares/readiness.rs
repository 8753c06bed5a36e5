use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
};
use tracing::warn;

use crate::database::Readiness;
use crate::models::server::WebServerState;
use crate::utils::response::get_error_response;

/// Holds requests until the store has connected. Rejects them once the store has failed.
pub async fn wait_for_store(
    State(state): State<Arc<WebServerState>>,
    request: Request,
    next: Next,
) -> impl IntoResponse {
    match state.database.wait_ready().await {
        Readiness::Ready => next.run(request).await,
        Readiness::NotReady | Readiness::Failed => {
            warn!("Rejecting {} {}: store unavailable", request.method(), request.uri().path());
            get_error_response(StatusCode::SERVICE_UNAVAILABLE, "Store unavailable").into_response()
        }
    }
}
