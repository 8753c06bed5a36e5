use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{post, MethodRouter},
    Json,
};
use tracing::{error, info};

use crate::models::error::FirewallError;
use crate::models::rule::{RuleType, RulesDTO, RulesResponse, UpdateRulesDTO, UpdatedRulesResponse};
use crate::models::server::WebServerState;
use crate::services::firewall;
use crate::utils::response::get_json_response;

type SharedState = Arc<WebServerState>;

/// POST and DELETE handlers bound to one rule type.
pub fn rule_type_routes(rule_type: RuleType) -> MethodRouter<SharedState> {
    post(
        move |state: State<SharedState>, payload: Result<Json<RulesDTO>, JsonRejection>| {
            add_rules(rule_type, state, payload)
        },
    )
    .delete(
        move |state: State<SharedState>, payload: Result<Json<RulesDTO>, JsonRejection>| {
            remove_rules(rule_type, state, payload)
        },
    )
}

fn parse_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, FirewallError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| FirewallError::InvalidRequest(rejection.body_text()))
}

pub async fn add_rules(
    rule_type: RuleType,
    State(state): State<SharedState>,
    payload: Result<Json<RulesDTO>, JsonRejection>,
) -> Result<impl IntoResponse, FirewallError> {
    info!("POST /{rule_type}");
    let dto = parse_body(payload).inspect_err(|e| error!("Failed to add {rule_type} rules: {e}"))?;
    if dto.values.is_empty() {
        return Err(FirewallError::InvalidRequest("values must not be empty".to_string()));
    }

    firewall::add_rules(&state.database, &dto.values, rule_type, dto.mode)
        .await
        .inspect_err(|e| error!("Failed to add {rule_type} rules: {e}"))?;

    info!("{} {rule_type} rules added to {}", dto.values.len(), dto.mode);
    Ok(get_json_response(
        StatusCode::OK,
        RulesResponse {
            rule_type,
            mode: dto.mode,
            values: dto.values,
            status: "success",
        },
    ))
}

pub async fn remove_rules(
    rule_type: RuleType,
    State(state): State<SharedState>,
    payload: Result<Json<RulesDTO>, JsonRejection>,
) -> Result<impl IntoResponse, FirewallError> {
    info!("DELETE /{rule_type}");
    let dto = parse_body(payload).inspect_err(|e| error!("Failed to remove {rule_type} rules: {e}"))?;

    let removed = firewall::remove_rules(&state.database, &dto.values, rule_type, dto.mode)
        .await
        .inspect_err(|e| error!("Failed to remove {rule_type} rules: {e}"))?;

    if removed.is_empty() {
        error!("Failed to remove {rule_type} rules: no rules removed");
        return Err(FirewallError::NotFound("Remove failed: no matching rules".to_string()));
    }

    info!("{} {rule_type} rules removed from {}", removed.len(), dto.mode);
    Ok(get_json_response(
        StatusCode::OK,
        RulesResponse {
            rule_type,
            mode: dto.mode,
            values: dto.values,
            status: "success",
        },
    ))
}

pub async fn get_all_rules(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, FirewallError> {
    info!("GET /rules");
    let rules = firewall::get_all_rules(&state.database)
        .await
        .inspect_err(|e| error!("Failed to fetch rules: {e}"))?;

    Ok(get_json_response(StatusCode::OK, rules))
}

pub async fn update_rules(
    State(state): State<SharedState>,
    payload: Result<Json<UpdateRulesDTO>, JsonRejection>,
) -> Result<impl IntoResponse, FirewallError> {
    info!("PUT /rules");
    let updates = parse_body(payload)
        .inspect_err(|e| error!("Failed to update rules: {e}"))?
        .into_updates();

    let updated = firewall::update_rule_statuses(&state.database, updates)
        .await
        .inspect_err(|e| error!("Failed to update rules: {e}"))?;

    if updated.is_empty() {
        error!("Failed to update rules: no rules updated");
        return Err(FirewallError::NotFound("Update failed: no rules updated".to_string()));
    }

    info!("{} rules updated", updated.len());
    Ok(get_json_response(StatusCode::OK, UpdatedRulesResponse { updated }))
}
