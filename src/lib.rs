pub mod controllers;
pub mod database;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::Router;
use controllers::logs::get_logs;
use controllers::rules::get_all_rules;
use controllers::rules::rule_type_routes;
use controllers::rules::update_rules;
use middlewares::readiness::wait_for_store;
use models::rule::RuleType;
use models::server::WebServerState;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Builds the HTTP application with every firewall route mounted under `/api/firewall`.
pub fn app(state: Arc<WebServerState>) -> Router {
    let firewall = Router::new()
        .route("/ip", rule_type_routes(RuleType::Ip))
        .route("/port", rule_type_routes(RuleType::Port))
        .route("/url", rule_type_routes(RuleType::Url))
        .route("/rules", get(get_all_rules).put(update_rules))
        .route_layer(middleware::from_fn_with_state(state.clone(), wait_for_store))
        .route("/logs", get(get_logs));

    Router::new()
        .nest("/api/firewall", firewall)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
