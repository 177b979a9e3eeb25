//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod allocation;
mod balance;
mod expense;
mod group;

use crate::auth::auth_middleware;
use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::Level;

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    // Everything under /api requires a bearer token
    let api = Router::new()
        // Allocation routes
        .route("/allocations/preview", post(allocation::preview_allocation))
        .route("/allocations/itemized", post(allocation::itemized_allocation))
        // Group routes
        .route(
            "/groups/{group_id}/expenses",
            post(group::create_expense).get(group::list_expenses),
        )
        .route("/groups/{group_id}/activity", get(group::group_activity))
        .route("/groups/{group_id}/reconcile", post(group::reconcile_group))
        // Expense routes
        .route(
            "/expenses/{expense_id}",
            get(expense::get_expense).delete(expense::delete_expense),
        )
        .route("/expenses/{expense_id}/approve", post(expense::approve_expense))
        .route("/expenses/{expense_id}/decline", post(expense::decline_expense))
        // Balance routes
        .route("/balances/{user_a}/{user_b}", get(balance::pair_balance))
        .route("/users/{user_id}/balances", get(balance::user_balances))
        .route_layer(from_fn_with_state(state.clone(), auth_middleware));

    // Build the router
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .nest("/api", api)
        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<HeaderValue> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    layer
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint
async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
