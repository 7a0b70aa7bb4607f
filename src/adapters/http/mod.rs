//! HTTP adapters - REST API implementations.

pub mod billing;

use std::time::Duration;

use axum::{routing::get, Json, Router};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub use billing::{billing_router, BillingAppState};

/// Complete application router: billing routes, `/health`, request tracing
/// and a per-request timeout.
pub fn app_router(state: BillingAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(billing_router())
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(request_timeout))
        .with_state(state)
}

async fn health() -> Json<billing::HealthResponse> {
    Json(billing::HealthResponse { status: "ok" })
}
