//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::AppState;

/// Which optional integrations are wired up
#[derive(Debug, Serialize)]
pub struct Integrations {
    pub stripe: bool,
    pub lead_webhook: bool,
    /// Content provider name, if any
    pub content: Option<&'static str>,
    pub analytics_subscribers: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub integrations: Integrations,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        module: "xma-site".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.startup_time.elapsed().as_secs(),
        integrations: Integrations {
            stripe: state.stripe.is_some(),
            lead_webhook: state.lead_webhook.is_some(),
            content: state.content.as_ref().map(|c| c.provider()),
            analytics_subscribers: state.event_bus.subscriber_count(),
        },
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
