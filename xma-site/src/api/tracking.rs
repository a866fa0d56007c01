//! Navigation tracking collection
//!
//! The browser reports each route change; durable state is keyed by visitor
//! (browser profile), ephemeral state by tab.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use xma_tracking::{AttributionSnapshot, AttributionStore, NavigationContext, TrafficSource};

use crate::db::SqliteStore;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct NavigationRequest {
    pub visitor_id: String,
    pub tab_id: String,
    pub path: String,
    /// Raw query string, with or without the leading `?`
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub referrer: Option<String>,
    /// Analytics session id, absent when the analytics SDK is unavailable
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AttributionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_touch: Option<AttributionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_touch: Option<AttributionSnapshot>,
    /// Source of the latest known touch
    pub traffic_source: String,
}

/// POST /api/track/navigation
pub async fn track_navigation(
    State(state): State<AppState>,
    payload: Result<Json<NavigationRequest>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if request.visitor_id.trim().is_empty() || request.tab_id.trim().is_empty() {
        return Err(ApiError::BadRequest("visitor_id and tab_id are required".to_string()));
    }

    let mut ctx = NavigationContext::new(&request.visitor_id, &request.path, &state.site_host)
        .with_query_string(&request.query);
    if let Some(referrer) = request.referrer {
        ctx = ctx.with_referrer(referrer);
    }
    if let Some(session_id) = request.session_id {
        ctx = ctx.with_session_id(session_id);
    }

    let durable = SqliteStore::new(state.db.clone(), &request.visitor_id);
    let ephemeral = state.tabs.store_for(&request.tab_id).await;

    let outcome = state.tracker.track(&ctx, &durable, &ephemeral).await;
    tracing::debug!(
        visitor_id = %request.visitor_id,
        path = %request.path,
        excluded = outcome.excluded,
        first_touch_written = outcome.first_touch_written,
        events = outcome.events.len(),
        "Navigation tracked"
    );

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/track/attribution/:visitor_id
pub async fn get_attribution(
    State(state): State<AppState>,
    Path(visitor_id): Path<String>,
) -> Json<AttributionResponse> {
    let durable = SqliteStore::new(state.db.clone(), &visitor_id);
    let store = AttributionStore::new(&durable);

    let first_touch = store.first_touch().await;
    let last_touch = store.last_touch().await;
    let traffic_source = last_touch
        .as_ref()
        .or(first_touch.as_ref())
        .map(AttributionSnapshot::traffic_source)
        .unwrap_or(TrafficSource::Direct);

    Json(AttributionResponse {
        first_touch,
        last_touch,
        traffic_source: traffic_source.to_string(),
    })
}
