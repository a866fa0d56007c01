//! Web Vitals ingestion

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use xma_common::events::{AnalyticsEvent, WebVitalMetric};

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// A metric as reported by the browser, plus the visitor it belongs to
#[derive(Debug, Deserialize)]
pub struct VitalReport {
    pub visitor_id: String,
    #[serde(flatten)]
    pub metric: WebVitalMetric,
}

/// POST /api/vitals
pub async fn report_vital(
    State(state): State<AppState>,
    payload: Result<Json<VitalReport>, JsonRejection>,
) -> ApiResult<StatusCode> {
    let Json(report) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    if report.visitor_id.trim().is_empty() {
        return Err(ApiError::BadRequest("visitor_id is required".to_string()));
    }

    tracing::debug!(
        visitor_id = %report.visitor_id,
        value = report.metric.value,
        "Web vital reported"
    );

    let super_properties = state.tracker.super_properties(&report.visitor_id).await;
    state.event_bus.emit_lossy(AnalyticsEvent::WebVital {
        distinct_id: report.visitor_id,
        metric: report.metric,
        timestamp: xma_common::time::now(),
        super_properties,
    });

    Ok(StatusCode::ACCEPTED)
}
