//! Lead capture endpoint
//!
//! Responses use `{ success, message }` rather than the `{ error }` shape,
//! since the contact form shows `message` directly.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    Json,
};
use serde::Serialize;

use crate::leads::{validate_lead, LeadRequest};
use crate::AppState;

pub const LEAD_SUCCESS_MESSAGE: &str = "Thank you! We'll be in touch soon.";
const LEAD_FAILED_MESSAGE: &str = "Something went wrong. Please try again later.";

#[derive(Debug, Serialize)]
pub struct LeadResponse {
    pub success: bool,
    pub message: String,
}

impl LeadResponse {
    fn reply(status: StatusCode, success: bool, message: &str) -> (StatusCode, Json<LeadResponse>) {
        (
            status,
            Json(LeadResponse {
                success,
                message: message.to_string(),
            }),
        )
    }
}

/// Origin header, else Referer, else "unknown"
fn request_origin(headers: &HeaderMap) -> String {
    [header::ORIGIN, header::REFERER]
        .iter()
        .find_map(|name| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
        })
        .unwrap_or("unknown")
        .to_string()
}

/// POST /api/leads
pub async fn submit_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<LeadRequest>, JsonRejection>,
) -> (StatusCode, Json<LeadResponse>) {
    let lead = match payload {
        Ok(Json(lead)) => lead,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected lead body");
            return LeadResponse::reply(StatusCode::BAD_REQUEST, false, "Invalid request");
        }
    };

    if let Err(invalid) = validate_lead(&lead) {
        return LeadResponse::reply(StatusCode::BAD_REQUEST, false, invalid.message());
    }

    let Some(webhook) = &state.lead_webhook else {
        tracing::error!("Lead submitted but no webhook is configured");
        return LeadResponse::reply(StatusCode::INTERNAL_SERVER_ERROR, false, LEAD_FAILED_MESSAGE);
    };

    let origin = request_origin(&headers);
    match webhook.forward(&lead, &origin).await {
        Ok(()) => LeadResponse::reply(StatusCode::OK, true, LEAD_SUCCESS_MESSAGE),
        Err(e) => {
            tracing::error!(error = %e, origin = %origin, "Lead webhook delivery failed");
            LeadResponse::reply(StatusCode::BAD_GATEWAY, false, LEAD_FAILED_MESSAGE)
        }
    }
}
