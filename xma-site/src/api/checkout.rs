//! Checkout session endpoints

use axum::{extract::rejection::JsonRejection, extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::checkout::{build_line_items, LineItem};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

const MISSING_PARAMETERS: &str = "Missing required parameters";
const CHECKOUT_FAILED: &str = "Error creating checkout session";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub line_items: Vec<LineItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageCheckoutRequest {
    pub package: String,
    #[serde(default)]
    pub add_ons: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// POST /api/checkout
pub async fn create_checkout(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected checkout body");
        ApiError::BadRequest(MISSING_PARAMETERS.to_string())
    })?;
    start_session(&state, &request.line_items).await
}

/// POST /api/checkout/package
///
/// Composes line items from a package and add-ons.
pub async fn create_package_checkout(
    State(state): State<AppState>,
    payload: Result<Json<PackageCheckoutRequest>, JsonRejection>,
) -> ApiResult<Json<CheckoutResponse>> {
    let Json(request) = payload.map_err(|e| {
        tracing::debug!(error = %e, "Rejected package checkout body");
        ApiError::BadRequest(MISSING_PARAMETERS.to_string())
    })?;
    let line_items = build_line_items(&request.package, &request.add_ons);
    start_session(&state, &line_items).await
}

async fn start_session(state: &AppState, line_items: &[LineItem]) -> ApiResult<Json<CheckoutResponse>> {
    if line_items.is_empty() {
        return Err(ApiError::BadRequest(MISSING_PARAMETERS.to_string()));
    }

    let Some(stripe) = &state.stripe else {
        tracing::error!("Checkout requested but Stripe is not configured");
        return Err(ApiError::Internal(CHECKOUT_FAILED.to_string()));
    };

    match stripe.create_checkout_session(line_items).await {
        Ok(session) => Ok(Json(CheckoutResponse {
            session_id: session.id,
            url: session.url,
        })),
        Err(e) => {
            tracing::error!(error = %e, "Stripe checkout session failed");
            Err(ApiError::Internal(CHECKOUT_FAILED.to_string()))
        }
    }
}
