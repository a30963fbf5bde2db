//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use admitdb_core::{CoreError, PlanId};
use admitdb_payments::{CheckoutReceipt, CheckoutRequest, PaymentError};
use admitdb_pricing::{Plan, PriceQuote};

use crate::config::EnvironmentFlags;
use crate::state::AppState;

/// Header carrying the gateway's webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub payment_gateway_initialized: bool,
    pub store_initialized: bool,
    pub gateway: Option<&'static str>,
    pub environment: EnvironmentFlags,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct PlansResponse {
    pub currency: String,
    pub plans: Vec<Plan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub coupon_code: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

// ============================================================================
// Error Mapping
// ============================================================================

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

/// Map a store error onto a status code
pub fn store_error(err: &CoreError) -> ApiError {
    let status = match err {
        CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::Validation(_) => StatusCode::BAD_REQUEST,
        CoreError::Conflict(_) | CoreError::InvalidTransition { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::error!(error = %err, "Store error");
    }
    api_error(status, err.user_message())
}

/// Map a payment error onto a status code.
///
/// Rejected input is echoed back; the gateway's own message passes through
/// on rejection; anything else becomes a generic message.
pub fn payment_error(err: &PaymentError) -> ApiError {
    match err {
        e if e.is_client_error() => api_error(StatusCode::BAD_REQUEST, e.to_string()),
        PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_) => {
            api_error(StatusCode::BAD_REQUEST, err.to_string())
        }
        PaymentError::ServiceUnavailable(_) | PaymentError::GatewayTimeout(_) => {
            tracing::error!(error = %err, "Payment service unavailable");
            api_error(StatusCode::SERVICE_UNAVAILABLE, err.user_message())
        }
        PaymentError::Store(inner) => store_error(inner),
        _ => {
            tracing::error!(error = %err, "Payment error");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, err.user_message())
        }
    }
}

pub fn bad_json(rejection: &JsonRejection) -> ApiError {
    tracing::debug!(error = %rejection, "Rejected request body");
    api_error(StatusCode::BAD_REQUEST, rejection.body_text())
}

fn gateway_unavailable() -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        "Payment service unavailable. Please try again later.",
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        payment_gateway_initialized: state.gateway.is_some(),
        store_initialized: state.status.store_initialized,
        gateway: state.status.gateway_name,
        environment: state.status.environment,
    })
}

/// Active plans, for the pricing page
pub async fn list_plans(State(state): State<AppState>) -> Json<PlansResponse> {
    let catalog = state.resolver.catalog();
    Json(PlansResponse {
        currency: catalog.currency.clone(),
        plans: catalog.active_plans().cloned().collect(),
    })
}

/// Price preview for a plan and optional coupon
pub async fn quote(
    State(state): State<AppState>,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> Result<Json<PriceQuote>, ApiError> {
    let Json(request) = payload.map_err(|e| bad_json(&e))?;

    let plan = request
        .plan
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Missing required field: plan"))?;

    state
        .resolver
        .resolve(&PlanId::new(plan), request.coupon_code.as_deref())
        .map(Json)
        .map_err(|e| payment_error(&PaymentError::from(e)))
}

/// Create an order and its payment intent
pub async fn create_payment_intent(
    State(state): State<AppState>,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<Json<CheckoutReceipt>, ApiError> {
    let checkout = state.checkout.as_ref().ok_or_else(gateway_unavailable)?;
    let Json(request) = payload.map_err(|e| bad_json(&e))?;

    let receipt = checkout
        .create_payment_intent(request)
        .await
        .map_err(|e| payment_error(&e))?;

    Ok(Json(receipt))
}

/// Gateway webhook; the body must reach the verifier byte for byte
pub async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let Some(gateway) = state.gateway.as_ref() else {
        return gateway_unavailable().into_response();
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match state.fulfillment.receive(gateway.as_ref(), &body, signature).await {
        Ok(outcome) => {
            tracing::debug!(?outcome, "Webhook handled");
            Json(WebhookAck { received: true }).into_response()
        }
        Err(e @ (PaymentError::WebhookSignature(_) | PaymentError::WebhookParse(_))) => {
            (StatusCode::BAD_REQUEST, format!("Webhook Error: {e}")).into_response()
        }
        // 5xx so the gateway redelivers
        Err(e) => {
            tracing::error!(error = %e, "Webhook processing failed");
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.user_message()).into_response()
        }
    }
}
