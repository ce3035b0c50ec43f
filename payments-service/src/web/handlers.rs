//! HTTP endpoint handlers.
//!
//! Handlers only translate between HTTP and the session initiator or webhook
//! dispatcher; all decisions are made there.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::checkout::{PaymentSessionRequest, SessionInitiator};
use crate::error::SessionError;
use crate::webhook::WebhookDispatcher;
use crate::Config;

/// Header carrying the processor's webhook signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub initiator: SessionInitiator,
    pub dispatcher: WebhookDispatcher,
}

impl AppState {
    pub fn new(config: Config, initiator: SessionInitiator, dispatcher: WebhookDispatcher) -> Self {
        Self {
            config: Arc::new(config),
            initiator,
            dispatcher,
        }
    }
}

// =============================================================================
// Health Check
// =============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Checkout Session
// =============================================================================

/// Create a checkout session.
///
/// Malformed bodies get the same 400 error body as failed validation.
pub async fn create_payment_session(
    State(state): State<AppState>,
    payload: Result<Json<PaymentSessionRequest>, JsonRejection>,
) -> Response {
    let result = match payload {
        Ok(Json(request)) => state.initiator.create_payment_session(&request).await,
        Err(rejection) => Err(SessionError::Validation(rejection.body_text())),
    };

    match result {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => {
            let status =
                StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.body())).into_response()
        }
    }
}

// =============================================================================
// Redirect Landing Pages
// =============================================================================

#[derive(Serialize)]
pub struct RedirectResponse {
    pub ok: bool,
    pub message: &'static str,
}

pub async fn payment_success() -> Json<RedirectResponse> {
    Json(RedirectResponse {
        ok: true,
        message: "Payment successful",
    })
}

pub async fn payment_cancel() -> Json<RedirectResponse> {
    Json(RedirectResponse {
        ok: false,
        message: "Payment cancelled",
    })
}

// =============================================================================
// Processor Webhook
// =============================================================================

/// Processor webhook endpoint.
///
/// The body is taken as raw bytes: the signature covers the exact bytes sent.
/// Only a failed verification answers non-200, since any other status makes
/// the processor redeliver.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    info!(
        body_length = body.len(),
        has_signature = signature.is_some(),
        "webhook_received"
    );

    match state.dispatcher.handle(&body, signature).await {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            format!("Webhook Error: {}", e),
        )
            .into_response(),
    }
}
