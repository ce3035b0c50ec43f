//! Web server module.
//!
//! Routes:
//! - `GET  /health`
//! - `POST /payments/create-payment-session` - open a checkout session
//! - `POST /payments/webhook` - processor callbacks
//! - `GET  /payments/success`, `GET /payments/cancel` - redirect landing pages

pub mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use handlers::{
    create_payment_session, health, payment_cancel, payment_success, stripe_webhook, AppState,
    HealthResponse, RedirectResponse, SIGNATURE_HEADER,
};

/// Build the service router.
pub fn router(state: AppState) -> Router {
    let timeout = state.config.http_request_timeout;

    Router::new()
        .route("/health", get(health))
        .route("/payments/create-payment-session", post(create_payment_session))
        .route("/payments/webhook", post(stripe_webhook))
        .route("/payments/success", get(payment_success))
        .route("/payments/cancel", get(payment_cancel))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
