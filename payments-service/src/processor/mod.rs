//! Payment processor port.
//!
//! The service never talks to the processor directly: session creation and
//! webhook verification go through [`PaymentProcessor`], which is constructed
//! once at startup and injected wherever it is needed.
//!
//! ```text
//! SessionInitiator ──create_session──────────▶ PaymentProcessor ──▶ Stripe REST API
//! WebhookDispatcher ─verify_and_parse_event─▶ PaymentProcessor (HMAC, local)
//! ```

pub mod signature;
pub mod stripe;
pub mod types;

use async_trait::async_trait;
use thiserror::Error;

pub use signature::{sign_payload, SignatureHeader};
pub use stripe::StripeClient;
pub use types::{
    Charge, CheckoutLineItem, CheckoutSession, CheckoutSessionParams, EventData, StripeEvent,
    CHARGE_SUCCEEDED,
};

/// Failure talking to the processor API.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("processor request failed: {0}")]
    Transport(String),

    #[error("processor rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("processor response could not be decoded: {0}")]
    Decode(String),
}

/// Failure authenticating or parsing a webhook delivery.
///
/// The display strings are returned verbatim to the processor in the 400 body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("No stripe-signature header value was provided.")]
    MissingSignature,

    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,

    #[error("No signatures found with expected scheme")]
    NoSignatures,

    #[error("No signatures found matching the expected signature for payload. Are you passing the raw request body you received from Stripe?")]
    SignatureMismatch,

    #[error("Timestamp outside the tolerance zone ({age_secs}s old)")]
    TimestampOutsideTolerance { age_secs: i64 },

    #[error("Webhook payload could not be parsed: {0}")]
    InvalidPayload(String),
}

/// Payment processor capabilities used by this service.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Create a hosted checkout session.
    async fn create_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ProcessorError>;

    /// Authenticate a raw webhook body against its signature header and parse it.
    ///
    /// `payload` must be the body exactly as received.
    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookError>;
}
