//! Session initiation.
//!
//! Turns an order description into a hosted checkout session:
//!
//! ```text
//! PaymentSessionRequest → validate + price in minor units → PaymentProcessor::create_session → PaymentSessionResult
//! ```
//!
//! No retries happen here. A failed processor call is logged in full and
//! reported to the caller as an opaque internal error.

pub mod types;

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::SessionError;
use crate::processor::{CheckoutSessionParams, PaymentProcessor};

pub use types::{to_minor_units, LineItem, PaymentSessionRequest, PaymentSessionResult};

/// Creates checkout sessions through the injected processor.
#[derive(Clone)]
pub struct SessionInitiator {
    processor: Arc<dyn PaymentProcessor>,
    success_url: String,
    cancel_url: String,
}

impl SessionInitiator {
    pub fn new(
        processor: Arc<dyn PaymentProcessor>,
        success_url: impl Into<String>,
        cancel_url: impl Into<String>,
    ) -> Self {
        Self {
            processor,
            success_url: success_url.into(),
            cancel_url: cancel_url.into(),
        }
    }

    /// Create a payment session for an order.
    pub async fn create_payment_session(
        &self,
        request: &PaymentSessionRequest,
    ) -> Result<PaymentSessionResult, SessionError> {
        let line_items = request.to_line_items().map_err(|e| {
            warn!(order_id = %request.order_id, error = %e, "payment_session_invalid");
            e
        })?;

        info!(
            order_id = %request.order_id,
            line_items = line_items.len(),
            "payment_session_requested"
        );

        let params = CheckoutSessionParams {
            line_items,
            order_id: request.order_id.clone(),
            success_url: self.success_url.clone(),
            cancel_url: self.cancel_url.clone(),
        };

        let session = self.processor.create_session(params).await.map_err(|e| {
            error!(order_id = %request.order_id, error = %e, "payment_session_failed");
            SessionError::Internal
        })?;

        info!(
            order_id = %request.order_id,
            session_id = %session.id,
            "payment_session_created"
        );

        Ok(PaymentSessionResult {
            id: session.id,
            cancel_url: session.cancel_url,
            success_url: session.success_url,
            url: session.url,
        })
    }
}
