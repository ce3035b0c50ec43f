//! Webhook intake and dispatch.
//!
//! Each delivery is handled in one pass:
//!
//! ```text
//! received → verified → dispatched | ignored → acknowledged (200)
//! received → rejected (400)
//! ```
//!
//! Nothing is remembered between deliveries. The processor delivers
//! at-least-once, so a replayed `charge.succeeded` is forwarded again; there
//! is no dedup store. Closing that gap needs a seen-set keyed by charge id.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::processor::{PaymentProcessor, StripeEvent, WebhookError, CHARGE_SUCCEEDED};
use crate::queue::{emit_json, EventBus, PaymentSucceeded, PAYMENT_SUCCEEDED};

/// What happened to a verified event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// `payment.succeeded` was handed to the bus
    Forwarded(PaymentSucceeded),
    /// The emission failed; logged, not retried
    EmitFailed(PaymentSucceeded),
    /// Event type this service does not act on
    Ignored(String),
}

/// Acknowledgement body: the signature header and the parsed event.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub sig: String,
    pub event: StripeEvent,
    #[serde(skip)]
    pub dispatch: Dispatch,
}

/// Verifies processor callbacks and forwards successful charges.
#[derive(Clone)]
pub struct WebhookDispatcher {
    processor: Arc<dyn PaymentProcessor>,
    bus: Arc<dyn EventBus>,
}

impl WebhookDispatcher {
    pub fn new(processor: Arc<dyn PaymentProcessor>, bus: Arc<dyn EventBus>) -> Self {
        Self { processor, bus }
    }

    /// Handle one delivery.
    ///
    /// `raw_body` must be the request body exactly as received. Only a
    /// verification failure is an error; every verified event is acknowledged.
    pub async fn handle(
        &self,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookAck, WebhookError> {
        let signature = signature
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(WebhookError::MissingSignature)?;

        let event = self
            .processor
            .verify_and_parse_event(raw_body, signature)
            .map_err(|e| {
                warn!(error = %e, body_length = raw_body.len(), "webhook_rejected");
                e
            })?;

        info!(
            event_id = %event.id,
            event_type = %event.event_type,
            "webhook_verified"
        );

        let dispatch = match event.event_type.as_str() {
            CHARGE_SUCCEEDED => self.forward_charge(&event).await,
            other => {
                info!(event_id = %event.id, event_type = %other, "webhook_event_ignored");
                Dispatch::Ignored(other.to_string())
            }
        };

        Ok(WebhookAck {
            sig: signature.to_string(),
            event,
            dispatch,
        })
    }

    /// Emit `payment.succeeded` for a charge.
    ///
    /// Every verified charge yields exactly one emission attempt. Fields the
    /// charge lacks are sent as `null`.
    async fn forward_charge(&self, event: &StripeEvent) -> Dispatch {
        let charge = event.charge();

        if charge.order_id.is_none() {
            warn!(
                event_id = %event.id,
                charge_id = ?charge.id,
                "charge_missing_order_id"
            );
        }

        let message = PaymentSucceeded {
            stripe_payment_id: charge.id,
            order_id: charge.order_id,
            receipt_url: charge.receipt_url,
        };

        match emit_json(self.bus.as_ref(), PAYMENT_SUCCEEDED, &message).await {
            Ok(()) => {
                info!(
                    event_id = %event.id,
                    charge_id = ?message.stripe_payment_id,
                    order_id = ?message.order_id,
                    "payment_succeeded_emitted"
                );
                Dispatch::Forwarded(message)
            }
            Err(e) => {
                error!(
                    event_id = %event.id,
                    charge_id = ?message.stripe_payment_id,
                    order_id = ?message.order_id,
                    error = %format!("{:#}", e),
                    "payment_succeeded_emit_failed"
                );
                Dispatch::EmitFailed(message)
            }
        }
    }
}
