//! Stripe adapter for [`PaymentProcessor`].
//!
//! Checkout sessions are created through the REST API (form-encoded, basic
//! auth with the secret key). Webhook verification is local: it only needs
//! the signing secret.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{error, info};

use super::signature::{unix_now, verify_signature};
use super::types::{CheckoutSession, CheckoutSessionParams, StripeEvent};
use super::{PaymentProcessor, ProcessorError, WebhookError};
use crate::Config;

/// Stripe REST client and webhook verifier.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
    webhook_secret: SecretString,
    tolerance_secs: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: Option<String>,
}

impl StripeClient {
    /// Build a client from the service configuration.
    ///
    /// Every API call inherits the configured timeout.
    pub fn from_config(config: &Config) -> Result<Self, ProcessorError> {
        let http = reqwest::Client::builder()
            .timeout(config.stripe_timeout)
            .build()
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: config.stripe_api_base.clone(),
            secret_key: config.stripe_secret.clone(),
            webhook_secret: config.stripe_webhook_secret.clone(),
            tolerance_secs: config.webhook_tolerance_secs,
        })
    }
}

/// Form fields for `POST /v1/checkout/sessions`.
fn session_form(params: &CheckoutSessionParams) -> Vec<(String, String)> {
    let mut form = vec![
        ("mode".to_string(), "payment".to_string()),
        (
            "payment_intent_data[metadata][orderId]".to_string(),
            params.order_id.clone(),
        ),
        ("success_url".to_string(), params.success_url.clone()),
        ("cancel_url".to_string(), params.cancel_url.clone()),
    ];

    for (i, item) in params.line_items.iter().enumerate() {
        let prefix = format!("line_items[{}]", i);
        form.push((
            format!("{}[price_data][currency]", prefix),
            item.currency.clone(),
        ));
        form.push((
            format!("{}[price_data][product_data][name]", prefix),
            item.name.clone(),
        ));
        form.push((
            format!("{}[price_data][unit_amount]", prefix),
            item.unit_amount.to_string(),
        ));
        form.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
    }

    form
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn create_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ProcessorError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);

        let response = self
            .http
            .post(&url)
            .basic_auth(self.secret_key.expose_secret(), Option::<&str>::None)
            .form(&session_form(&params))
            .send()
            .await
            .map_err(|e| ProcessorError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .ok()
                .and_then(|envelope| envelope.error.message)
                .unwrap_or(body);

            error!(
                status = status.as_u16(),
                error = %message,
                "stripe_create_session_rejected"
            );
            return Err(ProcessorError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| ProcessorError::Decode(e.to_string()))?;

        info!(session_id = %session.id, "stripe_session_created");

        Ok(session)
    }

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookError> {
        verify_signature(
            self.webhook_secret.expose_secret(),
            payload,
            signature,
            self.tolerance_secs,
            unix_now(),
        )?;

        serde_json::from_slice(payload).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::signature::sign_payload;
    use crate::processor::types::CheckoutLineItem;

    fn test_client() -> StripeClient {
        let config = Config::from_lookup(|name| {
            let value = match name {
                "STRIPE_SECRET" => Some("sk_test_123"),
                "STRIPE_WEBHOOK_SECRET" => Some("whsec_test_secret"),
                "STRIPE_SUCCESS_URL" => Some("http://localhost:3003/payments/success"),
                "STRIPE_CANCEL_URL" => Some("http://localhost:3003/payments/cancel"),
                "AMQP_SERVERS" => Some("amqp://localhost:5672"),
                _ => None,
            };
            value.map(str::to_string)
        })
        .unwrap();

        StripeClient::from_config(&config).unwrap()
    }

    #[test]
    fn test_session_form_fields() {
        let params = CheckoutSessionParams {
            line_items: vec![CheckoutLineItem {
                name: "Widget".to_string(),
                currency: "usd".to_string(),
                unit_amount: 1999,
                quantity: 2,
            }],
            order_id: "ord_1".to_string(),
            success_url: "http://localhost/success".to_string(),
            cancel_url: "http://localhost/cancel".to_string(),
        };

        let form = session_form(&params);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("mode"), Some("payment"));
        assert_eq!(get("payment_intent_data[metadata][orderId]"), Some("ord_1"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("line_items[0][price_data][product_data][name]"), Some("Widget"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("1999"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("success_url"), Some("http://localhost/success"));
        assert_eq!(get("cancel_url"), Some("http://localhost/cancel"));
    }

    #[test]
    fn test_verify_and_parse_event() {
        let client = test_client();
        let body = br#"{"id":"evt_1","type":"charge.succeeded","data":{"object":{"id":"ch_1"}}}"#;
        let header = sign_payload("whsec_test_secret", unix_now(), body);

        let event = client.verify_and_parse_event(body, &header).unwrap();

        assert_eq!(event.id, "evt_1");
        assert_eq!(event.event_type, "charge.succeeded");
    }

    #[test]
    fn test_verify_rejects_before_parsing() {
        let client = test_client();
        let header = sign_payload("whsec_wrong", unix_now(), b"not json");

        assert_eq!(
            client.verify_and_parse_event(b"not json", &header),
            Err(WebhookError::SignatureMismatch)
        );
    }

    #[test]
    fn test_verified_but_malformed_payload() {
        let client = test_client();
        let header = sign_payload("whsec_test_secret", unix_now(), b"not json");

        assert!(matches!(
            client.verify_and_parse_event(b"not json", &header),
            Err(WebhookError::InvalidPayload(_))
        ));
    }
}
