//! Shared test infrastructure for the HTTP integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{body::Body, http::Request, response::Response, Router};
use tower::ServiceExt;

use payments::processor::{
    CheckoutSession, CheckoutSessionParams, PaymentProcessor, ProcessorError, StripeEvent,
    WebhookError,
};
use payments::{AppState, Config, EventBus, SessionInitiator, StripeClient, WebhookDispatcher};

pub const WEBHOOK_SECRET: &str = "whsec_integration_secret";

pub fn test_config() -> Config {
    Config::from_lookup(|name| {
        let value = match name {
            "STRIPE_SECRET" => Some("sk_test_integration"),
            "STRIPE_WEBHOOK_SECRET" => Some(WEBHOOK_SECRET),
            "STRIPE_SUCCESS_URL" => Some("http://localhost:3003/payments/success"),
            "STRIPE_CANCEL_URL" => Some("http://localhost:3003/payments/cancel"),
            "AMQP_SERVERS" => Some("amqp://localhost:5672"),
            _ => None,
        };
        value.map(str::to_string)
    })
    .unwrap()
}

/// Session creation is faked; webhook verification uses the real Stripe adapter.
pub struct FakeProcessor {
    pub sessions: Mutex<Vec<CheckoutSessionParams>>,
    pub fail: bool,
    verifier: StripeClient,
}

impl FakeProcessor {
    pub fn new(fail: bool) -> Self {
        Self {
            sessions: Mutex::new(Vec::new()),
            fail,
            verifier: StripeClient::from_config(&test_config()).unwrap(),
        }
    }
}

#[async_trait]
impl PaymentProcessor for FakeProcessor {
    async fn create_session(
        &self,
        params: CheckoutSessionParams,
    ) -> Result<CheckoutSession, ProcessorError> {
        let session = CheckoutSession {
            id: "cs_test_1".to_string(),
            url: Some("https://checkout.stripe.com/c/pay/cs_test_1".to_string()),
            success_url: Some(params.success_url.clone()),
            cancel_url: Some(params.cancel_url.clone()),
        };
        self.sessions.lock().unwrap().push(params);

        if self.fail {
            return Err(ProcessorError::Rejected {
                status: 401,
                message: "Invalid API Key provided: sk_test_***************tion".to_string(),
            });
        }
        Ok(session)
    }

    fn verify_and_parse_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<StripeEvent, WebhookError> {
        self.verifier.verify_and_parse_event(payload, signature)
    }
}

/// Captures emitted events instead of publishing them.
#[derive(Default)]
pub struct RecordingBus {
    pub emitted: Mutex<Vec<(String, serde_json::Value)>>,
    pub fail: bool,
}

#[async_trait]
impl EventBus for RecordingBus {
    async fn emit(&self, topic: &str, body: Vec<u8>) -> anyhow::Result<()> {
        if self.fail {
            return Err(anyhow!("connection refused"));
        }
        let value = serde_json::from_slice(&body)?;
        self.emitted.lock().unwrap().push((topic.to_string(), value));
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub processor: Arc<FakeProcessor>,
    pub bus: Arc<RecordingBus>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with(FakeProcessor::new(false), RecordingBus::default())
    }

    pub fn with(processor: FakeProcessor, bus: RecordingBus) -> Self {
        let config = test_config();
        let processor = Arc::new(processor);
        let bus = Arc::new(bus);

        let initiator = SessionInitiator::new(
            processor.clone(),
            config.stripe_success_url.clone(),
            config.stripe_cancel_url.clone(),
        );
        let dispatcher = WebhookDispatcher::new(processor.clone(), bus.clone());
        let router = payments::web::router(AppState::new(config, initiator, dispatcher));

        Self {
            router,
            processor,
            bus,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub fn emitted(&self) -> Vec<(String, serde_json::Value)> {
        self.bus.emitted.lock().unwrap().clone()
    }
}

pub async fn body_bytes(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
