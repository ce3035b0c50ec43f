//! Session creation over the message bus.
//!
//! Internal services request checkout sessions by publishing a session request
//! to the RPC queue with `reply_to` and `correlation_id` set. Each delivery is
//! handled on its own task; the reply goes to the default exchange under the
//! `reply_to` routing key. On shutdown the consumer stops taking deliveries and
//! waits for in-flight ones to be acknowledged before closing the connection.

use std::future::Future;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::StreamExt;
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel,
};
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::checkout::{PaymentSessionRequest, PaymentSessionResult, SessionInitiator};
use crate::error::{ErrorBody, SessionError};
use crate::queue::publisher::connect_any;
use crate::Config;

/// Reply payload: the session on success, the error body otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RpcReply {
    Session(PaymentSessionResult),
    Error(ErrorBody),
}

impl From<Result<PaymentSessionResult, SessionError>> for RpcReply {
    fn from(result: Result<PaymentSessionResult, SessionError>) -> Self {
        match result {
            Ok(session) => RpcReply::Session(session),
            Err(e) => RpcReply::Error(e.body()),
        }
    }
}

/// Decode one request body and create the session.
pub async fn handle_request(initiator: &SessionInitiator, body: &[u8]) -> RpcReply {
    let request: PaymentSessionRequest = match serde_json::from_slice(body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, body_length = body.len(), "rpc_request_invalid");
            return RpcReply::Error(SessionError::Validation(e.to_string()).body());
        }
    };

    initiator.create_payment_session(&request).await.into()
}

/// Consume session requests until `shutdown` resolves.
pub async fn run<F>(config: Arc<Config>, initiator: SessionInitiator, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let conn = connect_any(&config.amqp_servers).await?;
    let channel = conn
        .create_channel()
        .await
        .context("Failed to create channel")?;

    channel
        .basic_qos(config.rpc_prefetch, BasicQosOptions::default())
        .await
        .context("Failed to set QoS")?;

    channel
        .queue_declare(
            &config.rpc_queue,
            QueueDeclareOptions {
                durable: true,
                ..Default::default()
            },
            FieldTable::default(),
        )
        .await
        .context("Failed to declare RPC queue")?;

    let mut consumer = channel
        .basic_consume(
            &config.rpc_queue,
            "payments-service",
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await
        .context("Failed to start consumer")?;

    info!(
        queue = %config.rpc_queue,
        prefetch_count = config.rpc_prefetch,
        "rpc_consumer_started"
    );

    let channel = Arc::new(channel);
    let mut in_flight = JoinSet::new();
    tokio::pin!(shutdown);

    let outcome = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("rpc_consumer_stopping");
                break Ok(());
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    error!(error = %e, "rpc_delivery_task_failed");
                }
            }
            delivery = consumer.next() => {
                match delivery {
                    Some(Ok(delivery)) => {
                        let channel = Arc::clone(&channel);
                        let initiator = initiator.clone();
                        in_flight.spawn(async move {
                            process_delivery(&channel, &initiator, delivery).await;
                        });
                    }
                    Some(Err(e)) => {
                        error!(error = %e, "rabbitmq_delivery_error");
                    }
                    None => {
                        warn!("rabbitmq_consumer_closed");
                        break Err(anyhow!("RPC consumer stream closed"));
                    }
                }
            }
        }
    };

    let drained = drain(in_flight).await;
    info!(in_flight = drained, "rpc_deliveries_drained");

    if let Err(e) = conn.close(200, "Normal shutdown").await {
        warn!(error = %e, "rabbitmq_connection_close_error");
    }

    info!("rpc_consumer_shutdown_complete");
    outcome
}

/// Wait for every in-flight delivery to be answered and acknowledged.
///
/// Returns how many tasks were still running.
async fn drain(mut in_flight: JoinSet<()>) -> usize {
    let pending = in_flight.len();
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "rpc_delivery_task_failed");
        }
    }
    pending
}

/// Answer one delivery, then acknowledge it.
///
/// Every delivery is acknowledged: a request that failed once will fail
/// again, and the caller has already been told why.
async fn process_delivery(channel: &Channel, initiator: &SessionInitiator, delivery: Delivery) {
    let delivery_tag = delivery.delivery_tag;
    let reply_to = delivery.properties.reply_to().clone();
    let correlation_id = delivery.properties.correlation_id().clone();

    info!(
        delivery_tag = delivery_tag,
        correlation_id = ?correlation_id.as_ref().map(|c| c.as_str()),
        "rpc_request_received"
    );

    let reply = handle_request(initiator, &delivery.data).await;

    match reply_to {
        Some(reply_to) => {
            let result = async {
                let body = serde_json::to_vec(&reply).context("Failed to serialize reply")?;
                let mut properties =
                    BasicProperties::default().with_content_type("application/json".into());
                if let Some(correlation_id) = correlation_id {
                    properties = properties.with_correlation_id(correlation_id);
                }

                channel
                    .basic_publish(
                        "",
                        reply_to.as_str(),
                        BasicPublishOptions::default(),
                        &body,
                        properties,
                    )
                    .await
                    .context("Failed to publish reply")?
                    .await
                    .context("Failed to confirm reply")?;

                anyhow::Ok(())
            }
            .await;

            if let Err(e) = result {
                error!(delivery_tag = delivery_tag, error = %format!("{:#}", e), "rpc_reply_failed");
            }
        }
        None => warn!(delivery_tag = delivery_tag, "rpc_request_without_reply_to"),
    }

    if let Err(e) = channel
        .basic_ack(delivery_tag, BasicAckOptions::default())
        .await
    {
        error!(delivery_tag = delivery_tag, error = %e, "rabbitmq_ack_failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use async_trait::async_trait;

    use crate::processor::{
        CheckoutSession, CheckoutSessionParams, PaymentProcessor, ProcessorError, StripeEvent,
        WebhookError,
    };

    struct EchoProcessor;

    #[async_trait]
    impl PaymentProcessor for EchoProcessor {
        async fn create_session(
            &self,
            params: CheckoutSessionParams,
        ) -> Result<CheckoutSession, ProcessorError> {
            if params.order_id == "ord_fail" {
                return Err(ProcessorError::Transport("connection reset".to_string()));
            }
            Ok(CheckoutSession {
                id: format!("cs_{}", params.order_id),
                url: Some("https://checkout.stripe.com/c/pay/cs".to_string()),
                success_url: Some(params.success_url),
                cancel_url: Some(params.cancel_url),
            })
        }

        fn verify_and_parse_event(
            &self,
            _payload: &[u8],
            _signature: &str,
        ) -> Result<StripeEvent, WebhookError> {
            Err(WebhookError::SignatureMismatch)
        }
    }

    fn initiator() -> SessionInitiator {
        SessionInitiator::new(
            Arc::new(EchoProcessor),
            "http://localhost/success",
            "http://localhost/cancel",
        )
    }

    #[tokio::test]
    async fn test_reply_with_session() {
        let body = br#"{"currency":"usd","items":[{"name":"Widget","price":19.99,"quantity":2}],"orderId":"ord_1"}"#;

        let reply = handle_request(&initiator(), body).await;

        assert_eq!(
            serde_json::to_value(&reply).unwrap(),
            serde_json::json!({
                "id": "cs_ord_1",
                "cancelUrl": "http://localhost/cancel",
                "successUrl": "http://localhost/success",
                "url": "https://checkout.stripe.com/c/pay/cs",
            })
        );
    }

    #[tokio::test]
    async fn test_reply_with_bad_request() {
        let reply = handle_request(&initiator(), b"{not json").await;

        match reply {
            RpcReply::Error(body) => {
                assert_eq!(body.status_code, 400);
                assert_eq!(body.error, "Bad Request");
            }
            other => panic!("Expected error reply, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reply_with_internal_error() {
        let body = br#"{"currency":"usd","items":[{"name":"Widget","price":1,"quantity":1}],"orderId":"ord_fail"}"#;

        let reply = handle_request(&initiator(), body).await;

        assert_eq!(reply, RpcReply::Error(SessionError::Internal.body()));
    }

    #[tokio::test]
    async fn test_drain_waits_for_in_flight_deliveries() {
        let acked = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut in_flight = JoinSet::new();
        for delay in [10, 30, 50] {
            let acked = Arc::clone(&acked);
            in_flight.spawn(async move {
                tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                acked.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            });
        }

        assert_eq!(drain(in_flight).await, 3);
        assert_eq!(acked.load(std::sync::atomic::Ordering::SeqCst), 3);
    }
}
