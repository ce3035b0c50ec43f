//! Outbound bus message types.

use serde::{Deserialize, Serialize};

/// Topic (routing key) for successful charges.
pub const PAYMENT_SUCCEEDED: &str = "payment.succeeded";

/// Published once per verified `charge.succeeded` delivery.
///
/// Consumed by other services; field names are part of their contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceeded {
    /// Processor charge identifier
    pub stripe_payment_id: Option<String>,
    /// Order identifier carried through charge metadata; `null` when the
    /// charge carried none
    pub order_id: Option<String>,
    pub receipt_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_succeeded_wire_format() {
        let message = PaymentSucceeded {
            stripe_payment_id: Some("ch_1".to_string()),
            order_id: Some("ord_1".to_string()),
            receipt_url: Some("https://pay.stripe.com/receipts/ch_1".to_string()),
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "stripePaymentId": "ch_1",
                "orderId": "ord_1",
                "receiptUrl": "https://pay.stripe.com/receipts/ch_1",
            })
        );
    }

    #[test]
    fn test_missing_fields_serialize_as_null() {
        let message = PaymentSucceeded {
            stripe_payment_id: Some("ch_2".to_string()),
            order_id: None,
            receipt_url: None,
        };

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            serde_json::json!({
                "stripePaymentId": "ch_2",
                "orderId": null,
                "receiptUrl": null,
            })
        );
    }
}
