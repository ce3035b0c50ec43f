//! Processor request and event shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Event type announcing a captured charge.
pub const CHARGE_SUCCEEDED: &str = "charge.succeeded";

/// One priced line of a checkout session, already in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutLineItem {
    pub name: String,
    pub currency: String,
    /// Unit price in minor currency units (cents)
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Everything needed to open a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSessionParams {
    pub line_items: Vec<CheckoutLineItem>,
    /// Attached as payment intent metadata and echoed back on charge events
    pub order_id: String,
    pub success_url: String,
    pub cancel_url: String,
}

/// Checkout session as returned by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub success_url: Option<String>,
    #[serde(default)]
    pub cancel_url: Option<String>,
}

/// A verified webhook event.
///
/// Fields not modelled here are kept in `extra` so the event can be echoed
/// back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    /// Payload object; its shape depends on the event type
    pub object: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StripeEvent {
    /// Read the charge fields this service forwards.
    ///
    /// Missing or non-string fields come back as `None`; a payload object of
    /// the wrong shape yields an empty charge.
    pub fn charge(&self) -> Charge {
        let object = &self.data.object;
        let text = |value: Option<&Value>| value.and_then(Value::as_str).map(str::to_string);

        Charge {
            id: text(object.get("id")),
            order_id: text(object.pointer("/metadata/orderId")),
            receipt_url: text(object.get("receipt_url")),
        }
    }
}

/// The subset of a charge object this service reads.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Charge {
    pub id: Option<String>,
    /// Order identifier attached at session creation
    pub order_id: Option<String>,
    pub receipt_url: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn charge_event() -> Value {
        serde_json::json!({
            "id": "evt_1",
            "object": "event",
            "type": "charge.succeeded",
            "livemode": false,
            "data": {
                "object": {
                    "id": "ch_1",
                    "object": "charge",
                    "amount": 3998,
                    "metadata": { "orderId": "ord_1" },
                    "receipt_url": "https://pay.stripe.com/receipts/ch_1"
                }
            }
        })
    }

    #[test]
    fn test_event_keeps_unmodelled_fields() {
        let raw = charge_event();
        let event: StripeEvent = serde_json::from_value(raw.clone()).unwrap();

        assert_eq!(event.event_type, CHARGE_SUCCEEDED);
        assert_eq!(serde_json::to_value(&event).unwrap(), raw);
    }

    #[test]
    fn test_charge_extraction() {
        let event: StripeEvent = serde_json::from_value(charge_event()).unwrap();

        assert_eq!(
            event.charge(),
            Charge {
                id: Some("ch_1".to_string()),
                order_id: Some("ord_1".to_string()),
                receipt_url: Some("https://pay.stripe.com/receipts/ch_1".to_string()),
            }
        );
    }

    #[test]
    fn test_charge_without_metadata() {
        let mut raw = charge_event();
        raw["data"]["object"] = serde_json::json!({ "id": "ch_2" });
        let event: StripeEvent = serde_json::from_value(raw).unwrap();

        let charge = event.charge();
        assert_eq!(charge.id.as_deref(), Some("ch_2"));
        assert_eq!(charge.order_id, None);
        assert_eq!(charge.receipt_url, None);
    }

    #[test]
    fn test_charge_from_unexpected_object() {
        let mut raw = charge_event();
        raw["data"]["object"] = serde_json::json!("ch_3");
        let event: StripeEvent = serde_json::from_value(raw).unwrap();

        assert_eq!(event.charge(), Charge::default());
    }
}
