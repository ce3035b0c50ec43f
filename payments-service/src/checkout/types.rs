//! Session request and result types.
//!
//! Requests are validated before anything is sent to the processor; unknown
//! JSON fields are rejected outright.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::SessionError;
use crate::processor::CheckoutLineItem;

/// One line of an order, priced in major currency units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LineItem {
    pub name: String,
    pub price: Decimal,
    pub quantity: u32,
}

/// Request to open a checkout session for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PaymentSessionRequest {
    pub currency: String,
    pub items: Vec<LineItem>,
    pub order_id: String,
}

/// Session handed back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSessionResult {
    pub id: String,
    pub cancel_url: Option<String>,
    pub success_url: Option<String>,
    pub url: Option<String>,
}

/// Convert a major-unit price to minor units: `round(price * 100)`.
///
/// Midpoints round away from zero; the fractional part is never truncated.
pub fn to_minor_units(price: Decimal) -> Option<i64> {
    price
        .checked_mul(Decimal::ONE_HUNDRED)?
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
}

impl PaymentSessionRequest {
    /// Validate the request and price every item in minor units.
    ///
    /// The currency is normalized to lowercase.
    pub fn to_line_items(&self) -> Result<Vec<CheckoutLineItem>, SessionError> {
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SessionError::Validation(
                "currency must be a three-letter ISO 4217 code".to_string(),
            ));
        }
        let currency = currency.to_ascii_lowercase();

        if self.order_id.trim().is_empty() {
            return Err(SessionError::Validation(
                "orderId should not be empty".to_string(),
            ));
        }

        if self.items.is_empty() {
            return Err(SessionError::Validation(
                "items must contain at least 1 element".to_string(),
            ));
        }

        self.items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                if item.name.trim().is_empty() {
                    return Err(SessionError::Validation(format!(
                        "items.{}.name should not be empty",
                        i
                    )));
                }
                if item.price <= Decimal::ZERO {
                    return Err(SessionError::Validation(format!(
                        "items.{}.price must be a positive number",
                        i
                    )));
                }
                if item.quantity == 0 {
                    return Err(SessionError::Validation(format!(
                        "items.{}.quantity must not be less than 1",
                        i
                    )));
                }

                let unit_amount = to_minor_units(item.price).ok_or_else(|| {
                    SessionError::Validation(format!("items.{}.price is out of range", i))
                })?;

                Ok(CheckoutLineItem {
                    name: item.name.clone(),
                    currency: currency.clone(),
                    unit_amount,
                    quantity: item.quantity,
                })
            })
            .collect()
    }
}
