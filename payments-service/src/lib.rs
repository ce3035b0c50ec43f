//! Payments service.
//!
//! Opens hosted checkout sessions with the payment processor and turns its
//! verified webhook callbacks into bus events for other services.
//!
//! ## Architecture
//!
//! ```text
//! Caller (HTTP / bus RPC) → SessionInitiator → PaymentProcessor → checkout session
//! Processor webhook → WebhookDispatcher → verify → payment.succeeded → EventBus
//! ```

pub mod checkout;
pub mod config;
pub mod error;
pub mod processor;
pub mod queue;
pub mod rpc;
pub mod service;
pub mod web;
pub mod webhook;

// Re-export commonly used types
pub use checkout::{PaymentSessionRequest, PaymentSessionResult, SessionInitiator};
pub use config::{Config, ConfigError};
pub use error::{ErrorBody, SessionError};
pub use processor::{PaymentProcessor, StripeClient};
pub use queue::{EventBus, PaymentSucceeded, Publisher, PAYMENT_SUCCEEDED};
pub use web::AppState;
pub use webhook::{Dispatch, WebhookDispatcher};
