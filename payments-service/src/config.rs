//! Configuration module for environment variable parsing.
//!
//! All configuration comes from environment variables and is validated once at
//! startup. A missing or malformed required value is a hard error: the process
//! must not start half-configured.

use std::env;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;
use url::Url;

/// Error raised while loading configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port for the web server to listen on
    pub port: u16,

    /// Processor secret API key
    pub stripe_secret: SecretString,

    /// Shared secret used to sign webhook deliveries
    pub stripe_webhook_secret: SecretString,

    /// Redirect target after a completed checkout
    pub stripe_success_url: String,

    /// Redirect target after an abandoned checkout
    pub stripe_cancel_url: String,

    /// Base URL of the processor REST API
    pub stripe_api_base: String,

    /// Timeout for every processor API call
    pub stripe_timeout: Duration,

    /// Maximum accepted age of a webhook signature timestamp (0 disables)
    pub webhook_tolerance_secs: u64,

    /// Broker URLs, tried in order when connecting
    pub amqp_servers: Vec<String>,

    /// Topic exchange that receives outbound payment events
    pub events_exchange: String,

    /// Queue serving session creation over the bus
    pub rpc_queue: String,

    /// Maximum number of unacknowledged RPC deliveries
    pub rpc_prefetch: u16,

    /// Per-request timeout enforced by the HTTP layer
    pub http_request_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let stripe_api_base = optional(&lookup, "STRIPE_API_BASE")
            .unwrap_or_else(|| "https://api.stripe.com".to_string());
        parse_url("STRIPE_API_BASE", &stripe_api_base)?;

        let amqp_servers = parse_csv(&required(&lookup, "AMQP_SERVERS")?);
        if amqp_servers.is_empty() {
            return Err(ConfigError::Invalid {
                name: "AMQP_SERVERS",
                reason: "no broker URL given".to_string(),
            });
        }

        Ok(Config {
            port: parse_or(&lookup, "PORT", 3000)?,

            stripe_secret: SecretString::new(required(&lookup, "STRIPE_SECRET")?),

            stripe_webhook_secret: SecretString::new(required(&lookup, "STRIPE_WEBHOOK_SECRET")?),

            stripe_success_url: parse_url(
                "STRIPE_SUCCESS_URL",
                &required(&lookup, "STRIPE_SUCCESS_URL")?,
            )?,

            stripe_cancel_url: parse_url(
                "STRIPE_CANCEL_URL",
                &required(&lookup, "STRIPE_CANCEL_URL")?,
            )?,

            stripe_api_base: stripe_api_base.trim_end_matches('/').to_string(),

            stripe_timeout: Duration::from_millis(parse_or(&lookup, "STRIPE_TIMEOUT_MS", 10_000)?),

            webhook_tolerance_secs: parse_or(&lookup, "STRIPE_WEBHOOK_TOLERANCE_SECS", 300)?,

            amqp_servers,

            events_exchange: optional(&lookup, "PAYMENTS_EXCHANGE")
                .unwrap_or_else(|| "payments.events".to_string()),

            rpc_queue: optional(&lookup, "PAYMENTS_RPC_QUEUE")
                .unwrap_or_else(|| "create.payment.session".to_string()),

            rpc_prefetch: parse_or(&lookup, "RPC_PREFETCH", 16)?,

            http_request_timeout: Duration::from_millis(parse_or(
                &lookup,
                "HTTP_REQUEST_TIMEOUT_MS",
                15_000,
            )?),
        })
    }
}

/// Read a variable, treating blank values as unset.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

/// Parse an optional variable, falling back to `default` only when unset.
fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        }),
    }
}

fn parse_url(name: &'static str, raw: &str) -> Result<String, ConfigError> {
    Url::parse(raw)
        .map(|_| raw.to_string())
        .map_err(|e| ConfigError::Invalid {
            name,
            reason: e.to_string(),
        })
}

/// Parse a comma-separated list of strings.
fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
