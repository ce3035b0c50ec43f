//! Payments service binary.
//!
//! Runs the HTTP server (session creation, processor webhooks) and the bus
//! RPC consumer side by side until SIGINT/SIGTERM. If either stops on its
//! own, the other is shut down and the process exits with an error.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal, sync::watch};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use payments::service::{run_until_stopped, wait_for};
use payments::{
    rpc, web, AppState, Config, Publisher, SessionInitiator, StripeClient, WebhookDispatcher,
};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set
    let dotenv = dotenvy::dotenv();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!(dotenv_loaded = dotenv.is_ok(), "payments_service_starting");

    let config = Config::from_env().context("Config validation error")?;
    info!(
        port = config.port,
        stripe_api_base = %config.stripe_api_base,
        stripe_timeout_ms = config.stripe_timeout.as_millis() as u64,
        webhook_tolerance_secs = config.webhook_tolerance_secs,
        amqp_servers = config.amqp_servers.len(),
        events_exchange = %config.events_exchange,
        rpc_queue = %config.rpc_queue,
        "config_loaded"
    );

    let stripe = Arc::new(StripeClient::from_config(&config).context("Failed to build Stripe client")?);
    let publisher = Publisher::new(config.amqp_servers.clone(), config.events_exchange.clone());

    let initiator = SessionInitiator::new(
        stripe.clone(),
        config.stripe_success_url.clone(),
        config.stripe_cancel_url.clone(),
    );
    let dispatcher = WebhookDispatcher::new(stripe, Arc::new(publisher.clone()));

    let state = AppState::new(config, initiator.clone(), dispatcher);
    let config = Arc::clone(&state.config);
    let app = web::router(state);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let rpc_task = tokio::spawn(rpc::run(
        Arc::clone(&config),
        initiator,
        wait_for(shutdown_rx.clone()),
    ));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "payments_service_listening");

    let shutdown_tx = Arc::new(shutdown_tx);
    tokio::spawn({
        let shutdown_tx = Arc::clone(&shutdown_tx);
        async move {
            shutdown_signal().await;
            shutdown_tx.send_replace(true);
        }
    });

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(wait_for(shutdown_rx))
        .into_future();

    let result = run_until_stopped(server, rpc_task, &shutdown_tx).await;

    // Close publisher connection
    publisher.close().await;

    match &result {
        Ok(()) => info!("payments_service_shutdown_complete"),
        Err(e) => error!(error = %format!("{:#}", e), "payments_service_failed"),
    }

    result
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("payments_service_shutting_down");
}
