//! Runs the HTTP server and the bus RPC consumer as one process.
//!
//! Both halves stop on the same shutdown flag. If the consumer ends before
//! shutdown was requested, the server is stopped too and the process exits
//! with the consumer's error.

use std::future::Future;

use anyhow::{anyhow, Context, Result};
use tokio::{sync::watch, task::JoinHandle};
use tracing::{error, info};

/// Resolve once the shutdown flag flips.
pub async fn wait_for(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Drive `server` and `consumer` until both have stopped.
///
/// `server` must resolve once `shutdown` is set to `true`.
pub async fn run_until_stopped<S>(
    server: S,
    mut consumer: JoinHandle<Result<()>>,
    shutdown: &watch::Sender<bool>,
) -> Result<()>
where
    S: Future<Output = std::io::Result<()>>,
{
    tokio::pin!(server);

    tokio::select! {
        served = &mut server => {
            let served = served.context("Server error");
            // No-op after a signal; stops the consumer if the server failed
            shutdown.send_replace(true);
            let consumed = consumer_outcome(consumer.await, true);
            served.and(consumed)
        }
        joined = &mut consumer => {
            let requested = *shutdown.borrow();
            let consumed = consumer_outcome(joined, requested);
            if let Err(e) = &consumed {
                error!(error = %format!("{:#}", e), "rpc_consumer_failed");
                shutdown.send_replace(true);
            }
            let served = server.await.context("Server error");
            consumed.and(served)
        }
    }
}

fn consumer_outcome(
    joined: std::result::Result<Result<()>, tokio::task::JoinError>,
    shutdown_requested: bool,
) -> Result<()> {
    joined.context("RPC consumer panicked")??;

    if shutdown_requested {
        info!("rpc_consumer_stopped");
        Ok(())
    } else {
        Err(anyhow!("RPC consumer stopped before shutdown"))
    }
}
