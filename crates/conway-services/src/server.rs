//! Dispatcher accept loop.
//!
//! Every accepted connection runs in its own task. Connections are never
//! refused for lack of capacity; the dispatch semaphore in the context
//! bounds how many engine round-trips run at once.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::context::ServiceContext;
use crate::engine_client::EngineBackend;
use crate::handler::handle_connection;

/// Pause after a failed accept, e.g. when the process is out of descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accept clients until `shutdown` fires.
///
/// Connection tasks already running are left to finish on their own.
pub async fn serve<E: EngineBackend>(
    listener: TcpListener,
    ctx: Arc<ServiceContext<E>>,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    tracing::info!(
        addr = %local,
        max_concurrent = ctx.dispatch_capacity,
        "dispatcher listening"
    );

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nodelay(true) {
                        tracing::debug!(%peer, error = %e, "set_nodelay failed");
                    }
                    tokio::spawn(handle_connection(ctx.clone(), stream, peer));
                }
                Err(e) => {
                    tracing::warn!(error = %e, "accept failed");
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            _ = shutdown.recv() => {
                tracing::info!(active = ctx.connections.active(), "dispatcher stopping");
                break;
            }
        }
    }

    Ok(())
}
