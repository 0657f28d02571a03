//! Engine server — one job per connection.
//!
//! Reads a single `{"powmin":..,"powmax":..}` request, runs the configured
//! program with the two powers appended, writes the program's stdout (or an
//! `ERROR:` line) and closes. The reply is delimited by the close.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, Semaphore};

use conway_core::{EngineRequest, FrameReader};

use crate::config::EngineConfig;
use crate::process::{run_process, ProcessSpec};

pub struct EngineServer {
    spec: ProcessSpec,
    workers: Arc<Semaphore>,
    max_frame_bytes: usize,
}

impl EngineServer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            spec: config.process_spec(),
            workers: Arc::new(Semaphore::new(config.max_workers.max(1))),
            max_frame_bytes: config.max_frame_bytes,
        }
    }

    /// Accept dispatcher connections until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let local = listener
            .local_addr()
            .context("listener has no local address")?;
        tracing::info!(addr = %local, program = %self.spec.program, "engine listening");

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let server = self.clone();
                        tokio::spawn(async move { server.handle(stream, peer).await });
                    }
                    Err(e) => tracing::warn!(error = %e, "accept failed"),
                },
                _ = shutdown.recv() => break,
            }
        }
        Ok(())
    }

    /// Serve one job on `stream`.
    pub async fn handle<S>(&self, stream: S, peer: SocketAddr)
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let (reader, mut writer) = tokio::io::split(stream);
        let mut frames = FrameReader::new(reader, self.max_frame_bytes);

        let reply = match frames.next_value().await {
            Ok(Some(value)) => match serde_json::from_value::<EngineRequest>(value) {
                Ok(request) => self.run(request).await,
                Err(e) => format!("ERROR: {e}"),
            },
            Ok(None) => {
                tracing::info!(%peer, "no data received, closing connection");
                return;
            }
            Err(e) => format!("ERROR: {e}"),
        };

        if let Err(e) = writer.write_all(reply.as_bytes()).await {
            tracing::warn!(%peer, error = %e, "failed to send reply");
        }
        let _ = writer.shutdown().await;
        tracing::debug!(%peer, "connection closed");
    }

    async fn run(&self, request: EngineRequest) -> String {
        tracing::info!(powmin = request.powmin, powmax = request.powmax, "job received");
        let _permit = match self.workers.acquire().await {
            Ok(permit) => permit,
            Err(_) => return "ERROR: engine is shutting down".to_string(),
        };

        let spec = self
            .spec
            .with_args([request.powmin.to_string(), request.powmax.to_string()]);
        let outcome = run_process(&spec).await;
        if !outcome.is_success() {
            tracing::error!(?outcome, "job failed");
        }
        outcome.into_reply()
    }
}
