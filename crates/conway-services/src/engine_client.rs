//! Engine client — one outbound round-trip per job.
//!
//! Every call opens a fresh connection to the selected engine, writes the
//! reduced job descriptor, half-closes, and reads the reply until the engine
//! closes the connection. A single timeout bounds the whole exchange.
//! There is no pooling and no retry.

use std::future::Future;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use conway_core::config::{DispatchConfig, EnginesConfig};
use conway_core::frame::{self, FrameError};
use conway_core::{EngineKind, EngineOutcome, EngineRequest};

use crate::error::DispatchError;

/// Transport to the compute engines.
///
/// Implemented over TCP by [`TcpEngineClient`]; tests substitute in-process
/// doubles.
pub trait EngineBackend: Send + Sync + 'static {
    /// Send one job to `engine` and return its raw reply text.
    fn round_trip(
        &self,
        engine: EngineKind,
        request: EngineRequest,
    ) -> impl Future<Output = Result<String, DispatchError>> + Send;
}

/// Run one job and fold every failure into an [`EngineOutcome`].
///
/// `request_id` is attached locally; it is never sent to the engine.
pub async fn call<E: EngineBackend>(
    backend: &E,
    request_id: &str,
    engine: EngineKind,
    request: EngineRequest,
) -> EngineOutcome {
    match backend.round_trip(engine, request).await {
        Ok(text) => EngineOutcome::from_reply(request_id, text),
        Err(e) => {
            tracing::warn!(request_id, %engine, error = %e, "engine call failed");
            EngineOutcome::failed(request_id, e.to_string())
        }
    }
}

/// TCP client for the two configured engines.
#[derive(Debug, Clone)]
pub struct TcpEngineClient {
    engines: EnginesConfig,
    timeout: Duration,
    max_reply_bytes: usize,
}

impl TcpEngineClient {
    pub fn new(engines: EnginesConfig, dispatch: &DispatchConfig) -> Self {
        Self {
            engines,
            timeout: dispatch.engine_timeout(),
            max_reply_bytes: dispatch.max_reply_bytes,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl EngineBackend for TcpEngineClient {
    async fn round_trip(
        &self,
        engine: EngineKind,
        request: EngineRequest,
    ) -> Result<String, DispatchError> {
        let addr = self.engines.endpoint(engine).addr();
        let exchange = exchange(engine, &addr, request, self.max_reply_bytes);
        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::EngineTimeout {
                engine,
                after: self.timeout,
            }),
        }
    }
}

async fn exchange(
    engine: EngineKind,
    addr: &str,
    request: EngineRequest,
    max_reply_bytes: usize,
) -> Result<String, DispatchError> {
    let mut stream =
        TcpStream::connect(addr)
            .await
            .map_err(|source| DispatchError::EngineUnavailable {
                engine,
                addr: addr.to_string(),
                source,
            })?;
    tracing::debug!(%engine, addr, "connected to engine");

    let io_err = |source| DispatchError::EngineIo { engine, source };

    let payload = serde_json::to_vec(&request)?;
    stream.write_all(&payload).await.map_err(io_err)?;
    stream.shutdown().await.map_err(io_err)?;

    let raw = frame::read_to_end_bounded(&mut stream, max_reply_bytes)
        .await
        .map_err(|e| match e {
            FrameError::TooLarge { limit } => DispatchError::ReplyTooLarge { engine, limit },
            FrameError::Io(source) => DispatchError::EngineIo { engine, source },
            other => DispatchError::EngineIo {
                engine,
                source: std::io::Error::other(other.to_string()),
            },
        })?;

    tracing::debug!(%engine, bytes = raw.len(), "engine reply received");
    String::from_utf8(raw).map_err(|source| DispatchError::EngineDecode { engine, source })
}
