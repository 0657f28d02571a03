//! Connection handler — one task per client connection.
//!
//! ```text
//! AWAIT_REQUEST ──frame──▶ DECODE ──ok──▶ DISPATCH ──▶ REPLY ──┐
//!      ▲                     │                                  │
//!      │                     └─malformed─▶ INVALID_JSON ─▶ close│
//!      └────────────────────────────────────────────────────────┘
//! ```
//!
//! Requests on one connection are handled strictly in order, one at a time.
//! A dispatch permit is held only while the engine round-trip runs, so an
//! idle connection costs the pool nothing.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use conway_core::wire::INVALID_JSON_REPLY;
use conway_core::{
    metrics, ClientReply, EngineKind, EngineOutcome, EngineRequest, FrameReader, JobRequest,
    RequestContext, TelemetryRecord,
};

use crate::context::ServiceContext;
use crate::engine_client::{self, EngineBackend};
use crate::error::DispatchError;

/// Serve one client until it disconnects or sends something undecodable.
pub async fn handle_connection<E, S>(ctx: Arc<ServiceContext<E>>, stream: S, peer: SocketAddr)
where
    E: EngineBackend,
    S: AsyncRead + AsyncWrite + Send + Unpin,
{
    let _registered = ctx.connections.register(peer);
    let client_id = peer.ip().to_string();
    tracing::info!(%peer, active = ctx.connections.active(), "client connected");

    let (reader, mut writer) = tokio::io::split(stream);
    let mut frames = FrameReader::new(reader, ctx.max_frame_bytes);

    loop {
        let request = match next_request(&mut frames).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(DispatchError::Protocol(reason)) => {
                tracing::warn!(%peer, %reason, "rejecting malformed request");
                if let Err(e) = writer.write_all(INVALID_JSON_REPLY).await {
                    tracing::debug!(%peer, error = %e, "failed to send rejection");
                }
                let _ = writer.shutdown().await;
                break;
            }
            Err(e) => {
                tracing::debug!(%peer, error = %e, "client read failed");
                break;
            }
        };

        let reply = process_request(&ctx, &request, &client_id).await;

        let line = match reply.to_line() {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(request_id = %reply.request_id, error = %e, "failed to encode reply");
                break;
            }
        };
        if let Err(e) = writer.write_all(&line).await {
            tracing::debug!(%peer, error = %e, "client write failed");
            break;
        }
    }

    tracing::info!(%peer, "client disconnected");
}

/// Read and decode the next job request. `Ok(None)` on clean close.
async fn next_request<R>(frames: &mut FrameReader<R>) -> Result<Option<JobRequest>, DispatchError>
where
    R: AsyncRead + Unpin,
{
    match frames.next_value().await? {
        Some(value) => Ok(Some(JobRequest::from_value(value)?)),
        None => Ok(None),
    }
}

/// Dispatch one decoded request, emit its telemetry record and build the
/// client reply. Never fails: every error becomes an error reply.
pub async fn process_request<E: EngineBackend>(
    ctx: &ServiceContext<E>,
    request: &JobRequest,
    client_id: &str,
) -> ClientReply {
    let request_id = Uuid::new_v4().to_string();
    let start_time = Utc::now();
    tracing::info!(
        %request_id,
        engine = %request.engine,
        powmin = request.powmin,
        powmax = request.powmax,
        "request received"
    );

    let outcome = match request.engine_kind() {
        Ok(engine) => dispatch(ctx, &request_id, engine, request.engine_request()).await,
        Err(e) => {
            let err = DispatchError::from(e);
            tracing::warn!(%request_id, error = %err, "rejecting request");
            EngineOutcome::failed(&request_id, err.to_string())
        }
    };
    let outcome = check_correlation(&request_id, outcome);
    let end_time = Utc::now();

    let metrics = metrics::extract(&outcome.raw_text);
    let context = RequestContext {
        request_id: request_id.clone(),
        client_id: client_id.to_string(),
        host_node: ctx.host_node.clone(),
        active_clients: ctx.connections.active(),
        start_time,
        end_time,
    };
    ctx.telemetry.emit(TelemetryRecord::build(
        &context, request, &outcome, &metrics, Utc::now(),
    ));

    if outcome.succeeded {
        tracing::info!(%request_id, "request completed");
        ClientReply::ok(request_id, outcome.raw_text)
    } else {
        let detail = outcome
            .error_detail
            .unwrap_or_else(|| "engine reported a failure".to_string());
        tracing::info!(%request_id, error = %detail, "request failed");
        ClientReply::error(request_id, detail)
    }
}

async fn dispatch<E: EngineBackend>(
    ctx: &ServiceContext<E>,
    request_id: &str,
    engine: EngineKind,
    request: EngineRequest,
) -> EngineOutcome {
    let _permit = match ctx.dispatch.acquire().await {
        Ok(permit) => permit,
        Err(_) => return EngineOutcome::failed(request_id, DispatchError::ShuttingDown.to_string()),
    };
    tracing::debug!(request_id, %engine, in_flight = ctx.in_flight(), "dispatching");
    engine_client::call(&ctx.engine, request_id, engine, request).await
}

/// The outcome must belong to the request that produced it.
fn check_correlation(request_id: &str, outcome: EngineOutcome) -> EngineOutcome {
    if outcome.request_id == request_id {
        return outcome;
    }
    let err = DispatchError::CorrelationMismatch {
        expected: request_id.to_string(),
        got: outcome.request_id,
    };
    tracing::error!(error = %err, "dropping engine reply");
    EngineOutcome::failed(request_id, err.to_string())
}
