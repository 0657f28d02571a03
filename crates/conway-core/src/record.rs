//! Telemetry record — one structured observation per request.
//!
//! Construction is pure: given the request, its outcome and the extracted
//! metrics, [`TelemetryRecord::build`] always yields the same record without
//! touching the network. Delivery lives in the services crate.
//!
//! Field names and types follow the telemetry index mapping, which is
//! provisioned once out of band (see [`index_mapping`]).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::metrics::ExtractedMetrics;
use crate::outcome::EngineOutcome;
use crate::wire::{JobRequest, ReplyStatus};

/// Per-request facts known to the connection handler but not to the engine.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// Peer IP of the client connection.
    pub client_id: String,
    /// Node name of the dispatcher that served the request.
    pub host_node: String,
    /// Approximate number of connected clients when the request finished.
    pub active_clients: usize,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub request_id: String,
    pub client_id: String,
    /// Engine selector as requested by the client.
    pub engine: String,
    pub powmin: i64,
    pub powmax: i64,
    pub start_time: String,
    pub end_time: String,
    /// Engine-reported compute time in milliseconds, `0` when not reported.
    pub duration_ms: f64,
    pub status: ReplyStatus,
    pub error_message: Option<String>,
    /// Summed generations, `-1` when not reported.
    pub num_generations: i64,
    /// Last reported board size, `-1` when not reported.
    pub board_size: i64,
    pub host_node: String,
    pub num_clients_active: usize,
    pub timestamp: String,
}

impl TelemetryRecord {
    /// Build the record for a finished request. `timestamp` is the moment
    /// the record was created, usually `Utc::now()`.
    pub fn build(
        ctx: &RequestContext,
        request: &JobRequest,
        outcome: &EngineOutcome,
        metrics: &ExtractedMetrics,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let status = if outcome.succeeded {
            ReplyStatus::Ok
        } else {
            ReplyStatus::Error
        };
        Self {
            request_id: ctx.request_id.clone(),
            client_id: ctx.client_id.clone(),
            engine: request.engine.clone(),
            powmin: request.powmin,
            powmax: request.powmax,
            start_time: rfc3339(ctx.start_time),
            end_time: rfc3339(ctx.end_time),
            duration_ms: metrics.duration_ms(),
            status,
            error_message: outcome.error_detail.clone(),
            num_generations: metrics.generations_or_sentinel(),
            board_size: metrics.board_size_or_sentinel(),
            host_node: ctx.host_node.clone(),
            num_clients_active: ctx.active_clients,
            timestamp: rfc3339(timestamp),
        }
    }
}

fn rfc3339(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Index mapping for the telemetry store, as a create-index request body.
pub fn index_mapping() -> serde_json::Value {
    serde_json::json!({
        "mappings": {
            "properties": {
                "request_id":         { "type": "keyword" },
                "client_id":          { "type": "keyword" },
                "engine":             { "type": "keyword" },
                "powmin":             { "type": "integer" },
                "powmax":             { "type": "integer" },
                "start_time":         { "type": "date" },
                "end_time":           { "type": "date" },
                "duration_ms":        { "type": "float" },
                "status":             { "type": "keyword" },
                "error_message":      { "type": "text" },
                "num_generations":    { "type": "integer" },
                "board_size":         { "type": "integer" },
                "num_clients_active": { "type": "integer" },
                "host_node":          { "type": "keyword" },
                "timestamp":          { "type": "date" }
            }
        }
    })
}
