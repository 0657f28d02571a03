//! Conway wire format — the client protocol and the backend protocol.
//!
//! Client side: the client writes one JSON object per request and reads one
//! JSON object per reply. Replies are newline-terminated so line-oriented
//! clients can split them; requests need no terminator (see `frame`).
//!
//! Backend side: one request per connection. The dispatcher writes an
//! `EngineRequest` and the backend answers with plain text, delimited by
//! closing the connection.
//!
//! These shapes are a contract with existing clients and engines. The
//! malformed-request envelope in particular differs from a normal error
//! reply and must stay byte-for-byte as it is.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sent verbatim when a client request cannot be decoded. The connection is
/// closed right after.
pub const INVALID_JSON_REPLY: &[u8] = br#"{"status":"error","message":"invalid JSON"}"#;

// ── Engine selector ──────────────────────────────────────────────────────────

/// Which backend compute engine handles a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    /// MPI/OpenMP engine, shells out to a parallel binary.
    Mpi,
    /// Spark engine, runs the iterative simulation itself.
    Spark,
}

impl EngineKind {
    pub const ALL: [EngineKind; 2] = [EngineKind::Mpi, EngineKind::Spark];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::Mpi => "mpi",
            EngineKind::Spark => "spark",
        }
    }
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selector string that names neither known engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown engine {0:?} (expected \"mpi\" or \"spark\")")]
pub struct UnknownEngine(pub String);

impl FromStr for EngineKind {
    type Err = UnknownEngine;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mpi" => Ok(EngineKind::Mpi),
            "spark" => Ok(EngineKind::Spark),
            other => Err(UnknownEngine(other.to_string())),
        }
    }
}

// ── Client protocol ──────────────────────────────────────────────────────────

/// A decoded client request.
///
/// All three fields are required. The powers are not range checked here:
/// `powmin > powmax` and negative values are passed through to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// Raw selector as sent by the client. Resolved with [`JobRequest::engine_kind`].
    pub engine: String,
    pub powmin: i64,
    pub powmax: i64,
}

impl JobRequest {
    /// Decode a request from an already-framed JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn engine_kind(&self) -> Result<EngineKind, UnknownEngine> {
        self.engine.parse()
    }

    /// The reduced payload forwarded to a backend.
    pub fn engine_request(&self) -> EngineRequest {
        EngineRequest {
            powmin: self.powmin,
            powmax: self.powmax,
        }
    }
}

/// Outcome of one request as seen by the client and by telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyStatus {
    Ok,
    Error,
}

impl ReplyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "ok",
            ReplyStatus::Error => "error",
        }
    }
}

/// One reply per request. `data` and `error` are always present on the wire,
/// as `null` when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientReply {
    pub status: ReplyStatus,
    pub data: Option<String>,
    pub error: Option<String>,
    pub request_id: String,
}

impl ClientReply {
    pub fn ok(request_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Ok,
            data: Some(data.into()),
            error: None,
            request_id: request_id.into(),
        }
    }

    pub fn error(request_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Error,
            data: None,
            error: Some(error.into()),
            request_id: request_id.into(),
        }
    }

    /// Serialized reply followed by a newline.
    pub fn to_line(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut out = serde_json::to_vec(self)?;
        out.push(b'\n');
        Ok(out)
    }
}

// ── Backend protocol ─────────────────────────────────────────────────────────

/// Job descriptor sent to a backend. Carries no correlation id and no
/// client id: backends are correlation-blind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineRequest {
    pub powmin: i64,
    pub powmax: i64,
}
