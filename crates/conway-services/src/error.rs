//! Dispatch error taxonomy.
//!
//! Protocol errors end the client connection. Everything else is caught at
//! the connection handler, recorded in telemetry and sent to the client as
//! an error reply on a connection that stays open.
//!
//! An engine that answers with an error marker (`ERROR:` / `Exception:`) is
//! not a `DispatchError`: the reply arrived, and `EngineOutcome::from_reply`
//! classifies it.

use std::time::Duration;

use conway_core::wire::UnknownEngine;
use conway_core::{EngineKind, FrameError};

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Client bytes could not be framed or decoded into a job request.
    #[error("invalid request: {0}")]
    Protocol(String),

    /// The client connection itself failed mid-read.
    #[error("client connection failed: {0}")]
    ClientIo(std::io::Error),

    #[error(transparent)]
    UnknownEngine(#[from] UnknownEngine),

    #[error("engine {engine} unreachable at {addr}: {source}")]
    EngineUnavailable {
        engine: EngineKind,
        addr: String,
        source: std::io::Error,
    },

    #[error("engine {engine} did not reply within {}s", .after.as_secs())]
    EngineTimeout { engine: EngineKind, after: Duration },

    #[error("engine {engine} connection failed: {source}")]
    EngineIo {
        engine: EngineKind,
        source: std::io::Error,
    },

    #[error("engine {engine} reply exceeds {limit} bytes")]
    ReplyTooLarge { engine: EngineKind, limit: usize },

    #[error("engine {engine} reply is not valid UTF-8: {source}")]
    EngineDecode {
        engine: EngineKind,
        source: std::string::FromUtf8Error,
    },

    #[error("mismatched request id: expected {expected}, got {got}")]
    CorrelationMismatch { expected: String, got: String },

    #[error("dispatcher is shutting down")]
    ShuttingDown,
}

impl DispatchError {
    pub fn is_protocol(&self) -> bool {
        matches!(self, DispatchError::Protocol(_))
    }
}

impl From<FrameError> for DispatchError {
    fn from(e: FrameError) -> Self {
        match e {
            FrameError::Io(source) => DispatchError::ClientIo(source),
            other => DispatchError::Protocol(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(e: serde_json::Error) -> Self {
        DispatchError::Protocol(e.to_string())
    }
}
