//! Engine outcome — what one engine round-trip produced.

use crate::metrics;

/// Verbatim backend response plus a success flag.
///
/// Every failure mode of a round-trip (unreachable engine, timeout, error
/// reply) is expressed as an outcome with `succeeded == false`, so callers
/// never have to handle a separate error path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOutcome {
    /// Correlation id of the request this outcome belongs to. Attached by
    /// the dispatcher; engines never see or echo it.
    pub request_id: String,
    pub raw_text: String,
    pub succeeded: bool,
    pub error_detail: Option<String>,
}

impl EngineOutcome {
    /// Classify a backend reply. Text starting with an error marker is a
    /// failure reported by the engine itself.
    pub fn from_reply(request_id: impl Into<String>, raw_text: String) -> Self {
        if metrics::is_error_text(&raw_text) {
            let detail = raw_text.trim().to_string();
            Self {
                request_id: request_id.into(),
                raw_text,
                succeeded: false,
                error_detail: Some(detail),
            }
        } else {
            Self {
                request_id: request_id.into(),
                raw_text,
                succeeded: true,
                error_detail: None,
            }
        }
    }

    /// A round-trip that never produced a reply.
    pub fn failed(request_id: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            raw_text: String::new(),
            succeeded: false,
            error_detail: Some(detail.into()),
        }
    }
}
