//! conway-core — shared types, wire format, framing, result extraction and
//! configuration. All other Conway crates depend on this one.

pub mod config;
pub mod frame;
pub mod metrics;
pub mod outcome;
pub mod record;
pub mod wire;

pub use config::{ConwayConfig, EngineEndpoint};
pub use frame::{FrameError, FrameReader};
pub use metrics::ExtractedMetrics;
pub use outcome::EngineOutcome;
pub use record::{RequestContext, TelemetryRecord};
pub use wire::{ClientReply, EngineKind, EngineRequest, JobRequest, ReplyStatus};
