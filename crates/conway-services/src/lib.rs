//! conway-services — the dispatcher: engine client, telemetry emitter,
//! per-connection handler and accept loop.

pub mod context;
pub mod engine_client;
pub mod error;
pub mod handler;
pub mod server;
pub mod telemetry;

pub use context::{ConnectionGuard, ConnectionRegistry, ServiceContext};
pub use engine_client::{EngineBackend, TcpEngineClient};
pub use error::DispatchError;
pub use handler::{handle_connection, process_request};
pub use server::serve;
pub use telemetry::{
    HttpSink, NullSink, RetryPolicy, TelemetryEmitter, TelemetryError, TelemetryFlusher,
    TelemetrySink, TelemetryStats,
};
