//! conway-engine — reference compute engine: wraps an external simulation
//! program behind the one-job-per-connection backend protocol.

pub mod config;
pub mod process;
pub mod server;

pub use config::EngineConfig;
pub use process::{run_process, ProcessOutcome, ProcessSpec};
pub use server::EngineServer;
