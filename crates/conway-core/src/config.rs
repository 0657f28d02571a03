//! Configuration system for Conway.
//!
//! Resolution order: environment variables → config file → defaults.
//!
//! Config file location:
//!   1. $CONWAY_CONFIG (explicit override)
//!   2. $XDG_CONFIG_HOME/conway/config.toml
//!   3. ~/.config/conway/config.toml
//!
//! Everything is read once at startup and stays fixed for the process
//! lifetime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::wire::EngineKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConwayConfig {
    pub listen: ListenConfig,
    pub engines: EnginesConfig,
    pub dispatch: DispatchConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    pub host: String,
    /// 0 = OS-assigned.
    pub port: u16,
}

/// Address of one backend engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEndpoint {
    pub host: String,
    pub port: u16,
}

impl EngineEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnginesConfig {
    pub mpi: EngineEndpoint,
    pub spark: EngineEndpoint,
}

impl EnginesConfig {
    pub fn endpoint(&self, kind: EngineKind) -> &EngineEndpoint {
        match kind {
            EngineKind::Mpi => &self.mpi,
            EngineKind::Spark => &self.spark,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Max engine round-trips in flight across all connections.
    pub max_concurrent: u32,
    /// Bound on one engine round-trip: connect, send and full reply.
    pub engine_timeout_secs: u64,
    /// Largest accepted client request.
    pub max_frame_bytes: usize,
    /// Largest accepted engine reply.
    pub max_reply_bytes: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub enabled: bool,
    /// Base URL of the document store.
    pub url: String,
    pub index: String,
    /// Records buffered ahead of the flusher. Overflow is dropped.
    pub queue_capacity: usize,
    /// Delivery attempts per record, including the first.
    pub max_attempts: u32,
    /// Backoff before the first retry. Doubles on every further retry.
    pub backoff_ms: u64,
    pub request_timeout_secs: u64,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

impl Default for EnginesConfig {
    fn default() -> Self {
        Self {
            mpi: EngineEndpoint::new("engine-mpi", 5000),
            spark: EngineEndpoint::new("engine-spark", 5001),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
            engine_timeout_secs: 600,
            max_frame_bytes: 64 * 1024,
            max_reply_bytes: 1024 * 1024,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "http://elasticsearch-master:9200".to_string(),
            index: "observabilidade".to_string(),
            queue_capacity: 1024,
            max_attempts: 3,
            backoff_ms: 200,
            request_timeout_secs: 5,
        }
    }
}

impl DispatchConfig {
    pub fn engine_timeout(&self) -> Duration {
        Duration::from_secs(self.engine_timeout_secs)
    }

    /// Permit count for the dispatch semaphore. Never zero.
    pub fn permits(&self) -> usize {
        self.max_concurrent.max(1) as usize
    }
}

impl TelemetryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// ── Path helpers ──────────────────────────────────────────────────────────────

fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| dirs_or_home().join(".config"))
        .join("conway")
}

fn dirs_or_home() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
}

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to parse {0}: {1}")]
    ParseFailed(PathBuf, toml::de::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("failed to serialize: {0}")]
    SerializeFailed(toml::ser::Error),
}

// ── Loading ───────────────────────────────────────────────────────────────────

impl ConwayConfig {
    /// Load config: env vars → file → defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::file_path();
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            ConwayConfig::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadFailed(path.to_path_buf(), e))?;
        toml::from_str(&text).map_err(|e| ConfigError::ParseFailed(path.to_path_buf(), e))
    }

    /// Config file path.
    pub fn file_path() -> PathBuf {
        std::env::var("CONWAY_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| config_dir().join("config.toml"))
    }

    /// Write default config if none exists. Returns the path.
    pub fn write_default_if_missing() -> Result<PathBuf, ConfigError> {
        let path = Self::file_path();
        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
            }
            let text = toml::to_string_pretty(&ConwayConfig::default())
                .map_err(ConfigError::SerializeFailed)?;
            std::fs::write(&path, text).map_err(|e| ConfigError::WriteFailed(path.clone(), e))?;
        }
        Ok(path)
    }

    /// Apply CONWAY_* overrides. `lookup` is `std::env::var` in production;
    /// tests pass a map so they never touch the process environment.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CONWAY_LISTEN__HOST") {
            self.listen.host = v;
        }
        override_parsed(&lookup, "CONWAY_LISTEN__PORT", &mut self.listen.port);

        if let Some(v) = lookup("CONWAY_ENGINES__MPI__HOST") {
            self.engines.mpi.host = v;
        }
        override_parsed(&lookup, "CONWAY_ENGINES__MPI__PORT", &mut self.engines.mpi.port);
        if let Some(v) = lookup("CONWAY_ENGINES__SPARK__HOST") {
            self.engines.spark.host = v;
        }
        override_parsed(&lookup, "CONWAY_ENGINES__SPARK__PORT", &mut self.engines.spark.port);

        override_parsed(
            &lookup,
            "CONWAY_DISPATCH__MAX_CONCURRENT",
            &mut self.dispatch.max_concurrent,
        );
        override_parsed(
            &lookup,
            "CONWAY_DISPATCH__ENGINE_TIMEOUT_SECS",
            &mut self.dispatch.engine_timeout_secs,
        );
        override_parsed(
            &lookup,
            "CONWAY_DISPATCH__MAX_FRAME_BYTES",
            &mut self.dispatch.max_frame_bytes,
        );
        override_parsed(
            &lookup,
            "CONWAY_DISPATCH__MAX_REPLY_BYTES",
            &mut self.dispatch.max_reply_bytes,
        );

        if let Some(v) = lookup("CONWAY_TELEMETRY__ENABLED") {
            self.telemetry.enabled = v == "true" || v == "1";
        }
        if let Some(v) = lookup("CONWAY_TELEMETRY__URL") {
            self.telemetry.url = v;
        }
        if let Some(v) = lookup("CONWAY_TELEMETRY__INDEX") {
            self.telemetry.index = v;
        }
        override_parsed(
            &lookup,
            "CONWAY_TELEMETRY__QUEUE_CAPACITY",
            &mut self.telemetry.queue_capacity,
        );
        override_parsed(
            &lookup,
            "CONWAY_TELEMETRY__MAX_ATTEMPTS",
            &mut self.telemetry.max_attempts,
        );
        override_parsed(
            &lookup,
            "CONWAY_TELEMETRY__BACKOFF_MS",
            &mut self.telemetry.backoff_ms,
        );
        override_parsed(
            &lookup,
            "CONWAY_TELEMETRY__REQUEST_TIMEOUT_SECS",
            &mut self.telemetry.request_timeout_secs,
        );
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, slot: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(v) = lookup(key) {
        match v.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(key, value = %v, "ignoring unparseable override"),
        }
    }
}
