//! Telemetry emitter — ships one record per request to the document store.
//!
//! Handlers call [`TelemetryEmitter::emit`], which never waits: the record
//! goes onto a bounded queue and a dedicated flusher task delivers it. The
//! flusher retries transient failures with exponential backoff and then
//! gives up. A full queue drops the record. Nothing here ever reaches the
//! client reply path, and telemetry never holds a dispatch permit.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

use conway_core::config::TelemetryConfig;
use conway_core::TelemetryRecord;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("telemetry store unreachable: {0}")]
    Transport(String),
    #[error("telemetry store rejected record: HTTP {status}")]
    Rejected { status: u16 },
    #[error("failed to build telemetry client: {0}")]
    Client(String),
}

impl TelemetryError {
    /// Worth retrying: network failures, throttling and server errors.
    pub fn is_transient(&self) -> bool {
        match self {
            TelemetryError::Transport(_) => true,
            TelemetryError::Rejected { status } => *status == 429 || *status >= 500,
            TelemetryError::Client(_) => false,
        }
    }
}

/// Destination for telemetry records.
pub trait TelemetrySink: Send + Sync + 'static {
    fn send(
        &self,
        record: &TelemetryRecord,
    ) -> impl Future<Output = Result<(), TelemetryError>> + Send;
}

// ── Sinks ─────────────────────────────────────────────────────────────────────

/// Indexes records into a document store over HTTP
/// (`POST {url}/{index}/_doc`).
#[derive(Debug, Clone)]
pub struct HttpSink {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpSink {
    pub fn new(settings: &TelemetryConfig) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| TelemetryError::Client(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: document_endpoint(&settings.url, &settings.index),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn document_endpoint(url: &str, index: &str) -> String {
    format!("{}/{}/_doc", url.trim_end_matches('/'), index)
}

impl TelemetrySink for HttpSink {
    async fn send(&self, record: &TelemetryRecord) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(record)
            .send()
            .await
            .map_err(|e| TelemetryError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Rejected {
                status: status.as_u16(),
            })
        }
    }
}

/// Discards every record. Used when telemetry is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    async fn send(&self, _record: &TelemetryRecord) -> Result<(), TelemetryError> {
        Ok(())
    }
}

// ── Emitter ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts per record, including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
}

impl RetryPolicy {
    pub fn from_config(settings: &TelemetryConfig) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_backoff: settings.backoff(),
        }
    }

    /// Sleep before retry number `retry` (1-based): base, 2×base, 4×base, …
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(factor)
            .unwrap_or(MAX_BACKOFF)
            .min(MAX_BACKOFF)
    }
}

/// Delivery counters, readable while the flusher runs.
#[derive(Debug, Default)]
pub struct TelemetryStats {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl TelemetryStats {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Records given up on after exhausting retries or a permanent error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Records never queued because the queue was full or closed.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Non-blocking handle used by connection handlers.
#[derive(Clone)]
pub struct TelemetryEmitter {
    tx: mpsc::Sender<TelemetryRecord>,
    stats: Arc<TelemetryStats>,
}

/// Owns the background flusher task.
pub struct TelemetryFlusher {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl TelemetryEmitter {
    /// Start a flusher for `sink` and return the emitter feeding it.
    pub fn spawn<S: TelemetrySink>(
        sink: S,
        capacity: usize,
        policy: RetryPolicy,
    ) -> (Self, TelemetryFlusher) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let stats = Arc::new(TelemetryStats::default());
        let stop = Arc::new(Notify::new());

        let task = tokio::spawn(run_flusher(
            sink,
            rx,
            policy,
            stats.clone(),
            stop.clone(),
        ));

        (Self { tx, stats }, TelemetryFlusher { stop, task })
    }

    /// Queue a record for delivery. Never blocks; drops on overflow.
    pub fn emit(&self, record: TelemetryRecord) {
        match self.tx.try_send(record) {
            Ok(()) => {}
            Err(TrySendError::Full(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request_id = %record.request_id,
                    "telemetry queue full, dropping record"
                );
            }
            Err(TrySendError::Closed(record)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    request_id = %record.request_id,
                    "telemetry flusher stopped, dropping record"
                );
            }
        }
    }

    pub fn stats(&self) -> &TelemetryStats {
        &self.stats
    }
}

impl TelemetryFlusher {
    /// Stop accepting records, deliver what is queued, and wait up to
    /// `grace` for the flusher to finish.
    pub async fn shutdown(self, grace: Duration) {
        self.stop.notify_one();
        match tokio::time::timeout(grace, self.task).await {
            Ok(Ok(())) => tracing::debug!("telemetry flusher drained"),
            Ok(Err(e)) => tracing::warn!(error = %e, "telemetry flusher panicked"),
            Err(_) => tracing::warn!("telemetry flusher did not drain in time"),
        }
    }
}

async fn run_flusher<S: TelemetrySink>(
    sink: S,
    mut rx: mpsc::Receiver<TelemetryRecord>,
    policy: RetryPolicy,
    stats: Arc<TelemetryStats>,
    stop: Arc<Notify>,
) {
    tracing::debug!(max_attempts = policy.max_attempts, "telemetry flusher started");
    loop {
        tokio::select! {
            record = rx.recv() => match record {
                Some(record) => deliver(&sink, &record, &policy, &stats).await,
                None => break,
            },
            _ = stop.notified() => {
                rx.close();
                while let Some(record) = rx.recv().await {
                    deliver(&sink, &record, &policy, &stats).await;
                }
                break;
            }
        }
    }
    tracing::debug!("telemetry flusher stopped");
}

async fn deliver<S: TelemetrySink>(
    sink: &S,
    record: &TelemetryRecord,
    policy: &RetryPolicy,
    stats: &TelemetryStats,
) {
    let mut attempt = 1;
    loop {
        match sink.send(record).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(request_id = %record.request_id, attempt, "telemetry delivered");
                return;
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    request_id = %record.request_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "telemetry delivery failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    request_id = %record.request_id,
                    attempt,
                    error = %e,
                    "telemetry delivery failed, dropping record"
                );
                return;
            }
        }
    }
}
