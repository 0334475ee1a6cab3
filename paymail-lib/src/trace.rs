//! Network trace collection.
//!
//! Every DNS query and HTTP request issued during a resolution can be recorded
//! as a [`TraceEntry`] and handed to a caller-supplied [`TraceSink`]. Entries
//! carry a sequence number reserved when the request was issued, so a sink can
//! restore issue order even though concurrent requests finish out of order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of network interaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceKind {
    /// A DNS query.
    Dns,
    /// An HTTP request.
    Http,
}

/// One recorded network interaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Issue order within the resolution.
    pub sequence: u64,
    /// DNS or HTTP.
    pub kind: TraceKind,
    /// Query name or URL.
    pub target: String,
    /// Request summary (method and body, or record type).
    pub request: String,
    /// Response body or answer summary, if any arrived.
    pub response: Option<String>,
    /// HTTP status code.
    pub status: Option<u16>,
    /// Error message if the interaction failed.
    pub error: Option<String>,
    /// Wall-clock time the request was issued.
    pub started_at: DateTime<Utc>,
    /// Time until the response or error.
    pub duration: Duration,
}

/// Error recorded for requests abandoned before they finished.
pub const CANCELLED: &str = "cancelled";

/// Receiver of trace entries.
///
/// Implementations must accept concurrent calls.
pub trait TraceSink: Send + Sync {
    /// Record one entry.
    fn record(&self, entry: TraceEntry);
}

/// Trace sink that keeps entries in memory, ordered by sequence.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    entries: Mutex<Vec<TraceEntry>>,
}

impl MemoryTraceSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the recorded entries in issue order.
    pub fn entries(&self) -> Vec<TraceEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded entries.
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns true if nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, entry: TraceEntry) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        let position = entries.partition_point(|e| e.sequence <= entry.sequence);
        entries.insert(position, entry);
    }
}

/// Trace sink that forwards entries to the `tracing` log at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTraceSink;

impl TraceSink for LogTraceSink {
    fn record(&self, entry: TraceEntry) {
        tracing::debug!(
            sequence = entry.sequence,
            kind = ?entry.kind,
            target = %entry.target,
            status = ?entry.status,
            error = ?entry.error,
            duration_ms = entry.duration.as_millis() as u64,
            "network trace"
        );
    }
}

/// Per-resolution trace recorder.
///
/// Cheap to clone; all clones share one sequence counter and sink. A tracer
/// without a sink records nothing.
#[derive(Clone, Default)]
pub struct Tracer {
    sink: Option<Arc<dyn TraceSink>>,
    next: Arc<AtomicU64>,
}

impl std::fmt::Debug for Tracer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tracer")
            .field("enabled", &self.is_enabled())
            .field("next", &self.next.load(Ordering::Relaxed))
            .finish()
    }
}

impl Tracer {
    /// Create a tracer writing into `sink`.
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self {
            sink: Some(sink),
            next: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Create a tracer that records nothing.
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Returns true if entries are being recorded.
    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    /// Reserve a sequence number and start timing a request.
    pub fn start(
        &self,
        kind: TraceKind,
        target: impl Into<String>,
        request: impl Into<String>,
    ) -> TraceSpan {
        let sequence = self.next.fetch_add(1, Ordering::Relaxed);
        TraceSpan {
            sink: self.sink.clone(),
            sequence,
            kind,
            target: target.into(),
            request: request.into(),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }
}

/// An in-flight traced request. Finish it with [`TraceSpan::finish`].
///
/// A span dropped before it is finished (the request future was cancelled or
/// aborted) still records an entry, with the error `cancelled`.
#[must_use = "a span records nothing until finished"]
pub struct TraceSpan {
    sink: Option<Arc<dyn TraceSink>>,
    sequence: u64,
    kind: TraceKind,
    target: String,
    request: String,
    started_at: DateTime<Utc>,
    started: Instant,
}

impl TraceSpan {
    /// Record the outcome of the request.
    pub fn finish(mut self, status: Option<u16>, response: Option<String>, error: Option<String>) {
        self.record(status, response, error);
    }

    fn record(&mut self, status: Option<u16>, response: Option<String>, error: Option<String>) {
        let Some(sink) = self.sink.take() else {
            return;
        };
        sink.record(TraceEntry {
            sequence: self.sequence,
            kind: self.kind,
            target: std::mem::take(&mut self.target),
            request: std::mem::take(&mut self.request),
            response,
            status,
            error,
            started_at: self.started_at,
            duration: self.started.elapsed(),
        });
    }
}

impl Drop for TraceSpan {
    fn drop(&mut self) {
        self.record(None, None, Some(CANCELLED.to_string()));
    }
}
