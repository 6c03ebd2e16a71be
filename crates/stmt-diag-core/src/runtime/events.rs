// crates/stmt-diag-core/src/runtime/events.rs
// ============================================================================
// Module: Statement Diagnostics Events
// Description: Structured events emitted by the registry.
// Purpose: Emit JSON-line logs without binding to a logging framework.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Background paths (completion, reconciliation, broadcast) absorb their
//! failures; the events here are how those failures stay visible. Sinks are
//! intentionally lightweight so deployments can route events to their own
//! pipeline. Events carry fingerprints but never statement text or traces.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use serde::Serialize;

use crate::core::Fingerprint;
use crate::core::RequestId;
use crate::core::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    /// Normal lifecycle event.
    Info,
    /// Absorbed failure.
    Warn,
}

/// Registry event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A request was durably inserted.
    RequestInserted,
    /// A pending request was claimed for collection.
    RequestClaimed,
    /// A trace was recorded and the request completed.
    TraceRecorded,
    /// Completion found the request already completed.
    CompletionSkipped,
    /// Serialization failed; the error variant was recorded.
    TraceSerializationFailed,
    /// Completion failed to write to the store.
    CompletionFailed,
    /// Broadcasting a new request failed.
    BroadcastFailed,
    /// Reconciliation failed to read the store.
    PollFailed,
    /// A received notification could not be decoded.
    NotificationIgnored,
}

impl EventKind {
    /// Returns the severity of the event kind.
    #[must_use]
    pub const fn level(self) -> EventLevel {
        match self {
            Self::RequestInserted
            | Self::RequestClaimed
            | Self::TraceRecorded
            | Self::CompletionSkipped
            | Self::NotificationIgnored => EventLevel::Info,
            Self::TraceSerializationFailed
            | Self::CompletionFailed
            | Self::BroadcastFailed
            | Self::PollFailed => EventLevel::Warn,
        }
    }
}

/// Structured registry event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiagnosticsEvent {
    /// Event kind.
    pub event: EventKind,
    /// Event severity.
    pub level: EventLevel,
    /// Event timestamp.
    pub timestamp_ms: i64,
    /// Request the event concerns, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Fingerprint the event concerns, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    /// Human-readable detail.
    pub message: String,
}

impl DiagnosticsEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event: EventKind, message: impl Into<String>) -> Self {
        Self {
            event,
            level: event.level(),
            timestamp_ms: Timestamp::now().as_unix_millis(),
            request_id: None,
            fingerprint: None,
            message: message.into(),
        }
    }

    /// Attaches the request id.
    #[must_use]
    pub const fn with_request(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    /// Attaches the fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, fingerprint: &Fingerprint) -> Self {
        self.fingerprint = Some(fingerprint.clone());
        self
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Sink for registry events.
pub trait DiagnosticsEventSink: Send + Sync {
    /// Records an event.
    fn record(&self, event: &DiagnosticsEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Event sink that logs JSON lines to stderr.
pub struct StderrEventSink;

impl DiagnosticsEventSink for StderrEventSink {
    fn record(&self, event: &DiagnosticsEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Event sink that appends JSON lines to a file.
pub struct FileEventSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileEventSink {
    /// Opens the event log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DiagnosticsEventSink for FileEventSink {
    fn record(&self, event: &DiagnosticsEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op event sink.
pub struct NoopEventSink;

impl DiagnosticsEventSink for NoopEventSink {
    fn record(&self, _event: &DiagnosticsEvent) {}
}
