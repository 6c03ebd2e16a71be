// crates/stmt-diag-core/src/core/trace.rs
// ============================================================================
// Module: Statement Diagnostics Trace Serialization
// Description: Flat span recordings and their rooted tree form.
// Purpose: Convert a recording into the JSON tree persisted with a trace.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! A recording is a flat list of spans linked by parent span id. The first span
//! is the root and transitively contains every other span. [`trace_to_json`]
//! rebuilds the tree by filtering the list for each node's children, which is
//! quadratic in span count. Recordings are small, and the tree construction is
//! isolated in [`normalize_recording`] so it can move to a parent index later.
//!
//! Span ids must be unique. With unique ids every span has one parent, so the
//! walk emits each span at most once per depth level and total work is bounded
//! by `MAX_TRACE_DEPTH * len`. A repeated id would let one subtree be expanded
//! once per duplicate at every level, so it is rejected up front.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::HashSet;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::SpanId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum tree depth accepted before a recording is treated as cyclic.
pub const MAX_TRACE_DEPTH: usize = 256;

// ============================================================================
// SECTION: Span Types
// ============================================================================

/// Timestamped structured log entry attached to a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanLog {
    /// Time the entry was logged.
    pub time: Timestamp,
    /// Ordered key/value fields.
    pub fields: Vec<LogField>,
}

/// Single key/value field of a span log entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogField {
    /// Field key.
    pub key: String,
    /// Field value.
    pub value: String,
}

/// Span as produced by the tracing subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedSpan {
    /// Span identifier, unique within the recording.
    pub span_id: SpanId,
    /// Parent span identifier ([`SpanId::NONE`] for the root).
    pub parent_span_id: SpanId,
    /// Operation name.
    pub operation: String,
    /// Span start time.
    pub start_time: Timestamp,
    /// Span duration in microseconds.
    pub duration_micros: u64,
    /// Span tags.
    pub tags: BTreeMap<String, String>,
    /// Span log entries.
    pub logs: Vec<SpanLog>,
}

/// Span tree node persisted with a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedSpan {
    /// Operation name.
    pub operation: String,
    /// Span start time.
    pub start_time: Timestamp,
    /// Span duration in microseconds.
    pub duration_micros: u64,
    /// Span tags.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    /// Span log entries.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<SpanLog>,
    /// Child spans in recording order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NormalizedSpan>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Trace serialization failures.
///
/// # Invariants
/// - Messages describe the recording shape, never span contents.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TraceError {
    /// Recording contains no spans.
    #[error("trace recording is empty")]
    EmptyRecording,
    /// Parent links nest deeper than [`MAX_TRACE_DEPTH`].
    #[error("trace recording exceeds max depth {max_depth} (cyclic parent links?)")]
    TooDeep {
        /// Maximum accepted depth.
        max_depth: usize,
    },
    /// Two spans in the recording share a span id.
    #[error("trace recording repeats span id {span_id}")]
    DuplicateSpanId {
        /// First repeated id.
        span_id: SpanId,
    },
    /// JSON encoding failed.
    #[error("trace encoding failed: {0}")]
    Encoding(String),
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Builds the rooted span tree for a recording.
///
/// # Errors
///
/// Returns [`TraceError`] when the recording is empty, repeats a span id, or
/// is too deep.
pub fn normalize_recording(recording: &[RecordedSpan]) -> Result<NormalizedSpan, TraceError> {
    let root = recording.first().ok_or(TraceError::EmptyRecording)?;
    ensure_unique_span_ids(recording)?;
    normalize_span(root, recording, 0)
}

/// Serializes a recording into the indented JSON tree stored with a trace.
///
/// # Errors
///
/// Returns [`TraceError`] when the tree cannot be built or encoded.
pub fn trace_to_json(recording: &[RecordedSpan]) -> Result<String, TraceError> {
    let root = normalize_recording(recording)?;
    serde_json::to_string_pretty(&root).map_err(|err| TraceError::Encoding(err.to_string()))
}

/// Rejects recordings in which a span id appears more than once.
fn ensure_unique_span_ids(recording: &[RecordedSpan]) -> Result<(), TraceError> {
    let mut seen = HashSet::with_capacity(recording.len());
    for span in recording {
        if !seen.insert(span.span_id) {
            return Err(TraceError::DuplicateSpanId {
                span_id: span.span_id,
            });
        }
    }
    Ok(())
}

/// Recursively converts one span and its children.
fn normalize_span(
    span: &RecordedSpan,
    recording: &[RecordedSpan],
    depth: usize,
) -> Result<NormalizedSpan, TraceError> {
    if depth >= MAX_TRACE_DEPTH {
        return Err(TraceError::TooDeep {
            max_depth: MAX_TRACE_DEPTH,
        });
    }
    let mut children = Vec::new();
    for candidate in recording {
        if candidate.parent_span_id != span.span_id || candidate.span_id == span.span_id {
            continue;
        }
        children.push(normalize_span(candidate, recording, depth + 1)?);
    }
    Ok(NormalizedSpan {
        operation: span.operation.clone(),
        start_time: span.start_time,
        duration_micros: span.duration_micros,
        tags: span.tags.clone(),
        logs: span.logs.clone(),
        children,
    })
}
