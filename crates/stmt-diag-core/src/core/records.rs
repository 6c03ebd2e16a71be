// crates/stmt-diag-core/src/core/records.rs
// ============================================================================
// Module: Statement Diagnostics Records
// Description: Durable request and trace records.
// Purpose: Define the row shapes shared by every store backend.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Two durable record kinds exist. A [`DiagnosticsRequest`] is created
//! not-completed and flips to completed exactly once, linking the
//! [`DiagnosticsTrace`] that serviced it. Traces are immutable once written and
//! carry either a serialized span tree or the text of the serialization error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Fingerprint;
use crate::core::identifiers::RequestId;
use crate::core::identifiers::TraceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Requests
// ============================================================================

/// Durable diagnostics request.
///
/// # Invariants
/// - `trace_id.is_some()` implies `completed`.
/// - Rows are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsRequest {
    /// Store-assigned identifier.
    pub id: RequestId,
    /// Fingerprint the request matches against.
    pub fingerprint: Fingerprint,
    /// Time the request was inserted.
    pub requested_at: Timestamp,
    /// Whether a trace has been recorded for the request.
    pub completed: bool,
    /// Trace that completed the request.
    pub trace_id: Option<TraceId>,
}

/// Outstanding request as returned by a pending snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRequest {
    /// Request identifier.
    pub id: RequestId,
    /// Request fingerprint.
    pub fingerprint: Fingerprint,
}

// ============================================================================
// SECTION: Traces
// ============================================================================

/// Collected payload of a diagnostics trace.
///
/// # Invariants
/// - Exactly one variant is stored per trace row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TracePayload {
    /// Serialized span tree.
    Trace(String),
    /// Serialization error text recorded in place of a tree.
    Error(String),
}

impl TracePayload {
    /// Returns the serialized tree when collection succeeded.
    #[must_use]
    pub fn trace(&self) -> Option<&str> {
        match self {
            Self::Trace(json) => Some(json),
            Self::Error(_) => None,
        }
    }

    /// Returns the error text when serialization failed.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Trace(_) => None,
            Self::Error(message) => Some(message),
        }
    }
}

/// Trace row contents prior to insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDiagnosticsTrace {
    /// Fingerprint of the traced statement.
    pub fingerprint: Fingerprint,
    /// Literal statement text as executed.
    pub statement: String,
    /// Time the trace was collected.
    pub collected_at: Timestamp,
    /// Collected payload.
    pub payload: TracePayload,
}

/// Durable diagnostics trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticsTrace {
    /// Store-assigned identifier.
    pub id: TraceId,
    /// Fingerprint of the traced statement.
    pub fingerprint: Fingerprint,
    /// Literal statement text as executed.
    pub statement: String,
    /// Time the trace was collected.
    pub collected_at: Timestamp,
    /// Collected payload.
    pub payload: TracePayload,
}

impl DiagnosticsTrace {
    /// Builds the stored record from an insert payload and its assigned id.
    #[must_use]
    pub fn from_new(id: TraceId, trace: NewDiagnosticsTrace) -> Self {
        Self {
            id,
            fingerprint: trace.fingerprint,
            statement: trace.statement,
            collected_at: trace.collected_at,
            payload: trace.payload,
        }
    }
}
