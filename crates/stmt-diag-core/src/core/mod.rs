// crates/stmt-diag-core/src/core/mod.rs
// ============================================================================
// Module: Statement Diagnostics Core Types
// Description: Identifiers, records, notifications, and trace shapes.
// Purpose: Group the backend-agnostic data model.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Data types shared by the registry, store backends, and transports.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod fingerprint;
pub mod identifiers;
pub mod notification;
pub mod records;
pub mod time;
pub mod trace;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use fingerprint::SqlStatement;
pub use fingerprint::Statement;
pub use fingerprint::normalize_sql;
pub use identifiers::Fingerprint;
pub use identifiers::RequestId;
pub use identifiers::SpanId;
pub use identifiers::TraceId;
pub use notification::ClusterNotification;
pub use notification::DIAGNOSTICS_REQUEST_KEY;
pub use notification::NOTIFICATION_KEY_PREFIX;
pub use notification::NotificationError;
pub use notification::WireNotification;
pub use records::DiagnosticsRequest;
pub use records::DiagnosticsTrace;
pub use records::NewDiagnosticsTrace;
pub use records::PendingRequest;
pub use records::TracePayload;
pub use time::Timestamp;
pub use trace::LogField;
pub use trace::NormalizedSpan;
pub use trace::RecordedSpan;
pub use trace::SpanLog;
pub use trace::TraceError;
pub use trace::MAX_TRACE_DEPTH;
pub use trace::normalize_recording;
pub use trace::trace_to_json;
