// crates/stmt-diag-core/src/lib.rs
// ============================================================================
// Module: Statement Diagnostics Core Library
// Description: Public API surface for statement diagnostics collection.
// Purpose: Expose core types, backend interfaces, and the request registry.
// Dependencies: crate::{core, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Statement diagnostics lets an operator ask a cluster to capture the
//! execution trace of the next statement matching a fingerprint. Requests are
//! stored durably, cached per process, and claimed by exactly one execution
//! cluster-wide. The crate is backend-agnostic: storage and cluster
//! notification are reached through the traits in [`interfaces`].

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use interfaces::BroadcastError;
pub use interfaces::Broadcaster;
pub use interfaces::DiagnosticsStore;
pub use interfaces::DiagnosticsTxn;
pub use interfaces::NotificationCallback;
pub use interfaces::StoreError;
pub use interfaces::TxnBody;
pub use interfaces::with_read_transaction;
pub use interfaces::with_transaction;
pub use runtime::CompletionOutcome;
pub use runtime::DiagnosticsClaim;
pub use runtime::DiagnosticsError;
pub use runtime::DiagnosticsEvent;
pub use runtime::DiagnosticsEventSink;
pub use runtime::DiagnosticsRegistry;
pub use runtime::EventKind;
pub use runtime::EventLevel;
pub use runtime::FileEventSink;
pub use runtime::InMemoryBroadcastBus;
pub use runtime::InMemoryDiagnosticsStore;
pub use runtime::NoopBroadcaster;
pub use runtime::NoopEventSink;
pub use runtime::PollReport;
pub use runtime::PollerConfig;
pub use runtime::PollerHandle;
pub use runtime::RegistryConfig;
pub use runtime::RegistrySnapshot;
pub use runtime::StderrEventSink;
pub use runtime::StmtDiagnosticsRequester;
pub use runtime::spawn_poller;
