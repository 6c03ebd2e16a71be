// crates/stmt-diag-core/src/runtime/mod.rs
// ============================================================================
// Module: Statement Diagnostics Runtime
// Description: Request registry, reconciliation poller, and reference backends.
// Purpose: Coordinate diagnostics requests between executing statements and the store.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules implement the request registry and its protocols, the
//! periodic poller, structured event sinks, and in-memory store and broadcast
//! backends used by tests and single-process deployments.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod broadcast;
pub mod events;
pub mod poller;
pub mod registry;
pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use broadcast::InMemoryBroadcastBus;
pub use broadcast::NoopBroadcaster;
pub use events::DiagnosticsEvent;
pub use events::DiagnosticsEventSink;
pub use events::EventKind;
pub use events::EventLevel;
pub use events::FileEventSink;
pub use events::NoopEventSink;
pub use events::StderrEventSink;
pub use poller::DEFAULT_POLL_INTERVAL;
pub use poller::PollerConfig;
pub use poller::PollerHandle;
pub use poller::spawn_poller;
pub use registry::CompletionOutcome;
pub use registry::DiagnosticsClaim;
pub use registry::DiagnosticsError;
pub use registry::DiagnosticsRegistry;
pub use registry::PollReport;
pub use registry::RegistryConfig;
pub use registry::RegistrySnapshot;
pub use registry::StmtDiagnosticsRequester;
pub use store::InMemoryDiagnosticsStore;
