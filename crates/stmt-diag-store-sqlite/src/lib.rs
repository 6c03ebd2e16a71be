// crates/stmt-diag-store-sqlite/src/lib.rs
// ============================================================================
// Module: SQLite Diagnostics Store
// Description: Durable DiagnosticsStore backend using SQLite.
// Purpose: Persist diagnostics requests and traces across restarts.
// Dependencies: stmt-diag-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate provides a SQLite-backed [`DiagnosticsStore`] holding the
//! request and trace tables. Every process of a deployment opens the same
//! database file; `SQLite` write locking arbitrates concurrent inserts and
//! completions.
//!
//! [`DiagnosticsStore`]: stmt_diag_core::DiagnosticsStore

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteDiagnosticsStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreError;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
