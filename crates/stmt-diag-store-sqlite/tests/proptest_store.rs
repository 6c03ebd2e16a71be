// crates/stmt-diag-store-sqlite/tests/proptest_store.rs
// ============================================================================
// Module: SQLite Store Property-Based Tests
// Description: Insert sequences against an on-disk store.
// Purpose: Check duplicate rejection and id ordering across arbitrary inputs.
// ============================================================================

//! Property-based tests for request insertion on the `SQLite` store.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only assertions and helpers are permitted."
)]

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;
use stmt_diag_core::DiagnosticsError;
use stmt_diag_core::DiagnosticsRegistry;
use stmt_diag_core::DiagnosticsStore;
use stmt_diag_core::Fingerprint;
use stmt_diag_core::NoopBroadcaster;
use stmt_diag_core::NoopEventSink;
use stmt_diag_core::RegistryConfig;
use stmt_diag_store_sqlite::SqliteDiagnosticsStore;
use stmt_diag_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn inserts_accept_each_fingerprint_once(picks in prop::collection::vec(0_usize .. 6, 1 .. 20)) {
        let names = ["SELECT _", "SELECT 'it''s'", "UPDATE t SET a = _", "DELETE FROM \"Users\"", "ünïcode _", "INSERT INTO t VALUES (_, _)"];
        let temp = TempDir::new().unwrap();
        let store = SqliteDiagnosticsStore::new(&SqliteStoreConfig::new(temp.path().join("diag.sqlite"))).unwrap();
        let registry = DiagnosticsRegistry::new(
            Arc::new(store.clone()),
            Arc::new(NoopBroadcaster),
            Arc::new(NoopEventSink),
            RegistryConfig::default(),
        );

        let mut seen = BTreeSet::new();
        let mut last_id = 0_u64;
        for pick in picks {
            let fingerprint = Fingerprint::new(names[pick]);
            match registry.insert_request(&fingerprint) {
                Ok(id) => {
                    prop_assert!(seen.insert(pick));
                    prop_assert!(id.get() > last_id);
                    last_id = id.get();
                    let stored = store.request(id).unwrap().unwrap();
                    prop_assert_eq!(stored.fingerprint, fingerprint);
                }
                Err(DiagnosticsError::DuplicateRequest { .. }) => prop_assert!(seen.contains(&pick)),
                Err(other) => prop_assert!(false, "unexpected error: {other}"),
            }
        }
        prop_assert_eq!(store.requests().unwrap().len(), seen.len());
    }
}
