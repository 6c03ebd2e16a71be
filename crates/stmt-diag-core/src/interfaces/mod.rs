// crates/stmt-diag-core/src/interfaces/mod.rs
// ============================================================================
// Module: Statement Diagnostics Interfaces
// Description: Backend-agnostic store and broadcast contracts.
// Purpose: Define the seams between the registry and external collaborators.
// Dependencies: thiserror, crate::core
// ============================================================================

//! ## Overview
//! The registry integrates with two external collaborators:
//! - [`DiagnosticsStore`]: the durable request/trace tables with transactional
//!   read/write and store-assigned identifiers. Store operations run under an
//!   administrative principal, never the end user's.
//! - [`Broadcaster`]: a fire-and-forget, at-least-once cluster notification
//!   primitive with callback-on-receive semantics.
//!
//! Implementations must never call back into the registry while holding their
//! own locks beyond what the callback contract documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::ClusterNotification;
use crate::core::DiagnosticsRequest;
use crate::core::DiagnosticsTrace;
use crate::core::Fingerprint;
use crate::core::NewDiagnosticsTrace;
use crate::core::PendingRequest;
use crate::core::RequestId;
use crate::core::Timestamp;
use crate::core::TraceId;

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never embed serialized trace payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store engine error (including contention and busy timeouts).
    #[error("store error: {0}")]
    Store(String),
    /// Stored data failed integrity checks.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store schema version is not supported.
    #[error("store version mismatch: {0}")]
    VersionMismatch(String),
    /// Operation arguments or stored rows were invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Transaction body failed and the transaction was rolled back.
    #[error("store transaction aborted by caller")]
    Aborted,
}

/// Operations available inside one store transaction.
///
/// All reads observe the transaction's own writes. Nothing is visible to other
/// transactions until the enclosing [`DiagnosticsStore::transact`] commits.
pub trait DiagnosticsTxn {
    /// Counts not-completed requests with exactly this fingerprint.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn count_pending_for_fingerprint(&mut self, fingerprint: &Fingerprint)
    -> Result<u64, StoreError>;

    /// Inserts a not-completed request and returns its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_request(
        &mut self,
        fingerprint: &Fingerprint,
        requested_at: Timestamp,
    ) -> Result<RequestId, StoreError>;

    /// Returns true when the request exists and is not completed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn is_request_pending(&mut self, id: RequestId) -> Result<bool, StoreError>;

    /// Inserts a trace row and returns its store-assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_trace(&mut self, trace: &NewDiagnosticsTrace) -> Result<TraceId, StoreError>;

    /// Marks a not-completed request completed and links the trace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when no not-completed row matches, or
    /// another [`StoreError`] when the write fails.
    fn mark_request_completed(&mut self, id: RequestId, trace_id: TraceId)
    -> Result<(), StoreError>;

    /// Returns every not-completed request.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn pending_requests(&mut self) -> Result<Vec<PendingRequest>, StoreError>;
}

/// Transaction body executed by [`DiagnosticsStore::transact`].
pub type TxnBody<'a> = dyn FnMut(&mut dyn DiagnosticsTxn) -> Result<(), StoreError> + 'a;

/// Durable request/trace store.
pub trait DiagnosticsStore: Send + Sync {
    /// Runs `body` atomically. When `body` fails the transaction is rolled
    /// back and the body's error is returned. Implementations may re-run
    /// `body` on retryable contention.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from the body, or when begin/commit fails.
    fn transact(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError>;

    /// Runs a read-only `body` against one consistent snapshot. Backends that
    /// distinguish readers from writers must not take the write lock here.
    /// The default delegates to [`DiagnosticsStore::transact`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] from the body, or when the snapshot cannot be
    /// opened.
    fn transact_read(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        self.transact(body)
    }

    /// Loads a request row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn request(&self, id: RequestId) -> Result<Option<DiagnosticsRequest>, StoreError>;

    /// Lists all request rows ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn requests(&self) -> Result<Vec<DiagnosticsRequest>, StoreError>;

    /// Loads a trace row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn trace(&self, id: TraceId) -> Result<Option<DiagnosticsTrace>, StoreError>;

    /// Lists all trace rows ordered by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn traces(&self) -> Result<Vec<DiagnosticsTrace>, StoreError>;

    /// Checks that the store is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Runs a typed transaction body against a store.
///
/// The body's own error type is preserved: when it fails the store sees
/// [`StoreError::Aborted`], rolls back, and the original error is returned.
///
/// # Errors
///
/// Returns the body's error, or a [`StoreError`] converted into `E` when the
/// store fails to begin or commit.
pub fn with_transaction<S, T, E>(
    store: &S,
    body: impl FnMut(&mut dyn DiagnosticsTxn) -> Result<T, E>,
) -> Result<T, E>
where
    S: DiagnosticsStore + ?Sized,
    E: From<StoreError>,
{
    run_typed(body, |erased| store.transact(erased))
}

/// Runs a typed read-only body through [`DiagnosticsStore::transact_read`].
///
/// # Errors
///
/// Returns the body's error, or a [`StoreError`] converted into `E` when the
/// snapshot cannot be opened.
pub fn with_read_transaction<S, T, E>(
    store: &S,
    body: impl FnMut(&mut dyn DiagnosticsTxn) -> Result<T, E>,
) -> Result<T, E>
where
    S: DiagnosticsStore + ?Sized,
    E: From<StoreError>,
{
    run_typed(body, |erased| store.transact_read(erased))
}

/// Adapts a typed body to [`TxnBody`] and hands it to `run`.
fn run_typed<T, E>(
    mut body: impl FnMut(&mut dyn DiagnosticsTxn) -> Result<T, E>,
    run: impl FnOnce(&mut TxnBody<'_>) -> Result<(), StoreError>,
) -> Result<T, E>
where
    E: From<StoreError>,
{
    let mut output = None;
    let mut failure = None;
    let result = run(&mut |txn: &mut dyn DiagnosticsTxn| match body(txn) {
        Ok(value) => {
            output = Some(value);
            Ok(())
        }
        Err(err) => {
            failure = Some(err);
            Err(StoreError::Aborted)
        }
    });
    match result {
        Ok(()) => output.ok_or_else(|| {
            E::from(StoreError::Invalid("transaction committed without output".to_string()))
        }),
        Err(StoreError::Aborted) => Err(failure.unwrap_or_else(|| E::from(StoreError::Aborted))),
        Err(err) => Err(E::from(err)),
    }
}

// ============================================================================
// SECTION: Broadcast
// ============================================================================

/// Broadcast transport errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    /// Transport rejected or failed to send the notification.
    #[error("broadcast publish failed: {0}")]
    Publish(String),
}

/// Callback invoked with `(key, payload)` on local receipt of a notification.
pub type NotificationCallback = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// Best-effort cluster notification transport.
pub trait Broadcaster: Send + Sync {
    /// Publishes a notification to every node, including this one.
    /// A zero `ttl` means no expiry.
    ///
    /// # Errors
    ///
    /// Returns [`BroadcastError`] when the transport rejects the notification.
    fn publish(
        &self,
        notification: &ClusterNotification,
        ttl: Duration,
    ) -> Result<(), BroadcastError>;

    /// Registers `callback` for notifications whose key starts with `key_prefix`.
    fn subscribe(&self, key_prefix: &str, callback: NotificationCallback);
}
