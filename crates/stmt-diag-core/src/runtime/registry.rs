// crates/stmt-diag-core/src/runtime/registry.rs
// ============================================================================
// Module: Statement Diagnostics Registry
// Description: Per-process view of outstanding diagnostics requests.
// Purpose: Insert, claim, complete, and reconcile requests across a cluster.
// Dependencies: crate::core, crate::interfaces, crate::runtime::events
// ============================================================================

//! ## Overview
//! [`DiagnosticsRegistry`] caches the fingerprints of outstanding requests so
//! executing statements can be matched without touching the store. The durable
//! store arbitrates every cross-process race; the broadcast channel only
//! shortens the time until other nodes notice a new request.
//!
//! Invariants:
//! - All state lives in one [`Mutex`] held only for in-memory work. No store
//!   transaction or broadcast call runs while it is held.
//! - A request id is in at most one of `pending` and `ongoing`.
//! - A request id moves `pending -> ongoing` at most once per process unless
//!   reconciliation re-adds it after its claim was released.
//! - `epoch` increases on every insert; reconciliation discards snapshots that
//!   straddle an increment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::Weak;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::core::ClusterNotification;
use crate::core::Fingerprint;
use crate::core::NewDiagnosticsTrace;
use crate::core::RecordedSpan;
use crate::core::RequestId;
use crate::core::Statement;
use crate::core::Timestamp;
use crate::core::TraceError;
use crate::core::TraceId;
use crate::core::TracePayload;
use crate::core::notification::NOTIFICATION_KEY_PREFIX;
use crate::core::trace_to_json;
use crate::interfaces::Broadcaster;
use crate::interfaces::DiagnosticsStore;
use crate::interfaces::StoreError;
use crate::interfaces::with_read_transaction;
use crate::interfaces::with_transaction;
use crate::runtime::events::DiagnosticsEvent;
use crate::runtime::events::DiagnosticsEventSink;
use crate::runtime::events::EventKind;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Registry errors surfaced to callers.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DiagnosticsError {
    /// A not-completed request for the fingerprint already exists.
    #[error("a pending request for the requested fingerprint already exists: {fingerprint}")]
    DuplicateRequest {
        /// Fingerprint that already has a pending request.
        fingerprint: Fingerprint,
    },
    /// The fingerprint is empty.
    #[error("diagnostics fingerprint must not be empty")]
    EmptyFingerprint,
    /// The durable store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ============================================================================
// SECTION: Requester Interface
// ============================================================================

/// Administrative entry point for requesting diagnostics.
pub trait StmtDiagnosticsRequester {
    /// Durably requests diagnostics for `fingerprint`. Once this returns, the
    /// next matching statement on this process is claimed without a poll.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnosticsError::DuplicateRequest`] when a pending request
    /// exists, or [`DiagnosticsError::Store`] when the store write fails.
    fn insert_request(&self, fingerprint: &Fingerprint) -> Result<RequestId, DiagnosticsError>;
}

// ============================================================================
// SECTION: Config and Reports
// ============================================================================

/// Registry tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryConfig {
    /// TTL attached to broadcast notifications (zero means no expiry).
    pub broadcast_ttl: Duration,
}

/// Result of a completion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    /// A trace row was written and the request marked completed.
    Recorded {
        /// Inserted trace id.
        trace_id: TraceId,
        /// Serialization failure recorded in place of a tree, if any.
        serialization_error: Option<TraceError>,
    },
    /// The request was already completed elsewhere; nothing was written.
    AlreadyCompleted,
}

/// Result of one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Store reads performed (more than one when an insert raced the read).
    pub attempts: u32,
    /// Ids newly added to `pending`.
    pub added: usize,
    /// Ids dropped from `pending` because the store no longer lists them.
    pub removed: usize,
    /// Size of `pending` after the merge.
    pub pending: usize,
}

/// Point-in-time copy of the registry state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RegistrySnapshot {
    /// Outstanding requests not claimed by this process.
    pub pending: BTreeMap<RequestId, Fingerprint>,
    /// Requests claimed by this process with collection in flight.
    pub ongoing: BTreeSet<RequestId>,
    /// Insert epoch.
    pub epoch: u64,
}

// ============================================================================
// SECTION: Registry State
// ============================================================================

/// Mutex-guarded registry state.
#[derive(Debug, Default)]
struct RegistryState {
    /// Requests waiting for a matching statement.
    pending: HashMap<RequestId, Fingerprint>,
    /// Requests this process is servicing.
    ongoing: HashSet<RequestId>,
    /// Incremented on every local insert.
    epoch: u64,
}

impl RegistryState {
    /// Returns true when the id is pending or ongoing.
    fn contains(&self, id: RequestId) -> bool {
        self.pending.contains_key(&id) || self.ongoing.contains(&id)
    }

    /// Adds a pending request; returns false when the id is already known.
    fn add_pending(&mut self, id: RequestId, fingerprint: Fingerprint) -> bool {
        if self.contains(id) {
            return false;
        }
        self.pending.insert(id, fingerprint);
        true
    }
}

/// State shared by registry handles and outstanding claims.
struct RegistryShared {
    /// In-memory state; never held across store or broadcast calls.
    state: Mutex<RegistryState>,
    /// Durable request/trace store.
    store: Arc<dyn DiagnosticsStore>,
    /// Cluster notification transport.
    broadcaster: Arc<dyn Broadcaster>,
    /// Event sink for absorbed failures and lifecycle events.
    events: Arc<dyn DiagnosticsEventSink>,
    /// Registry tuning.
    config: RegistryConfig,
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Per-process diagnostics request registry.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct DiagnosticsRegistry {
    /// Shared registry state.
    shared: Arc<RegistryShared>,
}

impl DiagnosticsRegistry {
    /// Creates a registry and subscribes it to diagnostics notifications.
    ///
    /// The subscription holds a weak reference, so the broadcaster never keeps
    /// a dropped registry alive.
    #[must_use]
    pub fn new(
        store: Arc<dyn DiagnosticsStore>,
        broadcaster: Arc<dyn Broadcaster>,
        events: Arc<dyn DiagnosticsEventSink>,
        config: RegistryConfig,
    ) -> Self {
        let shared = Arc::new(RegistryShared {
            state: Mutex::new(RegistryState::default()),
            store,
            broadcaster: Arc::clone(&broadcaster),
            events,
            config,
        });
        let weak: Weak<RegistryShared> = Arc::downgrade(&shared);
        broadcaster.subscribe(
            NOTIFICATION_KEY_PREFIX,
            Arc::new(move |key: &str, payload: &[u8]| {
                if let Some(shared) = weak.upgrade() {
                    Self {
                        shared,
                    }
                    .handle_notification(key, payload);
                }
            }),
        );
        Self {
            shared,
        }
    }

    /// Locks the registry state. The state holds plain collections, so a
    /// poisoned lock is still consistent.
    fn lock_state(&self) -> MutexGuard<'_, RegistryState> {
        self.shared.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an event through the registry's sink.
    pub fn record_event(&self, event: &DiagnosticsEvent) {
        self.shared.events.record(event);
    }

    /// Returns a copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> RegistrySnapshot {
        let state = self.lock_state();
        RegistrySnapshot {
            pending: state.pending.iter().map(|(id, fp)| (*id, fp.clone())).collect(),
            ongoing: state.ongoing.iter().copied().collect(),
            epoch: state.epoch,
        }
    }

    /// Returns true when the request is pending or ongoing on this process.
    #[must_use]
    pub fn is_known(&self, id: RequestId) -> bool {
        self.lock_state().contains(id)
    }

    // ------------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------------

    /// Durably inserts a request, caches it locally, and notifies peers.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnosticsError::DuplicateRequest`] when a not-completed
    /// request for the fingerprint exists, [`DiagnosticsError::EmptyFingerprint`]
    /// for an empty fingerprint, or [`DiagnosticsError::Store`] on store failure.
    pub fn insert_request(&self, fingerprint: &Fingerprint) -> Result<RequestId, DiagnosticsError> {
        if fingerprint.as_str().trim().is_empty() {
            return Err(DiagnosticsError::EmptyFingerprint);
        }
        let requested_at = Timestamp::now();
        let id = with_transaction(self.shared.store.as_ref(), |txn| -> Result<_, DiagnosticsError> {
            if txn.count_pending_for_fingerprint(fingerprint)? != 0 {
                return Err(DiagnosticsError::DuplicateRequest {
                    fingerprint: fingerprint.clone(),
                });
            }
            Ok(txn.insert_request(fingerprint, requested_at)?)
        })?;

        {
            let mut state = self.lock_state();
            state.epoch += 1;
            state.add_pending(id, fingerprint.clone());
        }
        self.record_event(
            &DiagnosticsEvent::new(EventKind::RequestInserted, "diagnostics request inserted")
                .with_request(id)
                .with_fingerprint(fingerprint),
        );

        let notification = ClusterNotification::DiagnosticsRequest(id);
        if let Err(err) = self.shared.broadcaster.publish(&notification, self.shared.config.broadcast_ttl)
        {
            self.record_event(
                &DiagnosticsEvent::new(
                    EventKind::BroadcastFailed,
                    format!("error notifying of diagnostics request: {err}"),
                )
                .with_request(id),
            );
        }
        Ok(id)
    }

    // ------------------------------------------------------------------------
    // Claim
    // ------------------------------------------------------------------------

    /// Claims a pending request matching the statement's fingerprint.
    ///
    /// Returns `None` when nothing matches. A returned claim must be completed
    /// with the collected trace; once claimed, the request id is never claimed
    /// again by this process. Among several pending requests with the same
    /// fingerprint, which one is claimed is unspecified.
    #[must_use]
    pub fn should_collect_diagnostics<S>(&self, statement: &S) -> Option<DiagnosticsClaim>
    where
        S: Statement + ?Sized,
    {
        if self.lock_state().pending.is_empty() {
            return None;
        }
        // Supplier code; never run it under the state lock.
        let fingerprint = statement.fingerprint();
        let request_id = {
            let mut state = self.lock_state();
            let request_id = state
                .pending
                .iter()
                .find(|(_, pending)| **pending == fingerprint)
                .map(|(id, _)| *id)?;
            state.pending.remove(&request_id);
            state.ongoing.insert(request_id);
            request_id
        };
        self.record_event(
            &DiagnosticsEvent::new(EventKind::RequestClaimed, "diagnostics request claimed")
                .with_request(request_id)
                .with_fingerprint(&fingerprint),
        );
        Some(DiagnosticsClaim {
            registry: self.clone(),
            request_id,
            fingerprint,
            statement: statement.text(),
        })
    }

    /// Drops `ongoing` membership for a finished or abandoned claim.
    fn release(&self, id: RequestId) {
        self.lock_state().ongoing.remove(&id);
    }

    // ------------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------------

    /// Records a collected trace and marks the request completed, atomically.
    ///
    /// The recording is serialized before the transaction opens, so the store
    /// is held only for the re-check and the two writes. When the request is
    /// already completed (another node or thread won the race) nothing is
    /// written. A recording that cannot be serialized is
    /// stored as the error variant so the request is still consumed.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnosticsError::Store`] when the transaction fails.
    pub fn insert_diagnostics(
        &self,
        id: RequestId,
        fingerprint: &Fingerprint,
        statement: &str,
        recording: &[RecordedSpan],
    ) -> Result<CompletionOutcome, DiagnosticsError> {
        let (payload, serialization_error) = match trace_to_json(recording) {
            Ok(json) => (TracePayload::Trace(json), None),
            Err(err) => (TracePayload::Error(err.to_string()), Some(err)),
        };
        let trace = NewDiagnosticsTrace {
            fingerprint: fingerprint.clone(),
            statement: statement.to_string(),
            collected_at: Timestamp::now(),
            payload,
        };
        let outcome = with_transaction(self.shared.store.as_ref(), |txn| -> Result<_, DiagnosticsError> {
            if !txn.is_request_pending(id)? {
                return Ok(CompletionOutcome::AlreadyCompleted);
            }
            let trace_id = txn.insert_trace(&trace)?;
            txn.mark_request_completed(id, trace_id)?;
            Ok(CompletionOutcome::Recorded {
                trace_id,
                serialization_error: serialization_error.clone(),
            })
        })?;

        let event = match &outcome {
            CompletionOutcome::AlreadyCompleted => DiagnosticsEvent::new(
                EventKind::CompletionSkipped,
                "request already completed; trace discarded",
            ),
            CompletionOutcome::Recorded {
                trace_id,
                serialization_error: None,
            } => DiagnosticsEvent::new(EventKind::TraceRecorded, format!("trace {trace_id} recorded")),
            CompletionOutcome::Recorded {
                trace_id,
                serialization_error: Some(err),
            } => DiagnosticsEvent::new(
                EventKind::TraceSerializationFailed,
                format!("trace {trace_id} recorded with error: {err}"),
            ),
        };
        self.record_event(&event.with_request(id).with_fingerprint(fingerprint));
        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Reconciliation
    // ------------------------------------------------------------------------

    /// Resynchronizes `pending` with the store's not-completed requests.
    ///
    /// The store read runs outside the lock. If an insert bumped the epoch
    /// meanwhile, the snapshot may predate that insert and is discarded, and
    /// the read is retried. There is no retry bound: sustained inserts could
    /// starve a poll, which is accepted because inserts are operator actions.
    /// `ongoing` entries are never touched.
    ///
    /// # Errors
    ///
    /// Returns [`DiagnosticsError::Store`] when the store read fails.
    pub fn poll_requests(&self) -> Result<PollReport, DiagnosticsError> {
        let mut attempts = 0_u32;
        loop {
            attempts = attempts.saturating_add(1);
            let epoch = self.lock_state().epoch;
            let snapshot = with_read_transaction(self.shared.store.as_ref(), |txn| {
                txn.pending_requests()
            })?;

            let mut state = self.lock_state();
            if state.epoch != epoch {
                continue;
            }
            let ids: HashSet<RequestId> = snapshot.iter().map(|request| request.id).collect();
            let mut added = 0;
            for request in snapshot {
                if state.add_pending(request.id, request.fingerprint) {
                    added += 1;
                }
            }
            let before = state.pending.len();
            state.pending.retain(|id, _| ids.contains(id));
            let report = PollReport {
                attempts,
                added,
                removed: before - state.pending.len(),
                pending: state.pending.len(),
            };
            drop(state);
            return Ok(report);
        }
    }

    // ------------------------------------------------------------------------
    // Broadcast Glue
    // ------------------------------------------------------------------------

    /// Handles a received broadcast. Unknown request ids trigger a poll;
    /// ids already pending or ongoing here are ignored.
    pub fn handle_notification(&self, key: &str, payload: &[u8]) {
        let id = match ClusterNotification::decode(key, payload) {
            Ok(Some(ClusterNotification::DiagnosticsRequest(id))) => id,
            Ok(None) => return,
            Err(err) => {
                self.record_event(&DiagnosticsEvent::new(EventKind::NotificationIgnored, err.to_string()));
                return;
            }
        };
        if self.is_known(id) {
            return;
        }
        if let Err(err) = self.poll_requests() {
            self.record_event(
                &DiagnosticsEvent::new(
                    EventKind::PollFailed,
                    format!("failed to poll for diagnostics requests: {err}"),
                )
                .with_request(id),
            );
        }
    }
}

impl StmtDiagnosticsRequester for DiagnosticsRegistry {
    fn insert_request(&self, fingerprint: &Fingerprint) -> Result<RequestId, DiagnosticsError> {
        Self::insert_request(self, fingerprint)
    }
}

// ============================================================================
// SECTION: Claim
// ============================================================================

/// One-shot capability to complete a claimed request.
///
/// # Invariants
/// - Completing consumes the claim, so it runs at most once.
/// - `ongoing` membership is released when the claim is dropped, whether or
///   not it was completed and whatever the store outcome.
#[must_use = "a claim must be completed with the collected trace"]
pub struct DiagnosticsClaim {
    /// Registry that issued the claim.
    registry: DiagnosticsRegistry,
    /// Claimed request.
    request_id: RequestId,
    /// Fingerprint of the claimed request.
    fingerprint: Fingerprint,
    /// Literal text of the statement being traced.
    statement: String,
}

impl DiagnosticsClaim {
    /// Returns the claimed request id.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the claimed fingerprint.
    #[must_use]
    pub const fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    /// Returns the literal statement text that will be stored.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Records the collected trace. Store failures are logged and swallowed;
    /// `None` is returned in that case.
    pub fn complete(self, recording: &[RecordedSpan]) -> Option<CompletionOutcome> {
        match self.registry.insert_diagnostics(
            self.request_id,
            &self.fingerprint,
            &self.statement,
            recording,
        ) {
            Ok(outcome) => Some(outcome),
            Err(err) => {
                self.registry.record_event(
                    &DiagnosticsEvent::new(
                        EventKind::CompletionFailed,
                        format!("failed to insert trace: {err}"),
                    )
                    .with_request(self.request_id)
                    .with_fingerprint(&self.fingerprint),
                );
                None
            }
        }
    }
}

impl Drop for DiagnosticsClaim {
    fn drop(&mut self) {
        self.registry.release(self.request_id);
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "Test-only assertions use unwrap for clarity.")]
mod tests {
    use super::RegistryState;
    use crate::core::Fingerprint;
    use crate::core::RequestId;

    fn id(raw: u64) -> RequestId {
        RequestId::from_raw(raw).unwrap()
    }

    #[test]
    fn add_pending_skips_ids_already_ongoing() {
        let mut state = RegistryState::default();
        state.ongoing.insert(id(3));
        assert!(!state.add_pending(id(3), Fingerprint::new("SELECT _")));
        assert!(state.pending.is_empty());
    }

    #[test]
    fn add_pending_is_idempotent() {
        let mut state = RegistryState::default();
        assert!(state.add_pending(id(1), Fingerprint::new("SELECT _")));
        assert!(!state.add_pending(id(1), Fingerprint::new("SELECT _")));
        assert_eq!(state.pending.len(), 1);
    }
}
