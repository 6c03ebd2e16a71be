// crates/stmt-diag-core/src/runtime/store.rs
// ============================================================================
// Module: Statement Diagnostics In-Memory Store
// Description: Simple in-memory diagnostics store for tests and examples.
// Purpose: Provide a transactional store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`DiagnosticsStore`]
//! for tests and local demos. Transactions run against a copy of the tables
//! under one mutex and replace them on success, so they are atomic and fully
//! serialized. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::DiagnosticsRequest;
use crate::core::DiagnosticsTrace;
use crate::core::Fingerprint;
use crate::core::NewDiagnosticsTrace;
use crate::core::PendingRequest;
use crate::core::RequestId;
use crate::core::Timestamp;
use crate::core::TraceId;
use crate::interfaces::DiagnosticsStore;
use crate::interfaces::DiagnosticsTxn;
use crate::interfaces::StoreError;
use crate::interfaces::TxnBody;

// ============================================================================
// SECTION: Tables
// ============================================================================

/// Table contents of the in-memory store.
#[derive(Debug, Clone, Default)]
struct Tables {
    /// Request rows keyed by raw id.
    requests: BTreeMap<u64, DiagnosticsRequest>,
    /// Trace rows keyed by raw id.
    traces: BTreeMap<u64, DiagnosticsTrace>,
    /// Last assigned request id.
    last_request_id: u64,
    /// Last assigned trace id.
    last_trace_id: u64,
}

/// Transaction view over a working copy of the tables.
struct InMemoryTxn<'a> {
    /// Working copy committed when the body succeeds.
    tables: &'a mut Tables,
}

impl DiagnosticsTxn for InMemoryTxn<'_> {
    fn count_pending_for_fingerprint(
        &mut self,
        fingerprint: &Fingerprint,
    ) -> Result<u64, StoreError> {
        let count = self
            .tables
            .requests
            .values()
            .filter(|request| !request.completed && request.fingerprint == *fingerprint)
            .count();
        u64::try_from(count).map_err(|_| StoreError::Invalid("request count overflow".to_string()))
    }

    fn insert_request(
        &mut self,
        fingerprint: &Fingerprint,
        requested_at: Timestamp,
    ) -> Result<RequestId, StoreError> {
        let raw = self.tables.last_request_id + 1;
        let id = RequestId::from_raw(raw)
            .ok_or_else(|| StoreError::Invalid("request id sequence exhausted".to_string()))?;
        self.tables.last_request_id = raw;
        self.tables.requests.insert(
            raw,
            DiagnosticsRequest {
                id,
                fingerprint: fingerprint.clone(),
                requested_at,
                completed: false,
                trace_id: None,
            },
        );
        Ok(id)
    }

    fn is_request_pending(&mut self, id: RequestId) -> Result<bool, StoreError> {
        Ok(self.tables.requests.get(&id.get()).is_some_and(|request| !request.completed))
    }

    fn insert_trace(&mut self, trace: &NewDiagnosticsTrace) -> Result<TraceId, StoreError> {
        let raw = self.tables.last_trace_id + 1;
        let id = TraceId::from_raw(raw)
            .ok_or_else(|| StoreError::Invalid("trace id sequence exhausted".to_string()))?;
        self.tables.last_trace_id = raw;
        self.tables.traces.insert(raw, DiagnosticsTrace::from_new(id, trace.clone()));
        Ok(id)
    }

    fn mark_request_completed(
        &mut self,
        id: RequestId,
        trace_id: TraceId,
    ) -> Result<(), StoreError> {
        match self.tables.requests.get_mut(&id.get()) {
            Some(request) if !request.completed => {
                request.completed = true;
                request.trace_id = Some(trace_id);
                Ok(())
            }
            _ => Err(StoreError::Invalid(format!("request {id} is not pending"))),
        }
    }

    fn pending_requests(&mut self) -> Result<Vec<PendingRequest>, StoreError> {
        Ok(self
            .tables
            .requests
            .values()
            .filter(|request| !request.completed)
            .map(|request| PendingRequest {
                id: request.id,
                fingerprint: request.fingerprint.clone(),
            })
            .collect())
    }
}

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory diagnostics store for tests and examples.
///
/// Clones share the same tables, which lets several registries stand in for
/// the nodes of one cluster.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDiagnosticsStore {
    /// Tables protected by a mutex.
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryDiagnosticsStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the tables.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables.lock().map_err(|_| StoreError::Io("diagnostics store mutex poisoned".to_string()))
    }
}

impl DiagnosticsStore for InMemoryDiagnosticsStore {
    fn transact(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let mut working = guard.clone();
        body(&mut InMemoryTxn {
            tables: &mut working,
        })?;
        *guard = working;
        drop(guard);
        Ok(())
    }

    fn request(&self, id: RequestId) -> Result<Option<DiagnosticsRequest>, StoreError> {
        Ok(self.lock()?.requests.get(&id.get()).cloned())
    }

    fn requests(&self) -> Result<Vec<DiagnosticsRequest>, StoreError> {
        Ok(self.lock()?.requests.values().cloned().collect())
    }

    fn trace(&self, id: TraceId) -> Result<Option<DiagnosticsTrace>, StoreError> {
        Ok(self.lock()?.traces.get(&id.get()).cloned())
    }

    fn traces(&self) -> Result<Vec<DiagnosticsTrace>, StoreError> {
        Ok(self.lock()?.traces.values().cloned().collect())
    }
}
