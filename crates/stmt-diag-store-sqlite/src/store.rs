// crates/stmt-diag-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Diagnostics Store
// Description: Durable DiagnosticsStore backed by SQLite.
// Purpose: Persist diagnostics requests and traces with atomic transactions.
// Dependencies: stmt-diag-core, rusqlite, serde, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`DiagnosticsStore`] using `SQLite`.
//! Transactions begin `IMMEDIATE`, taking the database write lock up front,
//! so the duplicate check in an insert and the completed re-check in a
//! completion cannot interleave with a competing writer. Read-only snapshots
//! begin `DEFERRED` and never take the write lock. Row decoding fails
//! closed: ids, payload columns, and the schema version are validated on
//! every read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;

use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::Row;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use stmt_diag_core::DiagnosticsRequest;
use stmt_diag_core::DiagnosticsStore;
use stmt_diag_core::DiagnosticsTrace;
use stmt_diag_core::DiagnosticsTxn;
use stmt_diag_core::Fingerprint;
use stmt_diag_core::NewDiagnosticsTrace;
use stmt_diag_core::PendingRequest;
use stmt_diag_core::RequestId;
use stmt_diag_core::StoreError;
use stmt_diag_core::Timestamp;
use stmt_diag_core::TraceId;
use stmt_diag_core::TracePayload;
use stmt_diag_core::TxnBody;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

/// Column list for request reads.
const REQUEST_COLUMNS: &str =
    "id, statement_fingerprint, requested_at, completed, statement_diagnostics_id";
/// Column list for trace reads.
const TRACE_COLUMNS: &str = "id, statement_fingerprint, statement, collected_at, trace, error";

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended for several processes).
    #[default]
    Wal,
    /// Delete journal mode.
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode.
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` diagnostics store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Returns a config for `path` with default tuning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Stored rows failed validation.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid arguments or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
        }
    }
}

/// Maps an engine error.
fn db_error(err: rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed diagnostics store.
///
/// Clones share one connection. Separate processes open their own store on
/// the same file.
#[derive(Clone)]
pub struct SqliteDiagnosticsStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteDiagnosticsStore {
    /// Opens an `SQLite`-backed diagnostics store, creating the schema when
    /// the file is new.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized, or carries an unsupported schema version.
    pub fn new(config: &SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the shared connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection.lock().map_err(|_| SqliteStoreError::Db("mutex poisoned".to_string()))
    }

    /// Runs one transaction. Writers pass `Immediate` so the write lock is held
    /// from the start; readers pass `Deferred` and never take it.
    fn run_transaction(
        &self,
        behavior: TransactionBehavior,
        body: &mut TxnBody<'_>,
    ) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction_with_behavior(behavior).map_err(db_error)?;
        body(&mut SqliteTxn {
            connection: &tx,
        })?;
        tx.commit().map_err(db_error)?;
        drop(guard);
        Ok(())
    }

    /// Loads one request row.
    fn load_request(&self, id: RequestId) -> Result<Option<DiagnosticsRequest>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {REQUEST_COLUMNS} FROM statement_diagnostics_requests WHERE id = ?1"),
                params![sql_id(id.get())?],
                read_request_row,
            )
            .optional()
            .map_err(db_error)?;
        drop(guard);
        row.map(decode_request).transpose()
    }

    /// Loads every request row.
    fn load_requests(&self) -> Result<Vec<DiagnosticsRequest>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!(
                "SELECT {REQUEST_COLUMNS} FROM statement_diagnostics_requests ORDER BY id"
            ))
            .map_err(db_error)?;
        let rows = statement.query_map(params![], read_request_row).map_err(db_error)?;
        let mut requests = Vec::new();
        for row in rows {
            requests.push(decode_request(row.map_err(db_error)?)?);
        }
        Ok(requests)
    }

    /// Loads one trace row.
    fn load_trace(&self, id: TraceId) -> Result<Option<DiagnosticsTrace>, SqliteStoreError> {
        let guard = self.lock()?;
        let row = guard
            .query_row(
                &format!("SELECT {TRACE_COLUMNS} FROM statement_diagnostics WHERE id = ?1"),
                params![sql_id(id.get())?],
                read_trace_row,
            )
            .optional()
            .map_err(db_error)?;
        drop(guard);
        row.map(decode_trace).transpose()
    }

    /// Loads every trace row.
    fn load_traces(&self) -> Result<Vec<DiagnosticsTrace>, SqliteStoreError> {
        let guard = self.lock()?;
        let mut statement = guard
            .prepare(&format!("SELECT {TRACE_COLUMNS} FROM statement_diagnostics ORDER BY id"))
            .map_err(db_error)?;
        let rows = statement.query_map(params![], read_trace_row).map_err(db_error)?;
        let mut traces = Vec::new();
        for row in rows {
            traces.push(decode_trace(row.map_err(db_error)?)?);
        }
        Ok(traces)
    }

    /// Reads the schema version.
    fn check_schema(&self) -> Result<(), SqliteStoreError> {
        let guard = self.lock()?;
        let version: i64 = guard
            .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
            .map_err(db_error)?;
        drop(guard);
        if version != SCHEMA_VERSION {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {version}"
            )));
        }
        Ok(())
    }
}

impl DiagnosticsStore for SqliteDiagnosticsStore {
    fn transact(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        self.run_transaction(TransactionBehavior::Immediate, body)
    }

    fn transact_read(&self, body: &mut TxnBody<'_>) -> Result<(), StoreError> {
        self.run_transaction(TransactionBehavior::Deferred, body)
    }

    fn request(&self, id: RequestId) -> Result<Option<DiagnosticsRequest>, StoreError> {
        self.load_request(id).map_err(StoreError::from)
    }

    fn requests(&self) -> Result<Vec<DiagnosticsRequest>, StoreError> {
        self.load_requests().map_err(StoreError::from)
    }

    fn trace(&self, id: TraceId) -> Result<Option<DiagnosticsTrace>, StoreError> {
        self.load_trace(id).map_err(StoreError::from)
    }

    fn traces(&self) -> Result<Vec<DiagnosticsTrace>, StoreError> {
        self.load_traces().map_err(StoreError::from)
    }

    fn readiness(&self) -> Result<(), StoreError> {
        self.check_schema().map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Transaction
// ============================================================================

/// Transaction view over an open `SQLite` transaction.
struct SqliteTxn<'a> {
    /// Connection with the transaction open.
    connection: &'a Connection,
}

impl DiagnosticsTxn for SqliteTxn<'_> {
    fn count_pending_for_fingerprint(
        &mut self,
        fingerprint: &Fingerprint,
    ) -> Result<u64, StoreError> {
        let count: i64 = self
            .connection
            .query_row(
                "SELECT COUNT(*) FROM statement_diagnostics_requests WHERE completed = 0 AND \
                 statement_fingerprint = ?1",
                params![fingerprint.as_str()],
                |row| row.get(0),
            )
            .map_err(db_error)?;
        Ok(u64::try_from(count)
            .map_err(|_| SqliteStoreError::Corrupt(format!("negative request count {count}")))?)
    }

    fn insert_request(
        &mut self,
        fingerprint: &Fingerprint,
        requested_at: Timestamp,
    ) -> Result<RequestId, StoreError> {
        self.connection
            .execute(
                "INSERT INTO statement_diagnostics_requests (statement_fingerprint, \
                 requested_at, completed) VALUES (?1, ?2, 0)",
                params![fingerprint.as_str(), requested_at.as_unix_millis()],
            )
            .map_err(db_error)?;
        Ok(request_id(self.connection.last_insert_rowid())?)
    }

    fn is_request_pending(&mut self, id: RequestId) -> Result<bool, StoreError> {
        let completed: Option<bool> = self
            .connection
            .query_row(
                "SELECT completed FROM statement_diagnostics_requests WHERE id = ?1",
                params![sql_id(id.get())?],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_error)?;
        Ok(completed == Some(false))
    }

    fn insert_trace(&mut self, trace: &NewDiagnosticsTrace) -> Result<TraceId, StoreError> {
        self.connection
            .execute(
                "INSERT INTO statement_diagnostics (statement_fingerprint, statement, \
                 collected_at, trace, error) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    trace.fingerprint.as_str(),
                    trace.statement,
                    trace.collected_at.as_unix_millis(),
                    trace.payload.trace(),
                    trace.payload.error()
                ],
            )
            .map_err(db_error)?;
        Ok(trace_id(self.connection.last_insert_rowid())?)
    }

    fn mark_request_completed(
        &mut self,
        id: RequestId,
        trace_id: TraceId,
    ) -> Result<(), StoreError> {
        let updated = self
            .connection
            .execute(
                "UPDATE statement_diagnostics_requests SET completed = 1, \
                 statement_diagnostics_id = ?2 WHERE id = ?1 AND completed = 0",
                params![sql_id(id.get())?, sql_id(trace_id.get())?],
            )
            .map_err(db_error)?;
        if updated != 1 {
            return Err(StoreError::Invalid(format!("request {id} is not pending")));
        }
        Ok(())
    }

    fn pending_requests(&mut self) -> Result<Vec<PendingRequest>, StoreError> {
        let mut statement = self
            .connection
            .prepare(
                "SELECT id, statement_fingerprint FROM statement_diagnostics_requests WHERE \
                 completed = 0 ORDER BY id",
            )
            .map_err(db_error)?;
        let rows = statement
            .query_map(params![], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))
            .map_err(db_error)?;
        let mut pending = Vec::new();
        for row in rows {
            let (id, fingerprint) = row.map_err(db_error)?;
            pending.push(PendingRequest {
                id: request_id(id)?,
                fingerprint: Fingerprint::new(fingerprint),
            });
        }
        Ok(pending)
    }
}

// ============================================================================
// SECTION: Row Decoding
// ============================================================================

/// Raw request row columns.
type RequestRow = (i64, String, i64, bool, Option<i64>);
/// Raw trace row columns.
type TraceRow = (i64, String, String, i64, Option<String>, Option<String>);

/// Reads raw request columns.
fn read_request_row(row: &Row<'_>) -> rusqlite::Result<RequestRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

/// Reads raw trace columns.
fn read_trace_row(row: &Row<'_>) -> rusqlite::Result<TraceRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
}

/// Validates and converts a request row.
fn decode_request(row: RequestRow) -> Result<DiagnosticsRequest, SqliteStoreError> {
    let (id, fingerprint, requested_at, completed, trace) = row;
    let id = request_id(id)?;
    let trace_id = trace.map(trace_id).transpose()?;
    if trace_id.is_some() && !completed {
        return Err(SqliteStoreError::Corrupt(format!(
            "request {id} links a trace but is not completed"
        )));
    }
    Ok(DiagnosticsRequest {
        id,
        fingerprint: Fingerprint::new(fingerprint),
        requested_at: Timestamp::from_unix_millis(requested_at),
        completed,
        trace_id,
    })
}

/// Validates and converts a trace row.
fn decode_trace(row: TraceRow) -> Result<DiagnosticsTrace, SqliteStoreError> {
    let (id, fingerprint, statement, collected_at, trace, error) = row;
    let id = trace_id(id)?;
    let payload = match (trace, error) {
        (Some(trace), None) => TracePayload::Trace(trace),
        (None, Some(error)) => TracePayload::Error(error),
        _ => {
            return Err(SqliteStoreError::Corrupt(format!(
                "trace {id} must carry exactly one of trace or error"
            )));
        }
    };
    Ok(DiagnosticsTrace {
        id,
        fingerprint: Fingerprint::new(fingerprint),
        statement,
        collected_at: Timestamp::from_unix_millis(collected_at),
        payload,
    })
}

/// Converts a stored rowid into a request id.
fn request_id(raw: i64) -> Result<RequestId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(RequestId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid request id {raw}")))
}

/// Converts a stored rowid into a trace id.
fn trace_id(raw: i64) -> Result<TraceId, SqliteStoreError> {
    u64::try_from(raw)
        .ok()
        .and_then(TraceId::from_raw)
        .ok_or_else(|| SqliteStoreError::Corrupt(format!("invalid trace id {raw}")))
}

/// Converts an id into an `SQLite` integer.
fn sql_id(id: u64) -> Result<i64, SqliteStoreError> {
    i64::try_from(id).map_err(|_| SqliteStoreError::Invalid(format!("id {id} exceeds sqlite range")))
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Ensures the parent directory for the store exists.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    let Some(parent) = path.parent() else {
        return Err(SqliteStoreError::Io("store path missing parent directory".to_string()));
    };
    if parent.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|err| SqliteStoreError::Io(err.to_string()))
}

/// Validates store paths for safety limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let path_string = path.display().to_string();
    if path_string.is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
    if path_string.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid("store path exceeds length limit".to_string()));
    }
    for component in path.components() {
        let name = component.as_os_str().to_string_lossy();
        if name.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(SqliteStoreError::Invalid(
                "store path contains an overlong component".to_string(),
            ));
        }
    }
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection and applies pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags).map_err(db_error)?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection.execute_batch("PRAGMA foreign_keys = ON;").map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(db_error)?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(db_error)?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms)).map_err(db_error)?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction_with_behavior(TransactionBehavior::Immediate).map_err(db_error)?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(db_error)?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(db_error)?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(db_error)?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS statement_diagnostics (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    statement_fingerprint TEXT NOT NULL,
                    statement TEXT NOT NULL,
                    collected_at INTEGER NOT NULL,
                    trace TEXT NULL,
                    error TEXT NULL,
                    CHECK ((trace IS NULL) <> (error IS NULL))
                );
                CREATE TABLE IF NOT EXISTS statement_diagnostics_requests (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    statement_fingerprint TEXT NOT NULL,
                    requested_at INTEGER NOT NULL,
                    completed INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
                    statement_diagnostics_id INTEGER NULL
                        REFERENCES statement_diagnostics(id),
                    CHECK (statement_diagnostics_id IS NULL OR completed = 1)
                );
                CREATE INDEX IF NOT EXISTS idx_statement_diagnostics_requests_completed
                    ON statement_diagnostics_requests (completed, statement_fingerprint);",
            )
            .map_err(db_error)?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(db_error)?;
    Ok(())
}
