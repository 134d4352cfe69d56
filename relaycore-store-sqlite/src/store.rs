// relaycore-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Run State Store
// Description: Durable RunStateStore backed by SQLite WAL.
// Purpose: Persist run state and its transition history with deterministic
// serialization and hash-verified integrity on read.
// Dependencies: relaycore-core, rusqlite, serde, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! This module implements a durable [`RunStateStore`] using `SQLite`. Every
//! `create`/`transition`/`record_mode` call writes a canonical JSON snapshot
//! of the current [`Run`] and, for transitions, an append-only
//! [`TransitionRecord`] row that is never rewritten. Loads verify the
//! snapshot's content hash and fail closed on corruption.
//! Security posture: database contents are untrusted; see
//! `Docs/security/threat_model.md`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use relaycore_core::Run;
use relaycore_core::RunId;
use relaycore_core::RunStateStore;
use relaycore_core::RunStatus;
use relaycore_core::StoreError;
use relaycore_core::TenantId;
use relaycore_core::Timestamp;
use relaycore_core::TransitionRecord;
use relaycore_core::hashing::DEFAULT_HASH_ALGORITHM;
use relaycore_core::hashing::HashAlgorithm;
use relaycore_core::hashing::HashDigest;
use relaycore_core::hashing::canonical_json_bytes;
use relaycore_core::hashing::hash_bytes;
use relaycore_core::run::ExecutionMode;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum run snapshot size accepted by the store.
pub const MAX_STATE_BYTES: usize = 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
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
    /// Normal synchronous mode (balanced).
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

/// Configuration for the `SQLite` run state store.
#[derive(Debug, Clone, Deserialize)]
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
    /// Store corruption or hash mismatch.
    #[error("sqlite store corruption: {0}")]
    Corrupt(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
    /// Run not found in the store.
    #[error("run not found: {0}")]
    RunNotFound(String),
    /// Illegal transition requested.
    #[error("illegal transition from {from:?} to {to:?} for run {run_id}")]
    TransitionIllegal {
        /// Run the transition was attempted against.
        run_id: String,
        /// Status transitioned from.
        from: RunStatus,
        /// Status transitioned to.
        to: RunStatus,
    },
    /// Store payload exceeded configured size limits.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// The blocking task the query ran on was cancelled or panicked.
    #[error("sqlite store blocking task failed: {0}")]
    Join(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::RunNotFound(run_id) => Self::RunNotFound(RunId::new(run_id)),
            SqliteStoreError::TransitionIllegal { run_id, from, to } => {
                Self::TransitionIllegal { run_id: RunId::new(run_id), from, to }
            }
            SqliteStoreError::Io(message)
            | SqliteStoreError::Db(message)
            | SqliteStoreError::Corrupt(message)
            | SqliteStoreError::VersionMismatch(message)
            | SqliteStoreError::Invalid(message)
            | SqliteStoreError::Join(message) => Self::Io(message),
            SqliteStoreError::TooLarge { max_bytes, actual_bytes } => Self::Io(format!(
                "run snapshot exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed run state store with WAL support.
#[derive(Clone)]
pub struct SqliteRunStateStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRunStateStore {
    /// Opens an `SQLite`-backed run state store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Runs a blocking closure against the guarded connection on the
    /// blocking thread pool, mapping panics/cancellation into
    /// [`SqliteStoreError::Join`].
    async fn with_connection<T, F>(&self, f: F) -> Result<T, SqliteStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SqliteStoreError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        tokio::task::spawn_blocking(move || {
            let guard = connection.lock().map_err(|_| {
                SqliteStoreError::Db("run state store mutex poisoned".to_string())
            })?;
            f(&guard)
        })
        .await
        .map_err(|err| SqliteStoreError::Join(err.to_string()))?
    }
}

#[async_trait]
impl RunStateStore for SqliteRunStateStore {
    async fn create(&self, run: Run) -> Result<(), StoreError> {
        self.with_connection(move |conn| insert_run(conn, &run)).await.map_err(StoreError::from)
    }

    async fn transition(
        &self,
        run_id: &RunId,
        to: RunStatus,
        reason: &str,
        actor: &str,
    ) -> Result<TransitionRecord, StoreError> {
        let run_id = run_id.clone();
        let reason = reason.to_string();
        let actor = actor.to_string();
        self.with_connection(move |conn| apply_transition(conn, &run_id, to, &reason, &actor))
            .await
            .map_err(StoreError::from)
    }

    async fn read(&self, run_id: &RunId) -> Result<Run, StoreError> {
        let run_id = run_id.clone();
        self.with_connection(move |conn| load_run(conn, &run_id)).await.map_err(StoreError::from)
    }

    async fn list_by_tenant(
        &self,
        tenant_id: &TenantId,
        status_filter: Option<RunStatus>,
    ) -> Result<Vec<Run>, StoreError> {
        let tenant_id = tenant_id.clone();
        self.with_connection(move |conn| list_runs_by_tenant(conn, &tenant_id, status_filter))
            .await
            .map_err(StoreError::from)
    }

    async fn record_mode(&self, run_id: &RunId, mode: ExecutionMode) -> Result<(), StoreError> {
        let run_id = run_id.clone();
        self.with_connection(move |conn| record_run_mode(conn, &run_id, mode))
            .await
            .map_err(StoreError::from)
    }
}

// ============================================================================
// SECTION: Run Persistence
// ============================================================================

fn insert_run(conn: &Connection, run: &Run) -> Result<(), SqliteStoreError> {
    let (snapshot, digest) = canonical_snapshot(run)?;
    conn.execute(
        "INSERT INTO runs (
            run_id, tenant_id, status, snapshot_json, snapshot_hash, hash_algorithm
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run.run_id.as_str(),
            run.tenant_id.as_str(),
            status_label(run.status),
            snapshot,
            digest.value,
            hash_algorithm_label(digest.algorithm),
        ],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

fn apply_transition(
    conn: &Connection,
    run_id: &RunId,
    to: RunStatus,
    reason: &str,
    actor: &str,
) -> Result<TransitionRecord, SqliteStoreError> {
    let mut run = load_run(conn, run_id)?;
    if !RunStatus::is_allowed_transition(run.status, to) {
        return Err(SqliteStoreError::TransitionIllegal {
            run_id: run_id.to_string(),
            from: run.status,
            to,
        });
    }
    let from = run.status;
    let at = now();
    run.status = to;
    run.last_transitioned_at = at;
    let (snapshot, digest) = canonical_snapshot(&run)?;
    conn.execute(
        "UPDATE runs SET status = ?1, snapshot_json = ?2, snapshot_hash = ?3, hash_algorithm = \
         ?4 WHERE run_id = ?5",
        params![
            status_label(to),
            snapshot,
            digest.value,
            hash_algorithm_label(digest.algorithm),
            run_id.as_str(),
        ],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let record = TransitionRecord {
        run_id: run_id.clone(),
        from,
        to,
        reason: reason.to_string(),
        at,
        actor: actor.to_string(),
    };
    let record_json = serde_json::to_string(&record)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    let next_sequence: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(sequence), 0) + 1 FROM run_transitions WHERE run_id = ?1",
            params![run_id.as_str()],
            |row| row.get(0),
        )
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    conn.execute(
        "INSERT INTO run_transitions (run_id, sequence, record_json) VALUES (?1, ?2, ?3)",
        params![run_id.as_str(), next_sequence, record_json],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(record)
}

fn record_run_mode(
    conn: &Connection,
    run_id: &RunId,
    mode: ExecutionMode,
) -> Result<(), SqliteStoreError> {
    let mut run = load_run(conn, run_id)?;
    run.latest_mode = mode;
    let (snapshot, digest) = canonical_snapshot(&run)?;
    conn.execute(
        "UPDATE runs SET snapshot_json = ?1, snapshot_hash = ?2, hash_algorithm = ?3 WHERE \
         run_id = ?4",
        params![snapshot, digest.value, hash_algorithm_label(digest.algorithm), run_id.as_str()],
    )
    .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

fn load_run(conn: &Connection, run_id: &RunId) -> Result<Run, SqliteStoreError> {
    let row: Option<(Vec<u8>, String, String)> = conn
        .query_row(
            "SELECT snapshot_json, snapshot_hash, hash_algorithm FROM runs WHERE run_id = ?1",
            params![run_id.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let Some((snapshot, expected_hash, hash_algorithm)) = row else {
        return Err(SqliteStoreError::RunNotFound(run_id.to_string()));
    };
    let algorithm = parse_hash_algorithm(&hash_algorithm)?;
    let actual = hash_bytes(algorithm, &snapshot);
    if actual.value != expected_hash {
        return Err(SqliteStoreError::Corrupt(format!(
            "snapshot hash mismatch for run {run_id}"
        )));
    }
    let run: Run = serde_json::from_slice(&snapshot)
        .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    Ok(run)
}

fn list_runs_by_tenant(
    conn: &Connection,
    tenant_id: &TenantId,
    status_filter: Option<RunStatus>,
) -> Result<Vec<Run>, SqliteStoreError> {
    let mut statement = conn
        .prepare("SELECT snapshot_json, snapshot_hash, hash_algorithm FROM runs WHERE tenant_id = ?1 ORDER BY run_id")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let rows = statement
        .query_map(params![tenant_id.as_str()], |row| {
            let snapshot: Vec<u8> = row.get(0)?;
            let snapshot_hash: String = row.get(1)?;
            let hash_algorithm: String = row.get(2)?;
            Ok((snapshot, snapshot_hash, hash_algorithm))
        })
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let mut runs = Vec::new();
    for row in rows {
        let (snapshot, expected_hash, hash_algorithm) =
            row.map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        let algorithm = parse_hash_algorithm(&hash_algorithm)?;
        let actual = hash_bytes(algorithm, &snapshot);
        if actual.value != expected_hash {
            return Err(SqliteStoreError::Corrupt("snapshot hash mismatch during list".to_string()));
        }
        let run: Run = serde_json::from_slice(&snapshot)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        if status_filter.is_none_or(|status| run.status == status) {
            runs.push(run);
        }
    }
    Ok(runs)
}

/// Serializes `run` to canonical JSON and computes its content hash,
/// rejecting snapshots over [`MAX_STATE_BYTES`].
fn canonical_snapshot(run: &Run) -> Result<(Vec<u8>, HashDigest), SqliteStoreError> {
    let bytes = canonical_json_bytes(run).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    if bytes.len() > MAX_STATE_BYTES {
        return Err(SqliteStoreError::TooLarge { max_bytes: MAX_STATE_BYTES, actual_bytes: bytes.len() });
    }
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok((bytes, digest))
}

/// Renders a [`RunStatus`] as its stable lowercase storage label.
const fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Idle => "idle",
        RunStatus::SpecReady => "spec_ready",
        RunStatus::Running => "running",
        RunStatus::Paused => "paused",
        RunStatus::Completed => "completed",
        RunStatus::Failed => "failed",
    }
}

/// Renders a [`HashAlgorithm`] as its stable storage label.
const fn hash_algorithm_label(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a stored hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    match label {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(SqliteStoreError::Invalid(format!("unknown hash algorithm: {other}"))),
    }
}

/// Returns the current wall-clock time as a [`Timestamp`]. The store owns
/// this read directly since `RunStateStore::transition` carries no
/// caller-supplied clock parameter.
fn now() -> Timestamp {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |duration| i64::try_from(duration.as_millis()).unwrap_or(i64::MAX));
    Timestamp::UnixMillis(millis)
}

// ============================================================================
// SECTION: Connection Helpers
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
    if path.exists() && path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with secure defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection = Connection::open_with_flags(&config.path, flags)
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .execute_batch("PRAGMA foreign_keys = ON;")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS runs (
                    run_id TEXT NOT NULL PRIMARY KEY,
                    tenant_id TEXT NOT NULL,
                    status TEXT NOT NULL,
                    snapshot_json BLOB NOT NULL,
                    snapshot_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_runs_tenant ON runs (tenant_id);
                CREATE TABLE IF NOT EXISTS run_transitions (
                    run_id TEXT NOT NULL,
                    sequence INTEGER NOT NULL,
                    record_json TEXT NOT NULL,
                    PRIMARY KEY (run_id, sequence),
                    FOREIGN KEY (run_id) REFERENCES runs(run_id) ON DELETE CASCADE
                );",
            )
            .map_err(|err| SqliteStoreError::Db(err.to_string()))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| SqliteStoreError::Db(err.to_string()))?;
    Ok(())
}
