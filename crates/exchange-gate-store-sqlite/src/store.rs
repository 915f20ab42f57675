// crates/exchange-gate-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Exchange Store
// Description: Durable policy and grant store backed by SQLite WAL.
// Purpose: Persist field policies and consumer grants with versioned replace.
// Dependencies: exchange-gate-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements the policy and grant store interfaces on `SQLite`.
//! Each key is one row holding a canonical JSON snapshot, its hash, and a
//! monotonically increasing version. Writes run inside an immediate
//! transaction that checks the caller's [`ExpectedVersion`] before replacing
//! the row, so concurrent writers to the same key serialize and the loser
//! sees a conflict. Deletes keep a tombstone row so versions never repeat.
//! Reads go through a separate connection pool and verify the stored hash
//! before deserializing; a mismatch fails closed as corruption.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use exchange_gate_core::ConsumerGrant;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::ExpectedVersion;
use exchange_gate_core::FieldName;
use exchange_gate_core::FieldPolicy;
use exchange_gate_core::GrantStore;
use exchange_gate_core::GrantWriter;
use exchange_gate_core::PolicyStore;
use exchange_gate_core::PolicyWriter;
use exchange_gate_core::ProviderId;
use exchange_gate_core::StoreError;
use exchange_gate_core::StoredVersion;
use exchange_gate_core::Versioned;
use exchange_gate_core::hashing::DEFAULT_HASH_ALGORITHM;
use exchange_gate_core::hashing::HashAlgorithm;
use exchange_gate_core::hashing::HashDigest;
use exchange_gate_core::hashing::canonical_json_bytes;
use exchange_gate_core::hashing::hash_bytes;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::TransactionBehavior;
use rusqlite::params;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Default number of read connections.
const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Maximum serialized record size accepted by the store.
pub const MAX_RECORD_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `journal_mode` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
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
///
/// # Invariants
/// - Values map 1:1 to `SQLite` `synchronous` pragma settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
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

/// Configuration for the `SQLite` exchange store.
///
/// # Invariants
/// - `path` must resolve to a file path (not a directory).
/// - `busy_timeout_ms` is interpreted as milliseconds.
/// - `read_pool_size` must be greater than zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
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
    /// Number of read-only connections used for read path isolation.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl SqliteStoreConfig {
    /// Creates a configuration with defaults for `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: DEFAULT_READ_POOL_SIZE,
        }
    }

    /// Validates path safety and pool limits.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError::Invalid`] when a limit is violated.
    pub fn validate(&self) -> Result<(), SqliteStoreError> {
        validate_store_path(&self.path)?;
        if self.read_pool_size == 0 {
            return Err(SqliteStoreError::Invalid(
                "read_pool_size must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

/// Returns the default read connection pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
///
/// # Invariants
/// - Error messages avoid embedding raw policy, grant, or audit payloads.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
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
    /// Store payload exceeded the size limit.
    #[error("sqlite store payload too large: {actual_bytes} bytes (max {max_bytes})")]
    TooLarge {
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual payload size in bytes.
        actual_bytes: usize,
    },
    /// Optimistic write precondition failed.
    #[error("sqlite store conflict on {key}: expected {expected}, found {actual}")]
    Conflict {
        /// Key that was written.
        key: String,
        /// Precondition supplied by the writer.
        expected: ExpectedVersion,
        /// Version found in the store.
        actual: StoredVersion,
    },
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) => Self::Store(message),
            SqliteStoreError::Corrupt(message) => Self::Corrupt(message),
            SqliteStoreError::VersionMismatch(message) => Self::VersionMismatch(message),
            SqliteStoreError::Invalid(message) => Self::Invalid(message),
            SqliteStoreError::TooLarge {
                max_bytes,
                actual_bytes,
            } => Self::Invalid(format!(
                "record exceeds size limit: {actual_bytes} bytes (max {max_bytes})"
            )),
            SqliteStoreError::Conflict {
                key,
                expected,
                actual,
            } => Self::Conflict {
                key,
                expected,
                actual,
            },
        }
    }
}

/// Maps a `rusqlite` error into a store error.
pub(crate) fn db_error(err: &rusqlite::Error) -> SqliteStoreError {
    SqliteStoreError::Db(err.to_string())
}

// ============================================================================
// SECTION: Record Tables
// ============================================================================

/// Versioned record tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordTable {
    /// Field policies keyed by field name.
    FieldPolicies,
    /// Consumer grants keyed by consumer identifier.
    ConsumerGrants,
}

impl RecordTable {
    /// Returns the table name.
    const fn table(self) -> &'static str {
        match self {
            Self::FieldPolicies => "field_policies",
            Self::ConsumerGrants => "consumer_grants",
        }
    }

    /// Returns the key column name.
    const fn key_column(self) -> &'static str {
        match self {
            Self::FieldPolicies => "field_name",
            Self::ConsumerGrants => "consumer_id",
        }
    }
}

/// Encoded record ready to be written.
struct EncodedRecord {
    /// Canonical JSON bytes.
    bytes: Vec<u8>,
    /// Digest of `bytes`.
    digest: HashDigest,
    /// Provider column value for policies.
    provider_id: Option<String>,
}

/// Raw row read from a record table.
struct RecordRow {
    /// Stored version.
    version: i64,
    /// Stored JSON bytes; `None` for tombstones.
    bytes: Option<Vec<u8>>,
    /// Stored hash value.
    hash_value: Option<String>,
    /// Stored hash algorithm label.
    hash_algorithm: Option<String>,
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed policy, grant, and audit log store.
///
/// # Invariants
/// - Loads verify stored hashes before deserialization.
/// - Writes are serialized through a single connection and an immediate
///   transaction per operation.
#[derive(Clone)]
pub struct SqliteExchangeStore {
    /// Store configuration.
    config: SqliteStoreConfig,
    /// Shared writer connection guarded by a mutex.
    write_connection: Arc<Mutex<Connection>>,
    /// Read connection pool used for read path isolation under WAL.
    read_connections: Arc<Vec<Mutex<Connection>>>,
    /// Round-robin cursor for read connection selection.
    read_cursor: Arc<AtomicUsize>,
}

impl SqliteExchangeStore {
    /// Opens an `SQLite`-backed store, creating the schema when needed.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        config.validate()?;
        ensure_parent_dir(&config.path)?;
        let mut write_connection = open_connection(&config)?;
        initialize_schema(&mut write_connection)?;
        let mut read_connections = Vec::with_capacity(config.read_pool_size);
        for _ in 0 .. config.read_pool_size {
            read_connections.push(Mutex::new(open_connection(&config)?));
        }
        Ok(Self {
            config,
            write_connection: Arc::new(Mutex::new(write_connection)),
            read_connections: Arc::new(read_connections),
            read_cursor: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Returns the store configuration.
    #[must_use]
    pub const fn config(&self) -> &SqliteStoreConfig {
        &self.config
    }

    /// Verifies the store can execute a simple SQL statement.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] if the mutex is poisoned or the query fails.
    pub fn readiness(&self) -> Result<(), SqliteStoreError> {
        self.with_read(|connection| {
            connection.execute_batch("SELECT 1").map_err(|err| db_error(&err))
        })
    }

    /// Runs `operation` on a pooled read connection.
    pub(crate) fn with_read<T>(
        &self,
        operation: impl FnOnce(&Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let index = self.read_cursor.fetch_add(1, Ordering::Relaxed) % self.read_connections.len();
        let guard = self.read_connections[index]
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite read mutex poisoned".to_string()))?;
        operation(&guard)
    }

    /// Runs `operation` on the writer connection.
    pub(crate) fn with_write<T>(
        &self,
        operation: impl FnOnce(&mut Connection) -> Result<T, SqliteStoreError>,
    ) -> Result<T, SqliteStoreError> {
        let mut guard = self
            .write_connection
            .lock()
            .map_err(|_| SqliteStoreError::Io("sqlite write mutex poisoned".to_string()))?;
        operation(&mut guard)
    }

    /// Reads a versioned record.
    fn read_record<T: DeserializeOwned>(
        &self,
        table: RecordTable,
        key: &str,
    ) -> Result<Option<Versioned<T>>, SqliteStoreError> {
        let row = self.with_read(|connection| fetch_record_row(connection, table, key))?;
        let Some(row) = row else {
            return Ok(None);
        };
        decode_record(key, row)
    }

    /// Writes or deletes a versioned record under a precondition.
    ///
    /// Deleting a never-written key writes nothing and reports version zero.
    fn write_record(
        &self,
        table: RecordTable,
        key: &str,
        record: Option<EncodedRecord>,
        expected: ExpectedVersion,
    ) -> Result<(StoredVersion, u64), SqliteStoreError> {
        self.with_write(|connection| {
            let tx = connection
                .transaction_with_behavior(TransactionBehavior::Immediate)
                .map_err(|err| db_error(&err))?;
            let current = fetch_record_row(&tx, table, key)?;
            let stored = match &current {
                None => StoredVersion::Absent,
                Some(row) => {
                    let version = to_version(row.version, key)?;
                    if row.bytes.is_some() {
                        StoredVersion::Live(version)
                    } else {
                        StoredVersion::Deleted(version)
                    }
                }
            };
            if !expected.admits(stored) {
                return Err(SqliteStoreError::Conflict {
                    key: key.to_string(),
                    expected,
                    actual: stored,
                });
            }
            if record.is_none() && stored == StoredVersion::Absent {
                return Ok((stored, 0));
            }
            let next = stored
                .last_version()
                .checked_add(1)
                .ok_or_else(|| SqliteStoreError::Invalid(format!("version overflow for {key}")))?;
            let next_sql = i64::try_from(next)
                .map_err(|_| SqliteStoreError::Invalid(format!("version overflow for {key}")))?;
            let (bytes, hash_value, hash_algorithm, provider_id) = match record {
                Some(record) => (
                    Some(record.bytes),
                    Some(record.digest.value),
                    Some(hash_algorithm_label(record.digest.algorithm)),
                    record.provider_id,
                ),
                None => (None, None, None, None),
            };
            let sql = format!(
                "INSERT INTO {table} ({key_column}, provider_id, version, record_json, \
                 record_hash, hash_algorithm, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) ON \
                 CONFLICT({key_column}) DO UPDATE SET provider_id = excluded.provider_id, version \
                 = excluded.version, record_json = excluded.record_json, record_hash = \
                 excluded.record_hash, hash_algorithm = excluded.hash_algorithm, updated_at = \
                 excluded.updated_at",
                table = table.table(),
                key_column = table.key_column(),
            );
            tx.execute(
                &sql,
                params![
                    key,
                    provider_id,
                    next_sql,
                    bytes,
                    hash_value,
                    hash_algorithm,
                    unix_millis()
                ],
            )
            .map_err(|err| db_error(&err))?;
            tx.commit().map_err(|err| db_error(&err))?;
            Ok((stored, next))
        })
    }
}

// ============================================================================
// SECTION: Interface Implementations
// ============================================================================

impl PolicyStore for SqliteExchangeStore {
    fn load_field_policy(
        &self,
        field_name: &FieldName,
    ) -> Result<Option<Versioned<FieldPolicy>>, StoreError> {
        Ok(self.read_record(RecordTable::FieldPolicies, field_name.as_str())?)
    }
}

impl PolicyWriter for SqliteExchangeStore {
    fn put_field_policy(
        &self,
        policy: FieldPolicy,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let mut record = encode_record(&policy)?;
        record.provider_id = Some(policy.provider.to_string());
        let (_, version) = self.write_record(
            RecordTable::FieldPolicies,
            policy.field_name.as_str(),
            Some(record),
            expected,
        )?;
        Ok(version)
    }

    fn delete_field_policy(
        &self,
        field_name: &FieldName,
        expected: ExpectedVersion,
    ) -> Result<bool, StoreError> {
        let (previous, _) =
            self.write_record(RecordTable::FieldPolicies, field_name.as_str(), None, expected)?;
        Ok(matches!(previous, StoredVersion::Live(_)))
    }

    fn list_field_policies(
        &self,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<Versioned<FieldPolicy>>, StoreError> {
        let provider = provider.map(ToString::to_string);
        let rows = self.with_read(|connection| {
            let mut statement = connection
                .prepare(
                    "SELECT field_name, version, record_json, record_hash, hash_algorithm FROM \
                     field_policies WHERE record_json IS NOT NULL AND (?1 IS NULL OR provider_id \
                     = ?1) ORDER BY field_name",
                )
                .map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params![provider], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        RecordRow {
                            version: row.get(1)?,
                            bytes: row.get(2)?,
                            hash_value: row.get(3)?,
                            hash_algorithm: row.get(4)?,
                        },
                    ))
                })
                .map_err(|err| db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
        })?;
        let mut policies = Vec::with_capacity(rows.len());
        for (key, row) in rows {
            if let Some(policy) = decode_record(&key, row)? {
                policies.push(policy);
            }
        }
        Ok(policies)
    }
}

impl GrantStore for SqliteExchangeStore {
    fn load_consumer_grant(
        &self,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Versioned<ConsumerGrant>>, StoreError> {
        Ok(self.read_record(RecordTable::ConsumerGrants, consumer_id.as_str())?)
    }
}

impl GrantWriter for SqliteExchangeStore {
    fn put_consumer_grant(
        &self,
        grant: ConsumerGrant,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let record = encode_record(&grant)?;
        let (_, version) = self.write_record(
            RecordTable::ConsumerGrants,
            grant.consumer_id.as_str(),
            Some(record),
            expected,
        )?;
        Ok(version)
    }
}

// ============================================================================
// SECTION: Record Encoding
// ============================================================================

/// Encodes a value as canonical JSON with its digest.
fn encode_record<T: Serialize>(value: &T) -> Result<EncodedRecord, SqliteStoreError> {
    let bytes =
        canonical_json_bytes(value).map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
    check_size(bytes.len())?;
    let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
    Ok(EncodedRecord {
        bytes,
        digest,
        provider_id: None,
    })
}

/// Rejects payloads over [`MAX_RECORD_BYTES`].
pub(crate) const fn check_size(actual_bytes: usize) -> Result<(), SqliteStoreError> {
    if actual_bytes > MAX_RECORD_BYTES {
        return Err(SqliteStoreError::TooLarge {
            max_bytes: MAX_RECORD_BYTES,
            actual_bytes,
        });
    }
    Ok(())
}

/// Verifies and decodes a stored row.
fn decode_record<T: DeserializeOwned>(
    key: &str,
    row: RecordRow,
) -> Result<Option<Versioned<T>>, SqliteStoreError> {
    let version = to_version(row.version, key)?;
    let Some(bytes) = row.bytes else {
        return Ok(None);
    };
    let (Some(hash_value), Some(hash_algorithm)) = (row.hash_value, row.hash_algorithm) else {
        return Err(SqliteStoreError::Corrupt(format!("missing hash for {key}")));
    };
    let value = verify_and_decode(key, &bytes, hash_value, &hash_algorithm)?;
    Ok(Some(Versioned::new(version, value)))
}

/// Verifies a stored hash and deserializes the payload.
pub(crate) fn verify_and_decode<T: DeserializeOwned>(
    key: &str,
    bytes: &[u8],
    hash_value: String,
    hash_algorithm: &str,
) -> Result<T, SqliteStoreError> {
    check_size(bytes.len())?;
    let expected = HashDigest {
        algorithm: parse_hash_algorithm(hash_algorithm)?,
        value: hash_value,
    };
    if !expected.matches_bytes(bytes) {
        return Err(SqliteStoreError::Corrupt(format!("hash mismatch for {key}")));
    }
    serde_json::from_slice(bytes)
        .map_err(|err| SqliteStoreError::Corrupt(format!("undecodable record {key}: {err}")))
}

/// Converts a stored version to `u64`, rejecting nonsense.
fn to_version(version: i64, key: &str) -> Result<u64, SqliteStoreError> {
    match u64::try_from(version) {
        Ok(version) if version > 0 => Ok(version),
        _ => Err(SqliteStoreError::Corrupt(format!("invalid version for {key}"))),
    }
}

/// Fetches the raw row for a key.
fn fetch_record_row(
    connection: &Connection,
    table: RecordTable,
    key: &str,
) -> Result<Option<RecordRow>, SqliteStoreError> {
    let sql = format!(
        "SELECT version, record_json, record_hash, hash_algorithm FROM {} WHERE {} = ?1",
        table.table(),
        table.key_column()
    );
    connection
        .query_row(&sql, params![key], |row| {
            Ok(RecordRow {
                version: row.get(0)?,
                bytes: row.get(1)?,
                hash_value: row.get(2)?,
                hash_algorithm: row.get(3)?,
            })
        })
        .optional()
        .map_err(|err| db_error(&err))
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
    if path.as_os_str().is_empty() {
        return Err(SqliteStoreError::Invalid("store path must not be empty".to_string()));
    }
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
    if path.is_dir() {
        return Err(SqliteStoreError::Invalid(
            "store path must be a file, not a directory".to_string(),
        ));
    }
    Ok(())
}

/// Opens an `SQLite` connection with durable defaults.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let connection =
        Connection::open_with_flags(&config.path, flags).map_err(|err| db_error(&err))?;
    apply_pragmas(&connection, config)?;
    Ok(connection)
}

/// Applies `SQLite` pragmas required for durability.
fn apply_pragmas(
    connection: &Connection,
    config: &SqliteStoreConfig,
) -> Result<(), SqliteStoreError> {
    connection
        .busy_timeout(std::time::Duration::from_millis(config.busy_timeout_ms))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))
        .map_err(|err| db_error(&err))?;
    Ok(())
}

/// Initializes the `SQLite` schema or validates the existing version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|err| db_error(&err))?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")
        .map_err(|err| db_error(&err))?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()
        .map_err(|err| db_error(&err))?;
    match version {
        None => {
            tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| db_error(&err))?;
            tx.execute_batch(
                "CREATE TABLE IF NOT EXISTS field_policies (
                    field_name TEXT PRIMARY KEY,
                    provider_id TEXT,
                    version INTEGER NOT NULL,
                    record_json BLOB,
                    record_hash TEXT,
                    hash_algorithm TEXT,
                    updated_at INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_field_policies_provider
                    ON field_policies (provider_id, field_name);
                CREATE TABLE IF NOT EXISTS consumer_grants (
                    consumer_id TEXT PRIMARY KEY,
                    provider_id TEXT,
                    version INTEGER NOT NULL,
                    record_json BLOB,
                    record_hash TEXT,
                    hash_algorithm TEXT,
                    updated_at INTEGER NOT NULL
                );
                CREATE TABLE IF NOT EXISTS audit_logs (
                    correlation_id TEXT PRIMARY KEY,
                    recorded_at INTEGER NOT NULL,
                    consumer_id TEXT,
                    provider_id TEXT,
                    status TEXT NOT NULL,
                    record_json BLOB NOT NULL,
                    record_hash TEXT NOT NULL,
                    hash_algorithm TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_audit_logs_recorded_at
                    ON audit_logs (recorded_at);
                CREATE INDEX IF NOT EXISTS idx_audit_logs_consumer
                    ON audit_logs (consumer_id, recorded_at);
                CREATE INDEX IF NOT EXISTS idx_audit_logs_provider
                    ON audit_logs (provider_id, recorded_at);",
            )
            .map_err(|err| db_error(&err))?;
        }
        Some(value) if value == SCHEMA_VERSION => {}
        Some(value) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "unsupported schema version: {value}"
            )));
        }
    }
    tx.commit().map_err(|err| db_error(&err))?;
    Ok(())
}

/// Returns the current unix epoch in milliseconds.
fn unix_millis() -> i64 {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    i64::try_from(now.as_millis()).unwrap_or(i64::MAX)
}

/// Returns the canonical hash algorithm label.
pub(crate) const fn hash_algorithm_label(algorithm: HashAlgorithm) -> &'static str {
    match algorithm {
        HashAlgorithm::Sha256 => "sha256",
    }
}

/// Parses a hash algorithm label.
fn parse_hash_algorithm(label: &str) -> Result<HashAlgorithm, SqliteStoreError> {
    match label {
        "sha256" => Ok(HashAlgorithm::Sha256),
        other => Err(SqliteStoreError::Invalid(format!("unsupported hash algorithm: {other}"))),
    }
}
