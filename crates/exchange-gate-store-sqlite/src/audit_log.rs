// crates/exchange-gate-store-sqlite/src/audit_log.rs
// ============================================================================
// Module: SQLite Audit Log
// Description: Durable audit record table with filtered queries.
// Purpose: Serve as an audit sink and the audit query backend.
// Dependencies: exchange-gate-audit, exchange-gate-core, rusqlite, tokio
// ============================================================================

//! ## Overview
//! Audit records land in the `audit_logs` table keyed by correlation
//! identifier. Inserts are idempotent: a retried delivery of a record that
//! already landed is accepted without writing a second row. Indexed columns
//! carry the filterable attributes; the full record is stored as canonical
//! JSON with its hash and verified on every read.

// ============================================================================
// SECTION: Imports
// ============================================================================

use async_trait::async_trait;
use exchange_gate_audit::AuditSink;
use exchange_gate_audit::AuditSinkError;
use exchange_gate_core::AuditLogFilter;
use exchange_gate_core::AuditLogQuery;
use exchange_gate_core::AuditLogRecord;
use exchange_gate_core::StoreError;
use exchange_gate_core::hashing::DEFAULT_HASH_ALGORITHM;
use exchange_gate_core::hashing::canonical_json_bytes;
use exchange_gate_core::hashing::hash_bytes;
use rusqlite::params;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;

use crate::store::SqliteExchangeStore;
use crate::store::SqliteStoreError;
use crate::store::check_size;
use crate::store::db_error;
use crate::store::hash_algorithm_label;
use crate::store::verify_and_decode;

// ============================================================================
// SECTION: Writes
// ============================================================================

impl SqliteExchangeStore {
    /// Inserts an audit record unless one with the same correlation
    /// identifier already exists.
    ///
    /// Returns `true` when a new row was written.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when encoding or the insert fails.
    pub fn insert_audit_log(&self, record: &AuditLogRecord) -> Result<bool, SqliteStoreError> {
        let bytes = canonical_json_bytes(record)
            .map_err(|err| SqliteStoreError::Invalid(err.to_string()))?;
        check_size(bytes.len())?;
        let digest = hash_bytes(DEFAULT_HASH_ALGORITHM, &bytes);
        let inserted = self.with_write(|connection| {
            connection
                .execute(
                    "INSERT INTO audit_logs (correlation_id, recorded_at, consumer_id, \
                     provider_id, status, record_json, record_hash, hash_algorithm) VALUES (?1, \
                     ?2, ?3, ?4, ?5, ?6, ?7, ?8) ON CONFLICT(correlation_id) DO NOTHING",
                    params![
                        record.correlation_id.as_str(),
                        record.timestamp.unix_millis(),
                        record.consumer_id.as_ref().map(ToString::to_string),
                        record.provider_id.as_ref().map(ToString::to_string),
                        record.status.as_str(),
                        bytes,
                        digest.value,
                        hash_algorithm_label(digest.algorithm),
                    ],
                )
                .map_err(|err| db_error(&err))
        })?;
        Ok(inserted > 0)
    }

    /// Returns audit records matching `filter`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the query fails or a stored record
    /// fails hash verification.
    pub fn audit_logs(
        &self,
        filter: &AuditLogFilter,
    ) -> Result<Vec<AuditLogRecord>, SqliteStoreError> {
        let mut clauses: Vec<&'static str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();
        if let Some(consumer_id) = &filter.consumer_id {
            clauses.push("consumer_id = ?");
            values.push(SqlValue::Text(consumer_id.to_string()));
        }
        if let Some(provider_id) = &filter.provider_id {
            clauses.push("provider_id = ?");
            values.push(SqlValue::Text(provider_id.to_string()));
        }
        if let Some(status) = filter.status {
            clauses.push("status = ?");
            values.push(SqlValue::Text(status.as_str().to_string()));
        }
        if let Some(since) = filter.since {
            clauses.push("recorded_at >= ?");
            values.push(SqlValue::Integer(since.unix_millis()));
        }
        if let Some(until) = filter.until {
            clauses.push("recorded_at < ?");
            values.push(SqlValue::Integer(until.unix_millis()));
        }
        let limit = i64::try_from(filter.effective_limit()).unwrap_or(i64::MAX);
        values.push(SqlValue::Integer(limit));
        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {} ", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT correlation_id, record_json, record_hash, hash_algorithm FROM audit_logs \
             {where_clause}ORDER BY recorded_at DESC, rowid DESC LIMIT ?"
        );
        let rows = self.with_read(|connection| {
            let mut statement = connection.prepare(&sql).map_err(|err| db_error(&err))?;
            let rows = statement
                .query_map(params_from_iter(values), |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })
                .map_err(|err| db_error(&err))?;
            rows.collect::<Result<Vec<_>, _>>().map_err(|err| db_error(&err))
        })?;
        rows.into_iter()
            .map(|(key, bytes, hash_value, hash_algorithm)| {
                verify_and_decode(&key, &bytes, hash_value, &hash_algorithm)
            })
            .collect()
    }
}

// ============================================================================
// SECTION: Interface Implementations
// ============================================================================

impl AuditLogQuery for SqliteExchangeStore {
    fn query_audit_logs(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogRecord>, StoreError> {
        Ok(self.audit_logs(filter)?)
    }
}

#[async_trait]
impl AuditSink for SqliteExchangeStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn deliver(&self, record: &AuditLogRecord) -> Result<(), AuditSinkError> {
        let store = self.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || store.insert_audit_log(&record))
            .await
            .map_err(|err| AuditSinkError::Unavailable(err.to_string()))??;
        Ok(())
    }
}

impl From<SqliteStoreError> for AuditSinkError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) | SqliteStoreError::Db(message) => {
                Self::Unavailable(message)
            }
            SqliteStoreError::Invalid(_) | SqliteStoreError::TooLarge { .. } => {
                Self::Serialize(error.to_string())
            }
            SqliteStoreError::Corrupt(_)
            | SqliteStoreError::VersionMismatch(_)
            | SqliteStoreError::Conflict { .. } => Self::Store(error.to_string()),
        }
    }
}
