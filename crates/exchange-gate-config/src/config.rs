// crates/exchange-gate-config/src/config.rs
// ============================================================================
// Module: Exchange Gate Configuration
// Description: Configuration loading and validation for Exchange Gate.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: exchange-gate-audit, exchange-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits.
//! Missing or invalid configuration fails closed. Every section has defaults,
//! so an empty file yields an in-memory store with audit records on stderr.
//! Config inputs are untrusted; secrets such as the audit endpoint token are
//! never echoed in error messages.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use exchange_gate_audit::Backoff;
use exchange_gate_audit::DEFAULT_MAX_IN_FLIGHT;
use exchange_gate_audit::DEFAULT_MAX_QUEUED;
use exchange_gate_audit::MAX_RETRY_ATTEMPTS;
use exchange_gate_audit::RetryPolicy;
use exchange_gate_core::PayloadCapture;
use exchange_gate_store_sqlite::SqliteStoreConfig;
use exchange_gate_store_sqlite::SqliteStoreMode;
use exchange_gate_store_sqlite::SqliteSyncMode;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
const DEFAULT_CONFIG_NAME: &str = "exchange-gate.toml";
/// Environment variable used to override the config path.
pub const CONFIG_ENV_VAR: &str = "EXCHANGE_GATE_CONFIG";
/// Maximum configuration file size in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Default `SQLite` busy timeout in milliseconds.
pub(crate) const DEFAULT_STORE_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum `SQLite` busy timeout in milliseconds.
pub(crate) const MAX_STORE_BUSY_TIMEOUT_MS: u64 = 60_000;
/// Default number of `SQLite` read connections.
pub(crate) const DEFAULT_READ_POOL_SIZE: usize = 4;
/// Maximum number of `SQLite` read connections.
pub(crate) const MAX_READ_POOL_SIZE: usize = 64;
/// Maximum concurrent background audit deliveries.
pub(crate) const MAX_AUDIT_IN_FLIGHT: usize = 4_096;
/// Maximum audits waiting for a delivery slot.
pub(crate) const MAX_AUDIT_QUEUED: usize = 65_536;
/// Default audit endpoint connect timeout in milliseconds.
pub(crate) const DEFAULT_AUDIT_CONNECT_TIMEOUT_MS: u64 = 2_000;
/// Default audit endpoint request timeout in milliseconds.
pub(crate) const DEFAULT_AUDIT_REQUEST_TIMEOUT_MS: u64 = 5_000;
/// Minimum audit endpoint connect timeout in milliseconds.
pub(crate) const MIN_AUDIT_CONNECT_TIMEOUT_MS: u64 = 100;
/// Maximum audit endpoint connect timeout in milliseconds.
pub(crate) const MAX_AUDIT_CONNECT_TIMEOUT_MS: u64 = 10_000;
/// Minimum audit endpoint request timeout in milliseconds.
pub(crate) const MIN_AUDIT_REQUEST_TIMEOUT_MS: u64 = 500;
/// Maximum audit endpoint request timeout in milliseconds.
pub(crate) const MAX_AUDIT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Maximum length of the audit endpoint bearer token.
pub(crate) const MAX_AUDIT_TOKEN_LENGTH: usize = 256;
/// Default delivery attempts per audit record.
pub(crate) const DEFAULT_RETRY_MAX_ATTEMPTS: u32 = 3;
/// Default per-attempt timeout in milliseconds.
pub(crate) const DEFAULT_RETRY_ATTEMPT_TIMEOUT_MS: u64 = 5_000;
/// Minimum per-attempt timeout in milliseconds.
pub(crate) const MIN_RETRY_ATTEMPT_TIMEOUT_MS: u64 = 100;
/// Maximum per-attempt timeout in milliseconds.
pub(crate) const MAX_RETRY_ATTEMPT_TIMEOUT_MS: u64 = 60_000;
/// Default initial backoff delay in milliseconds.
pub(crate) const DEFAULT_RETRY_INITIAL_DELAY_MS: u64 = 100;
/// Default maximum backoff delay in milliseconds.
pub(crate) const DEFAULT_RETRY_MAX_DELAY_MS: u64 = 2_000;
/// Maximum backoff delay in milliseconds.
pub(crate) const MAX_RETRY_DELAY_MS: u64 = 60_000;
/// Maximum length of a correlation identifier prefix.
pub(crate) const MAX_CORRELATION_PREFIX_LENGTH: usize = 32;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Exchange Gate configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExchangeGateConfig {
    /// Policy and grant store configuration.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit delivery configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Request orchestration configuration.
    #[serde(default)]
    pub gate: GateConfig,
    /// Optional config source metadata (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl ExchangeGateConfig {
    /// Loads configuration from disk using the default resolution rules.
    ///
    /// The path is taken from `path`, then `EXCHANGE_GATE_CONFIG`, then
    /// `exchange-gate.toml` in the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::from_toml_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        Ok(config)
    }

    /// Parses and validates configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when parsing or validation fails.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.store.validate()?;
        self.audit.validate(&self.store)?;
        self.gate.validate()?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Policy and grant store configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Store backend type.
    #[serde(rename = "type", default)]
    pub store_type: StoreType,
    /// `SQLite` database path when using the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_store_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` synchronous mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
    /// Number of read connections.
    #[serde(default = "default_read_pool_size")]
    pub read_pool_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_type: StoreType::default(),
            path: None,
            busy_timeout_ms: default_store_busy_timeout_ms(),
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
            read_pool_size: default_read_pool_size(),
        }
    }
}

impl StoreConfig {
    /// Validates store configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.store_type {
            StoreType::Memory => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "memory store must not set path".to_string(),
                    ));
                }
                Ok(())
            }
            StoreType::Sqlite => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("sqlite store requires path".to_string())
                })?;
                validate_path_string("store.path", &path.to_string_lossy())?;
                if self.busy_timeout_ms > MAX_STORE_BUSY_TIMEOUT_MS {
                    return Err(ConfigError::Invalid(
                        "store.busy_timeout_ms exceeds limit".to_string(),
                    ));
                }
                if self.read_pool_size == 0 || self.read_pool_size > MAX_READ_POOL_SIZE {
                    return Err(ConfigError::Invalid(format!(
                        "store.read_pool_size must be between 1 and {MAX_READ_POOL_SIZE}"
                    )));
                }
                Ok(())
            }
        }
    }

    /// Returns the `SQLite` store configuration when the sqlite backend is
    /// selected.
    #[must_use]
    pub fn sqlite_config(&self) -> Option<SqliteStoreConfig> {
        if self.store_type != StoreType::Sqlite {
            return None;
        }
        let path = self.path.clone()?;
        Some(SqliteStoreConfig {
            path,
            busy_timeout_ms: self.busy_timeout_ms,
            journal_mode: self.journal_mode,
            sync_mode: self.sync_mode,
            read_pool_size: self.read_pool_size,
        })
    }
}

/// Store backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreType {
    /// Use the in-memory store.
    #[default]
    Memory,
    /// Use `SQLite`-backed durable store.
    Sqlite,
}

// ============================================================================
// SECTION: Audit
// ============================================================================

/// Audit delivery configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditConfig {
    /// Audit sink selection.
    #[serde(default)]
    pub sink: AuditSinkType,
    /// Output path for the file sink, or a separate database for the
    /// sqlite sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Base URL of the audit service for the http sink.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Optional bearer token for the http sink.
    #[serde(default)]
    pub token: Option<String>,
    /// Allow non-TLS endpoints (explicit opt-in).
    #[serde(default)]
    pub allow_http: bool,
    /// Connect timeout for the http sink in milliseconds.
    #[serde(default = "default_audit_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Request timeout for the http sink in milliseconds.
    #[serde(default = "default_audit_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Payload capture mode for audit records.
    #[serde(default)]
    pub payload_capture: PayloadCapture,
    /// Bound on concurrent background deliveries.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
    /// Bound on audits waiting for a delivery slot.
    #[serde(default = "default_max_queued")]
    pub max_queued: usize,
    /// Delivery retry policy.
    #[serde(default)]
    pub retry: AuditRetryConfig,
    /// Operational monitor for delivery signals.
    #[serde(default)]
    pub monitor: AuditMonitorConfig,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            sink: AuditSinkType::default(),
            path: None,
            endpoint: None,
            token: None,
            allow_http: false,
            connect_timeout_ms: default_audit_connect_timeout_ms(),
            request_timeout_ms: default_audit_request_timeout_ms(),
            payload_capture: PayloadCapture::default(),
            max_in_flight: default_max_in_flight(),
            max_queued: default_max_queued(),
            retry: AuditRetryConfig::default(),
            monitor: AuditMonitorConfig::default(),
        }
    }
}

impl AuditConfig {
    /// Validates audit configuration against the store selection.
    fn validate(&self, store: &StoreConfig) -> Result<(), ConfigError> {
        match self.sink {
            AuditSinkType::Stderr => {
                if self.path.is_some() || self.endpoint.is_some() {
                    return Err(ConfigError::Invalid(
                        "stderr audit sink must not set path or endpoint".to_string(),
                    ));
                }
            }
            AuditSinkType::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file audit sink requires path".to_string())
                })?;
                validate_path_string("audit.path", &path.to_string_lossy())?;
            }
            AuditSinkType::Sqlite => {
                match (&self.path, store.store_type) {
                    (Some(path), _) => {
                        validate_path_string("audit.path", &path.to_string_lossy())?;
                    }
                    (None, StoreType::Sqlite) => {}
                    (None, StoreType::Memory) => {
                        return Err(ConfigError::Invalid(
                            "sqlite audit sink requires path or a sqlite store".to_string(),
                        ));
                    }
                }
            }
            AuditSinkType::Http => self.validate_http()?,
        }
        if self.max_in_flight == 0 || self.max_in_flight > MAX_AUDIT_IN_FLIGHT {
            return Err(ConfigError::Invalid(format!(
                "audit.max_in_flight must be between 1 and {MAX_AUDIT_IN_FLIGHT}"
            )));
        }
        if self.max_queued == 0 || self.max_queued > MAX_AUDIT_QUEUED {
            return Err(ConfigError::Invalid(format!(
                "audit.max_queued must be between 1 and {MAX_AUDIT_QUEUED}"
            )));
        }
        self.retry.validate()?;
        self.monitor.validate()?;
        Ok(())
    }

    /// Validates http sink settings.
    fn validate_http(&self) -> Result<(), ConfigError> {
        let endpoint = self
            .endpoint
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| ConfigError::Invalid("http audit sink requires endpoint".to_string()))?;
        if !(endpoint.starts_with("https://") || endpoint.starts_with("http://")) {
            return Err(ConfigError::Invalid(
                "audit.endpoint must include http:// or https://".to_string(),
            ));
        }
        if endpoint.starts_with("http://") && !self.allow_http {
            return Err(ConfigError::Invalid(
                "audit.endpoint uses http:// without allow_http".to_string(),
            ));
        }
        if let Some(token) = &self.token {
            if token.trim().is_empty() {
                return Err(ConfigError::Invalid("audit.token must be non-empty".to_string()));
            }
            if token.len() > MAX_AUDIT_TOKEN_LENGTH {
                return Err(ConfigError::Invalid("audit.token exceeds max length".to_string()));
            }
        }
        if !(MIN_AUDIT_CONNECT_TIMEOUT_MS ..= MAX_AUDIT_CONNECT_TIMEOUT_MS)
            .contains(&self.connect_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "audit.connect_timeout_ms must be between {MIN_AUDIT_CONNECT_TIMEOUT_MS} and \
                 {MAX_AUDIT_CONNECT_TIMEOUT_MS}"
            )));
        }
        if !(MIN_AUDIT_REQUEST_TIMEOUT_MS ..= MAX_AUDIT_REQUEST_TIMEOUT_MS)
            .contains(&self.request_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "audit.request_timeout_ms must be between {MIN_AUDIT_REQUEST_TIMEOUT_MS} and \
                 {MAX_AUDIT_REQUEST_TIMEOUT_MS}"
            )));
        }
        Ok(())
    }
}

/// Audit sink selection.
///
/// There is no disabled sink; every request is recorded somewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// `SQLite` audit log table.
    Sqlite,
    /// Remote audit service over HTTP.
    Http,
}

/// Audit delivery retry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditRetryConfig {
    /// Delivery attempts per record, including the first.
    #[serde(default = "default_retry_max_attempts")]
    pub max_attempts: u32,
    /// Timeout applied to each attempt in milliseconds.
    #[serde(default = "default_retry_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
    /// Delay strategy between attempts.
    #[serde(default)]
    pub backoff: BackoffKind,
    /// First delay (or the fixed delay) in milliseconds.
    #[serde(default = "default_retry_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Ceiling for exponential delays in milliseconds.
    #[serde(default = "default_retry_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for AuditRetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_max_attempts(),
            attempt_timeout_ms: default_retry_attempt_timeout_ms(),
            backoff: BackoffKind::default(),
            initial_delay_ms: default_retry_initial_delay_ms(),
            max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl AuditRetryConfig {
    /// Validates retry limits.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "audit.retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        if !(MIN_RETRY_ATTEMPT_TIMEOUT_MS ..= MAX_RETRY_ATTEMPT_TIMEOUT_MS)
            .contains(&self.attempt_timeout_ms)
        {
            return Err(ConfigError::Invalid(format!(
                "audit.retry.attempt_timeout_ms must be between {MIN_RETRY_ATTEMPT_TIMEOUT_MS} \
                 and {MAX_RETRY_ATTEMPT_TIMEOUT_MS}"
            )));
        }
        if self.max_delay_ms > MAX_RETRY_DELAY_MS {
            return Err(ConfigError::Invalid(
                "audit.retry.max_delay_ms exceeds limit".to_string(),
            ));
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigError::Invalid(
                "audit.retry.initial_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the delivery retry policy.
    #[must_use]
    pub const fn to_retry_policy(&self) -> RetryPolicy {
        let initial = Duration::from_millis(self.initial_delay_ms);
        let backoff = match self.backoff {
            BackoffKind::Fixed => Backoff::Fixed {
                delay: initial,
            },
            BackoffKind::Exponential => Backoff::Exponential {
                initial,
                max: Duration::from_millis(self.max_delay_ms),
            },
        };
        RetryPolicy {
            max_attempts: self.max_attempts,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
            backoff,
        }
    }
}

/// Backoff strategy selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackoffKind {
    /// Constant delay of `initial_delay_ms`.
    Fixed,
    /// Doubling delay from `initial_delay_ms` capped at `max_delay_ms`.
    #[default]
    Exponential,
}

/// Audit monitor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuditMonitorConfig {
    /// Monitor backend type.
    #[serde(rename = "type", default)]
    pub monitor_type: AuditMonitorType,
    /// Output path for the file monitor.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl AuditMonitorConfig {
    /// Validates monitor configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        match self.monitor_type {
            AuditMonitorType::File => {
                let path = self.path.as_ref().ok_or_else(|| {
                    ConfigError::Invalid("file audit monitor requires path".to_string())
                })?;
                validate_path_string("audit.monitor.path", &path.to_string_lossy())
            }
            AuditMonitorType::Stderr => {
                if self.path.is_some() {
                    return Err(ConfigError::Invalid(
                        "audit.monitor.path is only valid for the file monitor".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }
}

/// Audit monitor backend type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditMonitorType {
    /// JSON lines on stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
}

// ============================================================================
// SECTION: Gate
// ============================================================================

/// Request orchestration configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// How per-field verdicts compose into a disclosure.
    #[serde(default)]
    pub disclosure: DisclosureMode,
    /// Optional prefix for generated correlation identifiers.
    #[serde(default)]
    pub correlation_prefix: Option<String>,
}

impl GateConfig {
    /// Validates gate configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(prefix) = &self.correlation_prefix {
            if prefix.is_empty() || prefix.len() > MAX_CORRELATION_PREFIX_LENGTH {
                return Err(ConfigError::Invalid(format!(
                    "gate.correlation_prefix must be 1 to {MAX_CORRELATION_PREFIX_LENGTH} \
                     characters"
                )));
            }
            if !prefix.bytes().all(|byte| byte.is_ascii_alphanumeric() || byte == b'-') {
                return Err(ConfigError::Invalid(
                    "gate.correlation_prefix must be ascii alphanumeric or '-'".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Composition of per-field verdicts into a disclosure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DisclosureMode {
    /// Any denied field denies the whole request.
    #[default]
    AllOrNothing,
    /// Allowed fields are disclosed; denied fields are withheld.
    AllowedOnly,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from CLI or environment defaults.
fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against security limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        let component_value = component.as_os_str().to_string_lossy();
        if component_value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Default `SQLite` busy timeout.
const fn default_store_busy_timeout_ms() -> u64 {
    DEFAULT_STORE_BUSY_TIMEOUT_MS
}

/// Default `SQLite` read pool size.
const fn default_read_pool_size() -> usize {
    DEFAULT_READ_POOL_SIZE
}

/// Default audit endpoint connect timeout.
const fn default_audit_connect_timeout_ms() -> u64 {
    DEFAULT_AUDIT_CONNECT_TIMEOUT_MS
}

/// Default audit endpoint request timeout.
const fn default_audit_request_timeout_ms() -> u64 {
    DEFAULT_AUDIT_REQUEST_TIMEOUT_MS
}

/// Default bound on concurrent audit deliveries.
const fn default_max_in_flight() -> usize {
    DEFAULT_MAX_IN_FLIGHT
}

/// Default bound on queued audits.
const fn default_max_queued() -> usize {
    DEFAULT_MAX_QUEUED
}

/// Default delivery attempts.
const fn default_retry_max_attempts() -> u32 {
    DEFAULT_RETRY_MAX_ATTEMPTS
}

/// Default per-attempt timeout.
const fn default_retry_attempt_timeout_ms() -> u64 {
    DEFAULT_RETRY_ATTEMPT_TIMEOUT_MS
}

/// Default initial backoff delay.
const fn default_retry_initial_delay_ms() -> u64 {
    DEFAULT_RETRY_INITIAL_DELAY_MS
}

/// Default maximum backoff delay.
const fn default_retry_max_delay_ms() -> u64 {
    DEFAULT_RETRY_MAX_DELAY_MS
}
