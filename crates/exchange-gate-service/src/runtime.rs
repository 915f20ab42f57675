// crates/exchange-gate-service/src/runtime.rs
// ============================================================================
// Module: Gate Runtime
// Description: Assembly of stores, audit delivery, and the gate from config.
// Purpose: Turn a validated configuration into a running access gate.
// Dependencies: exchange-gate-audit, exchange-gate-config, exchange-gate-store-sqlite
// ============================================================================

//! ## Overview
//! [`GateRuntime::from_config`] wires the configured store backend, audit
//! sink, monitor, and dispatcher into an [`AccessGate`]. The runtime owns
//! the audit dispatcher; call [`GateRuntime::shutdown`] to drain pending
//! records before exit. Construction must happen inside a Tokio runtime.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::time::Duration;

use exchange_gate_audit::AuditDispatcher;
use exchange_gate_audit::AuditHandle;
use exchange_gate_audit::AuditMonitor;
use exchange_gate_audit::AuditRecorder;
use exchange_gate_audit::AuditSink;
use exchange_gate_audit::FileAuditMonitor;
use exchange_gate_audit::HttpAuditSink;
use exchange_gate_audit::HttpAuditSinkConfig;
use exchange_gate_audit::JsonLineAuditSink;
use exchange_gate_audit::StderrAuditMonitor;
use exchange_gate_config::AuditConfig;
use exchange_gate_config::AuditMonitorType;
use exchange_gate_config::AuditSinkType;
use exchange_gate_config::ExchangeGateConfig;
use exchange_gate_config::StoreType;
use exchange_gate_core::AuditLogQuery;
use exchange_gate_core::Clock;
use exchange_gate_core::GrantWriter;
use exchange_gate_core::InMemoryGrantStore;
use exchange_gate_core::InMemoryPolicyStore;
use exchange_gate_core::PolicyWriter;
use exchange_gate_core::SystemClock;
use exchange_gate_store_sqlite::SqliteExchangeStore;
use exchange_gate_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

use crate::correlation::CorrelationIdGenerator;
use crate::gate::AccessGate;
use crate::telemetry::GateMetrics;
use crate::telemetry::MetricsAuditMonitor;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runtime assembly failures.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Store backend could not be opened.
    #[error("store initialization failed: {0}")]
    Store(String),
    /// Audit sink or monitor could not be opened.
    #[error("audit initialization failed: {0}")]
    Audit(String),
}

// ============================================================================
// SECTION: Runtime
// ============================================================================

/// Policy and grant stores with write access for administration.
#[derive(Clone)]
pub struct GateStores {
    /// Field policy store.
    pub policies: Arc<dyn PolicyWriter>,
    /// Consumer grant store.
    pub grants: Arc<dyn GrantWriter>,
}

/// Fully wired gate with its audit dispatcher.
pub struct GateRuntime {
    /// Request orchestrator.
    gate: AccessGate,
    /// Administrative store handles.
    stores: GateStores,
    /// Audit log reader when the sink supports queries.
    audit_log: Option<Arc<dyn AuditLogQuery>>,
    /// Background audit delivery.
    dispatcher: AuditDispatcher,
}

impl GateRuntime {
    /// Builds a runtime from configuration using the system clock.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when validation fails or a backend cannot
    /// be opened.
    pub fn from_config(
        config: &ExchangeGateConfig,
        metrics: Arc<dyn GateMetrics>,
    ) -> Result<Self, RuntimeError> {
        Self::from_config_with_clock(config, metrics, Arc::new(SystemClock))
    }

    /// Builds a runtime from configuration with an explicit clock.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError`] when validation fails or a backend cannot
    /// be opened.
    pub fn from_config_with_clock(
        config: &ExchangeGateConfig,
        metrics: Arc<dyn GateMetrics>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        config.validate().map_err(|err| RuntimeError::Config(err.to_string()))?;

        let sqlite_store = match config.store.store_type {
            StoreType::Memory => None,
            StoreType::Sqlite => {
                let sqlite_config = config.store.sqlite_config().ok_or_else(|| {
                    RuntimeError::Config("sqlite store requires path".to_string())
                })?;
                let store = SqliteExchangeStore::new(sqlite_config)
                    .map_err(|err| RuntimeError::Store(err.to_string()))?;
                Some(Arc::new(store))
            }
        };
        let stores = match &sqlite_store {
            Some(store) => GateStores {
                policies: store.clone(),
                grants: store.clone(),
            },
            None => GateStores {
                policies: Arc::new(InMemoryPolicyStore::new()),
                grants: Arc::new(InMemoryGrantStore::new()),
            },
        };

        let (sink, audit_log) = build_sink(&config.audit, sqlite_store.as_ref())?;
        let monitor = build_monitor(&config.audit)?;
        let monitor: Arc<dyn AuditMonitor> =
            Arc::new(MetricsAuditMonitor::new(monitor, Arc::clone(&metrics)));
        let recorder = AuditRecorder::new(
            sink,
            monitor,
            config.audit.retry.to_retry_policy(),
            config.audit.payload_capture,
            clock,
        );
        let dispatcher = AuditDispatcher::spawn(
            Arc::new(recorder),
            config.audit.max_in_flight,
            config.audit.max_queued,
        );

        let correlation = config
            .gate
            .correlation_prefix
            .as_deref()
            .map_or_else(CorrelationIdGenerator::default, CorrelationIdGenerator::new);
        let gate = AccessGate::new(
            stores.policies.clone(),
            stores.grants.clone(),
            dispatcher.handle(),
        )
        .with_disclosure(config.gate.disclosure)
        .with_correlation(correlation)
        .with_metrics(metrics);

        Ok(Self {
            gate,
            stores,
            audit_log,
            dispatcher,
        })
    }

    /// Returns the request orchestrator.
    #[must_use]
    pub const fn gate(&self) -> &AccessGate {
        &self.gate
    }

    /// Returns the administrative store handles.
    #[must_use]
    pub const fn stores(&self) -> &GateStores {
        &self.stores
    }

    /// Returns the audit log reader, if the configured sink supports one.
    #[must_use]
    pub fn audit_log(&self) -> Option<Arc<dyn AuditLogQuery>> {
        self.audit_log.clone()
    }

    /// Returns a handle for submitting audits outside the gate.
    #[must_use]
    pub fn audit_handle(&self) -> AuditHandle {
        self.dispatcher.handle()
    }

    /// Stops accepting audits and waits for in-flight deliveries.
    pub async fn shutdown(self) {
        drop(self.gate);
        self.dispatcher.shutdown().await;
    }
}

// ============================================================================
// SECTION: Builders
// ============================================================================

/// Sink plus its query view, when it has one.
type SinkParts = (Arc<dyn AuditSink>, Option<Arc<dyn AuditLogQuery>>);

/// Builds the configured audit sink.
fn build_sink(
    config: &AuditConfig,
    sqlite_store: Option<&Arc<SqliteExchangeStore>>,
) -> Result<SinkParts, RuntimeError> {
    match config.sink {
        AuditSinkType::Stderr => Ok((Arc::new(JsonLineAuditSink::stderr()), None)),
        AuditSinkType::File => {
            let path = config.path.as_ref().ok_or_else(|| {
                RuntimeError::Config("file audit sink requires path".to_string())
            })?;
            let sink =
                JsonLineAuditSink::open(path).map_err(|err| RuntimeError::Audit(err.to_string()))?;
            Ok((Arc::new(sink), None))
        }
        AuditSinkType::Sqlite => {
            let store = match (&config.path, sqlite_store) {
                (Some(path), _) => Arc::new(
                    SqliteExchangeStore::new(SqliteStoreConfig::new(path.clone()))
                        .map_err(|err| RuntimeError::Audit(err.to_string()))?,
                ),
                (None, Some(store)) => Arc::clone(store),
                (None, None) => {
                    return Err(RuntimeError::Config(
                        "sqlite audit sink requires audit.path or a sqlite store".to_string(),
                    ));
                }
            };
            let sink: Arc<dyn AuditSink> = store.clone();
            let query: Arc<dyn AuditLogQuery> = store;
            Ok((sink, Some(query)))
        }
        AuditSinkType::Http => {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                RuntimeError::Config("http audit sink requires endpoint".to_string())
            })?;
            let mut settings = HttpAuditSinkConfig::new(endpoint.clone());
            settings.token.clone_from(&config.token);
            settings.connect_timeout = Duration::from_millis(config.connect_timeout_ms);
            settings.request_timeout = Duration::from_millis(config.request_timeout_ms);
            let sink =
                HttpAuditSink::new(settings).map_err(|err| RuntimeError::Audit(err.to_string()))?;
            Ok((Arc::new(sink), None))
        }
    }
}

/// Builds the configured delivery monitor.
fn build_monitor(config: &AuditConfig) -> Result<Arc<dyn AuditMonitor>, RuntimeError> {
    match config.monitor.monitor_type {
        AuditMonitorType::Stderr => Ok(Arc::new(StderrAuditMonitor)),
        AuditMonitorType::File => {
            let path = config.monitor.path.as_ref().ok_or_else(|| {
                RuntimeError::Config("file audit monitor requires path".to_string())
            })?;
            let monitor =
                FileAuditMonitor::open(path).map_err(|err| RuntimeError::Audit(err.to_string()))?;
            Ok(Arc::new(monitor))
        }
    }
}
