// crates/exchange-gate-service/tests/runtime.rs
// ============================================================================
// Module: Gate Runtime Tests
// Description: Configuration-driven assembly of stores, audit, and gate.
// ============================================================================
//! ## Overview
//! Builds runtimes from configuration and checks that writes through the
//! administrative stores reach the gate and that audits land in the
//! configured sink after shutdown.

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
    reason = "Test-only output and panic-based assertions are permitted."
)]

mod common;

use std::sync::Arc;

use exchange_gate_config::AuditMonitorType;
use exchange_gate_config::AuditSinkType;
use exchange_gate_config::DisclosureMode;
use exchange_gate_config::ExchangeGateConfig;
use exchange_gate_config::StoreType;
use exchange_gate_core::AuditLogFilter;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::ExpectedVersion;
use exchange_gate_core::FieldName;
use exchange_gate_core::GrantDuration;
use exchange_gate_core::ManualClock;
use exchange_gate_core::grant_allow_list;
use exchange_gate_service::AccessRequest;
use exchange_gate_service::Disclosure;
use exchange_gate_service::GateRuntime;
use exchange_gate_service::NoopMetrics;
use exchange_gate_service::RuntimeError;
use tempfile::TempDir;

use crate::common::before_expiry;
use crate::common::reference_downstream;
use crate::common::reference_grants;
use crate::common::reference_policies;
use crate::common::ts;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn sqlite_config(dir: &TempDir) -> ExchangeGateConfig {
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(dir.path().join("exchange.db"));
    config.audit.sink = AuditSinkType::Sqlite;
    config.audit.monitor.monitor_type = AuditMonitorType::File;
    config.audit.monitor.path = Some(dir.path().join("monitor.jsonl"));
    config.gate.correlation_prefix = Some("rt".to_string());
    config
}

fn runtime(config: &ExchangeGateConfig) -> GateRuntime {
    GateRuntime::from_config_with_clock(
        config,
        Arc::new(NoopMetrics),
        Arc::new(ManualClock::new(before_expiry())),
    )
    .unwrap()
}

fn seed(runtime: &GateRuntime) {
    let stores = runtime.stores();
    for policy in reference_policies() {
        stores.policies.put_field_policy(policy, ExpectedVersion::Any).unwrap();
    }
    for grant in reference_grants() {
        stores.grants.put_consumer_grant(grant, ExpectedVersion::Any).unwrap();
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies a sqlite runtime decides from stored policies and audits to the
/// same database.
#[tokio::test]
async fn sqlite_runtime_records_queryable_audits() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir);
    let runtime = runtime(&config);
    seed(&runtime);
    let audit_log = runtime.audit_log().unwrap();

    let request = AccessRequest::new("C1", "drp", ["nationalId"]);
    let outcome = runtime.gate().exchange(&request, &reference_downstream()).await.unwrap();
    assert!(matches!(outcome.disclosure, Disclosure::Granted { .. }));
    assert!(outcome.report.correlation_id.as_str().starts_with("rt-"));
    runtime.shutdown().await;

    let records = audit_log.query_audit_logs(&AuditLogFilter::default()).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].correlation_id, outcome.report.correlation_id);
    assert_eq!(records[0].status, AuditStatus::Success);
}

/// Verifies allow-list grants written through the admin stores take effect.
#[tokio::test]
async fn admin_allow_list_grant_changes_next_decision() {
    let dir = TempDir::new().unwrap();
    let runtime = runtime(&sqlite_config(&dir));
    seed(&runtime);
    let request = AccessRequest::new("C2", "drp", ["income"]);

    let before = runtime.gate().decide(&request).unwrap();
    let grants = grant_allow_list(
        runtime.stores().policies.as_ref(),
        &[FieldName::new("income")],
        &ConsumerId::new("C2"),
        &GrantDuration::parse("P30D").unwrap(),
        before_expiry(),
    )
    .unwrap();
    let after = runtime.gate().decide(&request).unwrap();

    assert!(before.is_denied());
    assert!(!after.is_denied());
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].expiry_time, ts("2024-07-01T00:00:00Z"));
    runtime.shutdown().await;
}

/// Verifies the disclosure mode flows from configuration into the gate.
#[tokio::test]
async fn configured_disclosure_mode_reaches_gate() {
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    config.gate.disclosure = DisclosureMode::AllowedOnly;
    let runtime = runtime(&config);

    assert_eq!(runtime.gate().disclosure_mode(), DisclosureMode::AllowedOnly);
    assert!(runtime.audit_log().is_none());
    runtime.shutdown().await;
}

/// Verifies invalid configuration is refused before anything is opened.
#[tokio::test]
async fn invalid_configuration_is_refused() {
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    config.audit.sink = AuditSinkType::Sqlite;

    let result = GateRuntime::from_config(&config, Arc::new(NoopMetrics));

    assert!(matches!(result, Err(RuntimeError::Config(_))));
}

/// Verifies a separate sqlite audit database can sit beside a memory store.
#[tokio::test]
async fn sqlite_audit_sink_with_memory_store() {
    let dir = TempDir::new().unwrap();
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    config.audit.sink = AuditSinkType::Sqlite;
    config.audit.path = Some(dir.path().join("audit.db"));
    config.audit.monitor.monitor_type = AuditMonitorType::File;
    config.audit.monitor.path = Some(dir.path().join("monitor.jsonl"));
    let runtime = runtime(&config);
    seed(&runtime);
    let audit_log = runtime.audit_log().unwrap();

    let request = AccessRequest::new("C2", "drp", ["income"]);
    runtime.gate().decide(&request).unwrap();
    runtime.shutdown().await;

    let filter = AuditLogFilter {
        consumer_id: Some(ConsumerId::new("C2")),
        status: Some(AuditStatus::Failure),
        since: Some(ts("2024-01-01T00:00:00Z")),
        ..AuditLogFilter::default()
    };
    assert_eq!(audit_log.query_audit_logs(&filter).unwrap().len(), 1);
}
