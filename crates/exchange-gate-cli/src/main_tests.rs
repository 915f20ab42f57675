// crates/exchange-gate-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for input limits, store overrides, and filters.
// Purpose: Ensure CLI helpers fail closed on bad input.
// Dependencies: exchange-gate-cli main helpers
// ============================================================================

//! ## Overview
//! Validates `read_bytes_with_limit`, the store path override, and audit
//! filter parsing.
//!
//! Security posture: CLI inputs are untrusted; size limits must fail closed.

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

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use exchange_gate_core::AuditStatus;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::Timestamp;

use super::AuditQueryCommand;
use super::ExchangeGateConfig;
use super::OutputFormat;
use super::ReadLimitError;
use super::StatusArg;
use super::StoreLocationArgs;
use super::StoreType;
use super::apply_store_path_override;
use super::build_audit_filter;
use super::read_bytes_with_limit;

// ============================================================================
// SECTION: Helpers
// ============================================================================

fn temp_file(label: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).expect("clock drift").as_nanos();
    let mut path = std::env::temp_dir();
    path.push(format!("exchange-gate-cli-{label}-{nanos}.bin"));
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_file(path);
}

fn query_command() -> AuditQueryCommand {
    AuditQueryCommand {
        location: StoreLocationArgs {
            config: None,
            store_path: None,
        },
        consumer: None,
        provider: None,
        status: None,
        since: None,
        until: None,
        limit: None,
        format: OutputFormat::Json,
    }
}

// ============================================================================
// SECTION: Read Limits
// ============================================================================

#[test]
fn read_bytes_with_limit_accepts_small_files() {
    let path = temp_file("small");
    fs::write(&path, b"[]").unwrap();
    let bytes = read_bytes_with_limit(&path, 16).unwrap();
    assert_eq!(bytes, b"[]");
    cleanup(&path);
}

#[test]
fn read_bytes_with_limit_rejects_oversized_files() {
    let path = temp_file("large");
    fs::write(&path, vec![b'a'; 32]).unwrap();
    let result = read_bytes_with_limit(&path, 16);
    assert!(matches!(
        result,
        Err(ReadLimitError::TooLarge {
            size: 32,
            limit: 16
        })
    ));
    cleanup(&path);
}

#[test]
fn read_bytes_with_limit_reports_missing_files() {
    let path = temp_file("missing");
    assert!(matches!(read_bytes_with_limit(&path, 16), Err(ReadLimitError::Io(_))));
}

// ============================================================================
// SECTION: Store Override
// ============================================================================

#[test]
fn store_path_override_switches_to_sqlite() {
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    assert_eq!(config.store.store_type, StoreType::Memory);
    apply_store_path_override(&mut config, Some(Path::new("/tmp/exchange.db")));
    assert_eq!(config.store.store_type, StoreType::Sqlite);
    assert_eq!(config.store.path.as_deref(), Some(Path::new("/tmp/exchange.db")));
}

#[test]
fn store_path_override_absent_keeps_config() {
    let mut config = ExchangeGateConfig::from_toml_str("").unwrap();
    apply_store_path_override(&mut config, None);
    assert_eq!(config.store.store_type, StoreType::Memory);
    assert!(config.store.path.is_none());
}

// ============================================================================
// SECTION: Audit Filters
// ============================================================================

#[test]
fn audit_filter_maps_arguments() {
    let mut command = query_command();
    command.consumer = Some("C2".to_string());
    command.status = Some(StatusArg::Failure);
    command.since = Some("2024-01-01T00:00:00Z".to_string());
    command.limit = Some(5);

    let filter = build_audit_filter(&command).unwrap();

    assert_eq!(filter.consumer_id, Some(ConsumerId::new("C2")));
    assert_eq!(filter.status, Some(AuditStatus::Failure));
    assert_eq!(filter.since, Some(Timestamp::parse_rfc3339("2024-01-01T00:00:00Z").unwrap()));
    assert!(filter.until.is_none());
    assert_eq!(filter.limit, Some(5));
}

#[test]
fn audit_filter_rejects_bad_timestamps() {
    let mut command = query_command();
    command.until = Some("yesterday".to_string());
    let err = build_audit_filter(&command).unwrap_err();
    assert!(err.to_string().contains("--until"));
}
