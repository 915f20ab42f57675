//! Validation tests for exchange-gate-config.
// crates/exchange-gate-config/tests/config_validation.rs
// =============================================================================
// Module: Config Validation Tests
// Description: Validate store, audit, and gate configuration constraints.
// Purpose: Ensure invalid configuration fails closed with a clear message.
// =============================================================================

use std::path::PathBuf;
use std::time::Duration;

use exchange_gate_audit::Backoff;
use exchange_gate_config::AuditMonitorType;
use exchange_gate_config::AuditSinkType;
use exchange_gate_config::BackoffKind;
use exchange_gate_config::DisclosureMode;
use exchange_gate_config::ExchangeGateConfig;
use exchange_gate_config::StoreType;
use exchange_gate_config::config_toml_example;
use exchange_gate_core::PayloadCapture;

mod common;

use common::TestResult;
use common::assert_invalid;

#[test]
fn empty_config_uses_defaults() -> TestResult {
    let config = common::minimal_config()?;
    config.validate().map_err(|err| err.to_string())?;
    if config.store.store_type != StoreType::Memory {
        return Err("default store should be memory".to_string());
    }
    if config.audit.sink != AuditSinkType::Stderr {
        return Err("default audit sink should be stderr".to_string());
    }
    if config.audit.payload_capture != PayloadCapture::Redacted {
        return Err("default payload capture should be redacted".to_string());
    }
    if config.gate.disclosure != DisclosureMode::AllOrNothing {
        return Err("default disclosure should be all_or_nothing".to_string());
    }
    let retry = config.audit.retry.to_retry_policy();
    if retry.max_attempts != 3 || retry.attempt_timeout != Duration::from_secs(5) {
        return Err(format!("unexpected default retry policy: {retry:?}"));
    }
    Ok(())
}

#[test]
fn example_config_is_valid() -> TestResult {
    let config =
        ExchangeGateConfig::from_toml_str(&config_toml_example()).map_err(|err| err.to_string())?;
    if config.store.sqlite_config().is_none() {
        return Err("example should select the sqlite store".to_string());
    }
    if config.gate.correlation_prefix.as_deref() != Some("xg") {
        return Err("example prefix not parsed".to_string());
    }
    Ok(())
}

#[test]
fn unknown_fields_are_rejected() -> TestResult {
    match ExchangeGateConfig::from_toml_str("[audit]\nsinks = \"stderr\"\n") {
        Err(err) if err.to_string().contains("config parse error") => Ok(()),
        Err(err) => Err(format!("unexpected error: {err}")),
        Ok(_) => Err("unknown field accepted".to_string()),
    }
}

#[test]
fn none_audit_sink_is_not_accepted() -> TestResult {
    match ExchangeGateConfig::from_toml_str("[audit]\nsink = \"none\"\n") {
        Err(err) if err.to_string().contains("config parse error") => Ok(()),
        Err(err) => Err(format!("unexpected error: {err}")),
        Ok(_) => Err("none sink accepted".to_string()),
    }
}

#[test]
fn memory_store_rejects_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.path = Some(PathBuf::from("gate.db"));
    assert_invalid(config.validate(), "memory store must not set path")
}

#[test]
fn sqlite_store_requires_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.store_type = StoreType::Sqlite;
    assert_invalid(config.validate(), "sqlite store requires path")
}

#[test]
fn sqlite_store_rejects_empty_read_pool() -> TestResult {
    let mut config = common::minimal_config()?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(PathBuf::from("gate.db"));
    config.store.read_pool_size = 0;
    assert_invalid(config.validate(), "store.read_pool_size must be between")
}

#[test]
fn file_sink_requires_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::File;
    assert_invalid(config.validate(), "file audit sink requires path")
}

#[test]
fn sqlite_sink_requires_a_database() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::Sqlite;
    assert_invalid(config.validate(), "sqlite audit sink requires path or a sqlite store")?;
    config.store.store_type = StoreType::Sqlite;
    config.store.path = Some(PathBuf::from("gate.db"));
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn http_sink_requires_endpoint() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::Http;
    assert_invalid(config.validate(), "http audit sink requires endpoint")
}

#[test]
fn http_sink_rejects_plain_http_without_opt_in() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::Http;
    config.audit.endpoint = Some("http://audit.internal".to_string());
    assert_invalid(config.validate(), "audit.endpoint uses http:// without allow_http")?;
    config.audit.allow_http = true;
    config.validate().map_err(|err| err.to_string())
}

#[test]
fn http_sink_rejects_blank_token() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::Http;
    config.audit.endpoint = Some("https://audit.example.gov".to_string());
    config.audit.token = Some("   ".to_string());
    assert_invalid(config.validate(), "audit.token must be non-empty")
}

#[test]
fn http_sink_rejects_out_of_range_timeout() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.sink = AuditSinkType::Http;
    config.audit.endpoint = Some("https://audit.example.gov".to_string());
    config.audit.request_timeout_ms = 60_000;
    assert_invalid(config.validate(), "audit.request_timeout_ms must be between")
}

#[test]
fn retry_attempts_are_bounded() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.retry.max_attempts = 0;
    assert_invalid(config.validate(), "audit.retry.max_attempts must be between 1 and 20")?;
    config.audit.retry.max_attempts = 21;
    assert_invalid(config.validate(), "audit.retry.max_attempts must be between 1 and 20")
}

#[test]
fn retry_delays_must_be_ordered() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.retry.initial_delay_ms = 5_000;
    config.audit.retry.max_delay_ms = 1_000;
    assert_invalid(config.validate(), "initial_delay_ms must not exceed max_delay_ms")
}

#[test]
fn fixed_backoff_maps_to_fixed_delay() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.retry.backoff = BackoffKind::Fixed;
    config.audit.retry.initial_delay_ms = 250;
    let policy = config.audit.retry.to_retry_policy();
    match policy.backoff {
        Backoff::Fixed {
            delay,
        } if delay == Duration::from_millis(250) => Ok(()),
        other => Err(format!("unexpected backoff: {other:?}")),
    }
}

#[test]
fn max_in_flight_must_be_positive() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.max_in_flight = 0;
    assert_invalid(config.validate(), "audit.max_in_flight must be between")
}

#[test]
fn max_queued_is_bounded() -> TestResult {
    let mut config = common::minimal_config()?;
    if config.audit.max_queued != 1_024 {
        return Err(format!("unexpected default max_queued: {}", config.audit.max_queued));
    }
    config.audit.max_queued = 0;
    assert_invalid(config.validate(), "audit.max_queued must be between 1 and 65536")?;
    config.audit.max_queued = 65_537;
    assert_invalid(config.validate(), "audit.max_queued must be between 1 and 65536")
}

#[test]
fn file_monitor_requires_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.monitor.monitor_type = AuditMonitorType::File;
    assert_invalid(config.validate(), "file audit monitor requires path")
}

#[test]
fn discarding_audit_monitor_is_not_accepted() -> TestResult {
    match ExchangeGateConfig::from_toml_str("[audit.monitor]\ntype = \"none\"\n") {
        Err(err) if err.to_string().contains("config parse error") => Ok(()),
        Err(err) => Err(format!("unexpected error: {err}")),
        Ok(_) => Err("none monitor accepted".to_string()),
    }
}

#[test]
fn stderr_monitor_rejects_path() -> TestResult {
    let mut config = common::minimal_config()?;
    config.audit.monitor.path = Some(PathBuf::from("monitor.jsonl"));
    assert_invalid(config.validate(), "audit.monitor.path is only valid for the file monitor")
}

#[test]
fn correlation_prefix_rejects_separators() -> TestResult {
    let mut config = common::minimal_config()?;
    config.gate.correlation_prefix = Some("bad prefix".to_string());
    assert_invalid(config.validate(), "gate.correlation_prefix must be ascii alphanumeric")?;
    config.gate.correlation_prefix = Some(String::new());
    assert_invalid(config.validate(), "gate.correlation_prefix must be 1 to 32 characters")
}
