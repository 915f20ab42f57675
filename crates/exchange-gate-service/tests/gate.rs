// crates/exchange-gate-service/tests/gate.rs
// ============================================================================
// Module: Access Gate Tests
// Description: Decisions, disclosure composition, and audit exit paths.
// ============================================================================
//! ## Overview
//! Drives the gate through the reference consumer scenarios, both disclosure
//! modes, and every way a request can end, and checks that each request
//! produces exactly one audit record whose status matches the result.

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
use std::time::Duration;

use exchange_gate_audit::AuditMonitorEventKind;
use exchange_gate_audit::InMemoryAuditSink;
use exchange_gate_audit::scope::DROPPED_DETAIL;
use exchange_gate_config::DisclosureMode;
use exchange_gate_core::AccessOutcome;
use exchange_gate_core::AuditStatus;
use exchange_gate_core::CallerMetadata;
use exchange_gate_core::DenyReason;
use exchange_gate_core::FieldPolicy;
use exchange_gate_core::InMemoryGrantStore;
use exchange_gate_core::InMemoryPolicyStore;
use exchange_gate_service::AccessRequest;
use exchange_gate_service::Disclosure;
use exchange_gate_service::GateError;
use exchange_gate_service::MAX_REQUEST_FIELDS;
use serde_json::json;

use crate::common::DownAuditSink;
use crate::common::FailingDownstream;
use crate::common::HangingDownstream;
use crate::common::Harness;
use crate::common::RecordingDownstream;
use crate::common::UnavailablePolicyStore;
use crate::common::after_expiry;
use crate::common::assert_failure;
use crate::common::field;
use crate::common::reference_downstream;
use crate::common::reference_grants;
use crate::common::reference_policies;
use crate::common::single;

// ============================================================================
// SECTION: Reference Scenarios
// ============================================================================

/// Verifies `C1` reads its allow-listed field before the entry expires.
#[tokio::test]
async fn allow_listed_consumer_receives_field_before_expiry() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let outcome = harness.gate.exchange(&request, &reference_downstream()).await.unwrap();

    assert_eq!(outcome.report.decisions[0].outcome, AccessOutcome::Allow);
    assert_eq!(
        outcome.disclosure,
        Disclosure::Granted {
            payload: json!({"nationalId": "199001011234"}),
            withheld: Vec::new(),
        }
    );
    let correlation_id = outcome.report.correlation_id.clone();
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_eq!(record.correlation_id, correlation_id);
    assert_eq!(record.status, AuditStatus::Success);
    assert!(record.failure_reason.is_none());
    assert!(record.response_hash.is_some());
    assert_eq!(record.requested_fields, vec![field("nationalId")]);
}

/// Verifies `C1` is denied as expired once the entry lapses.
#[tokio::test]
async fn expired_allow_list_entry_denies_with_expired_reason() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    harness.clock.set(after_expiry());
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let outcome = harness.gate.exchange(&request, &reference_downstream()).await.unwrap();

    assert_eq!(outcome.disclosure, Disclosure::Denied);
    assert_eq!(outcome.report.decisions[0].outcome, AccessOutcome::Deny(DenyReason::Expired));
    assert_eq!(outcome.report.summary.expired_fields, vec![field("nationalId")]);
    assert!(outcome.report.summary.app_access_expired);
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "policy_denied");
    assert!(record.response_hash.is_none());
    assert_eq!(record.decisions[0].outcome.reason_code(), "expired");
}

/// Verifies a restricted field without an allow-list entry is denied.
#[tokio::test]
async fn restricted_field_without_entry_is_denied() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C2", "drp", ["income"]);

    let report = harness.gate.decide(&request).unwrap();

    assert!(report.is_denied());
    assert_eq!(report.decisions[0].outcome, AccessOutcome::Deny(DenyReason::RestrictedNoEntry));
    assert_eq!(report.summary.unauthorized_fields, vec![field("income")]);
    assert!(!report.summary.app_authorized);
    let (records, _) = harness.finish().await;
    assert_failure(single(&records), "policy_denied");
}

/// Verifies a public field is allowed with an empty allow-list.
#[tokio::test]
async fn public_field_is_allowed_with_empty_allow_list() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C3", "drp", ["publicHoliday"]);

    let report = harness.gate.decide(&request).unwrap();

    assert!(!report.is_denied());
    assert_eq!(report.decisions[0].outcome.reason_code(), "ok");
    assert_eq!(report.cleared_fields, vec![field("publicHoliday")]);
    let (records, _) = harness.finish().await;
    assert_eq!(single(&records).status, AuditStatus::Success);
}

/// Verifies a field absent from the consumer grant is denied as not granted.
#[tokio::test]
async fn field_outside_grant_is_not_granted() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C3", "drp", ["nationalId"]);

    let report = harness.gate.decide(&request).unwrap();

    assert_eq!(report.decisions[0].outcome, AccessOutcome::Deny(DenyReason::NotGranted));
    harness.finish().await;
}

// ============================================================================
// SECTION: Disclosure Modes
// ============================================================================

/// Verifies all-or-nothing denies a request with one denied field.
#[tokio::test]
async fn all_or_nothing_denies_mixed_request() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let downstream = RecordingDownstream::default();
    let request = AccessRequest::new("C1", "drp", ["nationalId", "income"]);

    let outcome = harness.gate.exchange(&request, &downstream).await.unwrap();

    assert_eq!(outcome.disclosure, Disclosure::Denied);
    assert_eq!(outcome.report.summary.allowed_fields, vec![field("nationalId")]);
    assert!(downstream.requests.lock().unwrap().is_empty());
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "policy_denied");
    assert_eq!(record.decisions.len(), 2);
}

/// Verifies allowed-only discloses the allowed subset and withholds the rest.
#[tokio::test]
async fn allowed_only_discloses_allowed_subset() {
    let harness = Harness::new(DisclosureMode::AllowedOnly);
    let downstream = RecordingDownstream::default();
    let request = AccessRequest::new("C1", "drp", ["nationalId", "income", "publicHoliday"]);

    let outcome = harness.gate.exchange(&request, &downstream).await.unwrap();

    assert_eq!(
        outcome.disclosure,
        Disclosure::Granted {
            payload: json!({"nationalId": "199001011234", "publicHoliday": "2024-12-25"}),
            withheld: vec![field("income")],
        }
    );
    let requests = downstream.requests.lock().unwrap().clone();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].fields, vec![field("nationalId"), field("publicHoliday")]);
    assert_eq!(requests[0].correlation_id, outcome.report.correlation_id);
    let (records, _) = harness.finish().await;
    assert_eq!(single(&records).status, AuditStatus::Success);
}

/// Verifies allowed-only still denies when nothing is allowed.
#[tokio::test]
async fn allowed_only_denies_when_nothing_allowed() {
    let harness = Harness::new(DisclosureMode::AllowedOnly);
    let request = AccessRequest::new("C2", "drp", ["income", "nationalId"]);

    let outcome = harness.gate.exchange(&request, &reference_downstream()).await.unwrap();

    assert_eq!(outcome.disclosure, Disclosure::Denied);
    let (records, _) = harness.finish().await;
    assert_failure(single(&records), "policy_denied");
}

/// Verifies consent flags are reported without gating the decision.
#[tokio::test]
async fn consent_flag_is_informational() {
    let policies = InMemoryPolicyStore::with_policies(vec![
        FieldPolicy::public("income", "tax-office", "drp")
            .with_consent_required(true),
    ])
    .unwrap();
    let grants = InMemoryGrantStore::with_grants(reference_grants()).unwrap();
    let harness =
        Harness::with_stores(Arc::new(policies), Arc::new(grants), DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C2", "drp", ["income"]);

    let report = harness.gate.decide(&request).unwrap();

    assert!(report.decisions[0].is_allowed());
    assert!(report.decisions[0].consent_required);
    assert_eq!(report.summary.consent_required_fields, vec![field("income")]);
    assert!(report.summary.app_requires_owner_consent);
    harness.finish().await;
}

// ============================================================================
// SECTION: Failure Paths
// ============================================================================

/// Verifies an empty field list is rejected and audited once.
#[tokio::test]
async fn empty_field_list_is_invalid_request() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C1", "drp", Vec::<String>::new());

    let err = harness.gate.exchange(&request, &reference_downstream()).await.unwrap_err();

    assert!(matches!(err, GateError::InvalidRequest { .. }));
    assert!(!err.is_retryable());
    let correlation_id = err.correlation_id().clone();
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_eq!(record.correlation_id, correlation_id);
    assert_failure(record, "invalid_request");
    assert!(record.decisions.is_empty());
}

/// Verifies duplicate and oversized field lists are rejected.
#[tokio::test]
async fn duplicate_and_oversized_field_lists_are_rejected() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let duplicate = AccessRequest::new("C1", "drp", ["income", "income"]);
    let oversized =
        AccessRequest::new("C1", "drp", (0 ..= MAX_REQUEST_FIELDS).map(|i| format!("f{i}")));

    let duplicate_err = harness.gate.decide(&duplicate).unwrap_err();
    let oversized_err = harness.gate.decide(&oversized).unwrap_err();

    assert!(duplicate_err.to_string().contains("more than once"));
    assert!(matches!(oversized_err, GateError::InvalidRequest { .. }));
    let (records, _) = harness.finish().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.status == AuditStatus::Failure));
}

/// Verifies a store outage is a retryable error, never a denial.
#[tokio::test]
async fn store_outage_fails_closed_with_store_error() {
    let grants = InMemoryGrantStore::with_grants(reference_grants()).unwrap();
    let harness = Harness::with_stores(
        Arc::new(UnavailablePolicyStore),
        Arc::new(grants),
        DisclosureMode::AllOrNothing,
    );
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let err = harness.gate.exchange(&request, &reference_downstream()).await.unwrap_err();

    assert!(matches!(err, GateError::Store { .. }));
    assert!(err.is_retryable());
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "store_error");
    assert!(record.failure_detail.as_deref().unwrap().contains("policy database offline"));
}

/// Verifies a provider failure after an allow is audited as downstream error.
#[tokio::test]
async fn provider_failure_is_audited_as_downstream_error() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let err = harness.gate.exchange(&request, &FailingDownstream).await.unwrap_err();

    assert!(matches!(err, GateError::Downstream { .. }));
    assert!(err.is_retryable());
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "downstream_error");
    assert!(record.failure_detail.as_deref().unwrap().contains("connection refused"));
    assert_eq!(record.decisions.len(), 1);
}

/// Verifies abandoning an in-flight exchange records a cancelled failure.
#[tokio::test]
async fn dropped_exchange_records_cancellation() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let result = tokio::time::timeout(
        Duration::from_millis(50),
        harness.gate.exchange(&request, &HangingDownstream),
    )
    .await;

    assert!(result.is_err());
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "cancelled");
    assert_eq!(record.failure_detail.as_deref(), Some(DROPPED_DETAIL));
    assert_eq!(record.decisions.len(), 1);
}

/// Verifies lost audit deliveries never change the returned verdict.
#[tokio::test]
async fn audit_delivery_failure_does_not_change_verdict() {
    let policies =
        InMemoryPolicyStore::with_policies(reference_policies())
            .unwrap();
    let grants = InMemoryGrantStore::with_grants(reference_grants()).unwrap();
    let harness = Harness::with_sink(
        Arc::new(policies),
        Arc::new(grants),
        DisclosureMode::AllOrNothing,
        Arc::new(DownAuditSink),
        InMemoryAuditSink::new(),
    );
    let request = AccessRequest::new("C1", "drp", ["nationalId"]);

    let outcome = harness.gate.exchange(&request, &reference_downstream()).await.unwrap();

    assert!(matches!(outcome.disclosure, Disclosure::Granted { .. }));
    let (records, monitor) = harness.finish().await;
    assert!(records.is_empty());
    let failed = monitor.events_of(AuditMonitorEventKind::AuditDeliveryFailed);
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].correlation_id, outcome.report.correlation_id);
}

// ============================================================================
// SECTION: Caller Metadata
// ============================================================================

/// Verifies a valid client trace identifier is trimmed and recorded.
#[tokio::test]
async fn client_trace_id_is_sanitized_and_recorded() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C3", "drp", ["publicHoliday"]).with_caller(CallerMetadata {
        user_agent: Some("agency-portal/2.1".to_string()),
        remote_addr: Some("10.0.0.7".to_string()),
        client_trace_id: Some("  trace-42  ".to_string()),
    });

    let report = harness.gate.decide(&request).unwrap();

    assert!(report.correlation_id.as_str().starts_with("test-"));
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_eq!(record.caller.client_trace_id.as_deref(), Some("trace-42"));
    assert_eq!(record.caller.user_agent.as_deref(), Some("agency-portal/2.1"));
    assert_ne!(record.correlation_id.as_str(), "trace-42");
}

/// Verifies a malformed client trace identifier rejects the request.
#[tokio::test]
async fn malformed_client_trace_id_is_rejected() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let request = AccessRequest::new("C3", "drp", ["publicHoliday"]).with_caller(CallerMetadata {
        client_trace_id: Some("bad trace".to_string()),
        ..CallerMetadata::default()
    });

    let err = harness.gate.decide(&request).unwrap_err();

    assert!(err.to_string().contains("contains_whitespace"));
    let (records, _) = harness.finish().await;
    let record = single(&records);
    assert_failure(record, "invalid_request");
    assert!(record.caller.client_trace_id.is_none());
}

/// Verifies every request receives a distinct correlation identifier.
#[tokio::test]
async fn each_request_is_audited_under_its_own_correlation_id() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let allowed = AccessRequest::new("C3", "drp", ["publicHoliday"]);
    let denied = AccessRequest::new("C2", "drp", ["income"]);

    let first = harness.gate.decide(&allowed).unwrap();
    let second = harness.gate.decide(&denied).unwrap();

    assert_ne!(first.correlation_id, second.correlation_id);
    let (records, _) = harness.finish().await;
    assert_eq!(records.len(), 2);
    assert!(records.iter().any(|record| record.correlation_id == first.correlation_id));
    assert!(records.iter().any(|record| record.correlation_id == second.correlation_id));
}

// ============================================================================
// SECTION: Telemetry
// ============================================================================

/// Verifies one decision metric per field and one latency sample per request.
#[tokio::test]
async fn decisions_are_counted_per_field() {
    let harness = Harness::new(DisclosureMode::AllOrNothing);
    let metrics = Arc::clone(&harness.metrics);
    let request = AccessRequest::new("C1", "drp", ["nationalId", "income"]);

    harness.gate.decide(&request).unwrap();

    let events = metrics.decisions();
    assert_eq!(events.len(), 2);
    assert!(events[0].allowed);
    assert_eq!(events[1].reason, "restricted_no_entry");
    assert_eq!(metrics.latency_samples(), 1);
    harness.finish().await;
}
