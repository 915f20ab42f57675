// crates/exchange-gate-core/tests/evaluator_properties.rs
// ============================================================================
// Module: Access Evaluator Property-Based Tests
// Description: Property tests for decision rule invariants.
// Purpose: Check reason codes hold across arbitrary allow-lists and instants.
// ============================================================================

//! Property-based tests for access evaluator invariants.

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
    reason = "Test-only assertions and helpers are permitted."
)]

use exchange_gate_core::AccessOutcome;
use exchange_gate_core::AllowList;
use exchange_gate_core::AllowListEntry;
use exchange_gate_core::ConsumerGrant;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::DenyReason;
use exchange_gate_core::FieldName;
use exchange_gate_core::FieldPolicy;
use exchange_gate_core::ProviderId;
use exchange_gate_core::Timestamp;
use exchange_gate_core::evaluate_field;
use proptest::prelude::*;

const EPOCH_2020_MS: i64 = 1_577_836_800_000;
const TEN_YEARS_MS: i64 = 10 * 365 * 24 * 3_600 * 1_000;

fn instant() -> impl Strategy<Value = Timestamp> {
    (0 .. TEN_YEARS_MS).prop_map(|offset| Timestamp::from_unix_millis(EPOCH_2020_MS + offset).unwrap())
}

fn allow_list() -> impl Strategy<Value = AllowList> {
    prop::collection::vec((prop::sample::select(vec!["C1", "C2", "C3"]), instant()), 0 .. 6)
        .prop_map(|entries| {
            AllowList::from_entries(
                entries
                    .into_iter()
                    .map(|(consumer, expiry)| AllowListEntry {
                        consumer_id: ConsumerId::new(consumer),
                        expiry_time: expiry,
                        created_at: Timestamp::from_unix_millis(EPOCH_2020_MS).unwrap(),
                        updated_at: None,
                    })
                    .collect(),
            )
        })
}

fn decide(
    grant: &ConsumerGrant,
    policy: &FieldPolicy,
    consumer: &ConsumerId,
    now: Timestamp,
) -> AccessOutcome {
    evaluate_field(
        Some(grant),
        Some(policy),
        consumer,
        &ProviderId::new("p"),
        &FieldName::new("f"),
        now,
    )
    .outcome
}

proptest! {
    #[test]
    fn public_granted_fields_always_allow(list in allow_list(), now in instant(), consent in any::<bool>()) {
        let policy = FieldPolicy::public("f", "o", "p").with_consent_required(consent).with_allow_list(list);
        let grant = ConsumerGrant::new("C1", ["f"]);
        prop_assert_eq!(decide(&grant, &policy, &ConsumerId::new("C1"), now), AccessOutcome::Allow);
    }

    #[test]
    fn restricted_fields_follow_entry_expiry(list in allow_list(), now in instant()) {
        let consumer = ConsumerId::new("C1");
        let policy = FieldPolicy::restricted("f", "o", "p").with_allow_list(list.clone());
        let grant = ConsumerGrant::new("C1", ["f"]);
        let mine: Vec<&AllowListEntry> =
            list.entries().iter().filter(|entry| entry.consumer_id == consumer).collect();
        let expected = if mine.is_empty() {
            AccessOutcome::Deny(DenyReason::RestrictedNoEntry)
        } else if mine.iter().any(|entry| entry.expiry_time > now) {
            AccessOutcome::Allow
        } else {
            AccessOutcome::Deny(DenyReason::Expired)
        };
        prop_assert_eq!(decide(&grant, &policy, &consumer, now), expected);
    }

    #[test]
    fn ungranted_fields_always_deny(list in allow_list(), now in instant(), public in any::<bool>()) {
        let policy = if public {
            FieldPolicy::public("f", "o", "p")
        } else {
            FieldPolicy::restricted("f", "o", "p")
        }
        .with_allow_list(list);
        let grant = ConsumerGrant::new("C1", ["other"]);
        prop_assert_eq!(
            decide(&grant, &policy, &ConsumerId::new("C1"), now),
            AccessOutcome::Deny(DenyReason::NotGranted)
        );
    }

    #[test]
    fn evaluation_is_deterministic(list in allow_list(), now in instant()) {
        let policy = FieldPolicy::restricted("f", "o", "p").with_allow_list(list);
        let grant = ConsumerGrant::new("C2", ["f"]);
        let consumer = ConsumerId::new("C2");
        let snapshot = policy.clone();
        let first = decide(&grant, &policy, &consumer, now);
        let second = decide(&grant, &policy, &consumer, now);
        prop_assert_eq!(first, second);
        prop_assert_eq!(policy, snapshot);
    }
}
