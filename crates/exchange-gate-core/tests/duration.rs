// crates/exchange-gate-core/tests/duration.rs
// ============================================================================
// Module: Grant Duration Tests
// Description: ISO 8601 parsing and calendar expiry arithmetic.
// ============================================================================
//! ## Overview
//! Validates the accepted duration forms and how expiry instants are derived.

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

use exchange_gate_core::DurationError;
use exchange_gate_core::GrantDuration;
use exchange_gate_core::Timestamp;
use exchange_gate_core::parse_iso8601_duration;
use time::Duration;

fn ts(input: &str) -> Timestamp {
    Timestamp::parse_rfc3339(input).unwrap()
}

// ============================================================================
// SECTION: ISO 8601
// ============================================================================

/// Verifies accepted ISO 8601 forms and their fixed lengths.
#[test]
fn iso_durations_parse_with_fixed_units() {
    let cases = [
        ("P5D", Duration::days(5)),
        ("PT2H30M", Duration::hours(2) + Duration::minutes(30)),
        ("PT30S", Duration::seconds(30)),
        ("P1M", Duration::days(30)),
        ("P1Y", Duration::days(365)),
        (
            "P1Y2M3DT4H5M6S",
            Duration::days(365 + 60 + 3)
                + Duration::hours(4)
                + Duration::minutes(5)
                + Duration::seconds(6),
        ),
        ("PT1.5S", Duration::milliseconds(1_500)),
    ];
    for (input, expected) in cases {
        assert_eq!(parse_iso8601_duration(input).unwrap(), expected, "{input}");
    }
}

/// Verifies malformed ISO 8601 input is rejected.
#[test]
fn malformed_iso_durations_are_rejected() {
    for input in ["", "P", "PT", "1D", "PXYZ", "P1D2Y", "P1H", "PT1D", "P-1D", "PT1.S", "P1.5D"] {
        assert!(
            matches!(parse_iso8601_duration(input), Err(DurationError::Invalid(_))),
            "{input} should be rejected"
        );
    }
}

// ============================================================================
// SECTION: Grant Durations
// ============================================================================

/// Verifies named and legacy duration labels.
#[test]
fn grant_duration_labels() {
    assert_eq!(GrantDuration::parse("one_month").unwrap(), GrantDuration::OneMonth);
    assert_eq!(GrantDuration::parse("30d").unwrap(), GrantDuration::OneMonth);
    assert_eq!(GrantDuration::parse("one_year").unwrap(), GrantDuration::OneYear);
    assert_eq!(GrantDuration::parse("365d").unwrap(), GrantDuration::OneYear);
    assert_eq!(GrantDuration::parse("").unwrap(), GrantDuration::Fixed(Duration::days(30)));
    assert!(GrantDuration::parse("forever").is_err());
}

/// Verifies calendar months clamp to the end of shorter months.
#[test]
fn calendar_months_clamp_to_month_end() {
    let month = GrantDuration::OneMonth;
    assert_eq!(
        month.expiry_from(ts("2023-01-31T12:00:00Z")).unwrap(),
        ts("2023-02-28T12:00:00Z")
    );
    assert_eq!(
        month.expiry_from(ts("2024-12-15T00:00:00Z")).unwrap(),
        ts("2025-01-15T00:00:00Z")
    );
    assert_eq!(
        GrantDuration::OneYear.expiry_from(ts("2024-02-29T00:00:00Z")).unwrap(),
        ts("2025-02-28T00:00:00Z")
    );
}

/// Verifies fixed durations add exact lengths.
#[test]
fn fixed_durations_add_exact_lengths() {
    let duration = GrantDuration::parse("P1M").unwrap();
    assert_eq!(
        duration.expiry_from(ts("2024-01-31T00:00:00Z")).unwrap(),
        ts("2024-03-01T00:00:00Z")
    );
}

/// Verifies durations deserialize from their string forms.
#[test]
fn grant_duration_deserializes_from_strings() {
    let parsed: Vec<GrantDuration> =
        serde_json::from_str(r#"["one_month", "365d", "PT1H"]"#).unwrap();
    assert_eq!(
        parsed,
        vec![GrantDuration::OneMonth, GrantDuration::OneYear, GrantDuration::Fixed(Duration::hours(1))]
    );
}
