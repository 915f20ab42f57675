// crates/exchange-gate-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic example for docs and tooling.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for Exchange Gate configuration. The output is static
//! and must always pass validation.

/// Returns a canonical example `exchange-gate.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[store]
type = "sqlite"
path = "exchange-gate.db"
journal_mode = "wal"
sync_mode = "full"
busy_timeout_ms = 5000
read_pool_size = 4

[audit]
sink = "http"
endpoint = "https://audit.example.gov"
# token = "..."
connect_timeout_ms = 2000
request_timeout_ms = 5000
payload_capture = "redacted"
max_in_flight = 64
max_queued = 1024

[audit.retry]
max_attempts = 3
attempt_timeout_ms = 5000
backoff = "exponential"
initial_delay_ms = 100
max_delay_ms = 2000

[audit.monitor]
type = "stderr"

[gate]
disclosure = "all_or_nothing"
correlation_prefix = "xg"
"#,
    )
}
