// crates/exchange-gate-service/src/correlation.rs
// ============================================================================
// Module: Correlation Identifiers
// Description: Generation of request correlation IDs and trace sanitization.
// Purpose: Give every request a unique audit key and keep client input safe.
// Dependencies: exchange-gate-core, rand
// ============================================================================

//! ## Overview
//! Every request receives a server-issued correlation identifier built from
//! a boot-scoped random seed plus a monotonic counter, so identifiers are
//! unique within the process and unlikely to collide across restarts.
//! Client-supplied trace identifiers are untrusted: they are sanitized to
//! HTTP token characters and recorded next to, never instead of, the
//! server identifier.

use std::fmt;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use exchange_gate_core::CorrelationId;
use rand::RngCore;
use rand::rngs::OsRng;

/// Prefix used when none is configured.
pub const DEFAULT_CORRELATION_PREFIX: &str = "xg";
/// Maximum allowed length for client trace identifiers.
pub const MAX_CLIENT_TRACE_ID_LENGTH: usize = 128;

/// Typed rejection reason for invalid client trace IDs.
///
/// # Invariants
/// - Variants are stable for audit labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceIdRejection {
    /// Input was empty after trimming.
    EmptyAfterTrim,
    /// Input exceeded the maximum length.
    TooLong,
    /// Input contained whitespace after trimming.
    ContainsWhitespace,
    /// Input contained control characters after trimming.
    ContainsControlChar,
    /// Input contained non-ASCII characters.
    NonAscii,
    /// Input contained disallowed ASCII characters.
    ContainsDisallowedChar,
}

impl TraceIdRejection {
    /// Returns a stable label for this rejection reason.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::EmptyAfterTrim => "empty_after_trim",
            Self::TooLong => "too_long",
            Self::ContainsWhitespace => "contains_whitespace",
            Self::ContainsControlChar => "contains_control_char",
            Self::NonAscii => "non_ascii",
            Self::ContainsDisallowedChar => "contains_disallowed_char",
        }
    }
}

impl fmt::Display for TraceIdRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Boot-scoped correlation ID generator.
///
/// # Invariants
/// - Issued identifiers are unique within the process lifetime.
#[derive(Debug)]
pub struct CorrelationIdGenerator {
    /// Prefix included in every generated correlation ID.
    prefix: String,
    /// Boot-scoped random identifier for entropy.
    boot_id: u64,
    /// Monotonic counter for IDs issued in this process.
    counter: AtomicU64,
}

impl CorrelationIdGenerator {
    /// Creates a new generator with the given prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let mut bytes = [0u8; 8];
        OsRng.fill_bytes(&mut bytes);
        Self::with_boot_id(prefix, u64::from_be_bytes(bytes))
    }

    /// Creates a generator with a fixed boot identifier.
    #[must_use]
    pub fn with_boot_id(prefix: impl Into<String>, boot_id: u64) -> Self {
        Self {
            prefix: prefix.into(),
            boot_id,
            counter: AtomicU64::new(1),
        }
    }

    /// Issues a new correlation ID.
    #[must_use]
    pub fn issue(&self) -> CorrelationId {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        CorrelationId::new(format!("{}-{:016x}-{:016x}", self.prefix, self.boot_id, seq))
    }
}

impl Default for CorrelationIdGenerator {
    fn default() -> Self {
        Self::new(DEFAULT_CORRELATION_PREFIX)
    }
}

/// Sanitizes a client trace ID using strict token rules.
///
/// Returns `Ok(None)` when no value is provided.
///
/// # Errors
/// Returns [`TraceIdRejection`] when the value is empty, too long, or
/// contains disallowed characters.
pub fn sanitize_client_trace_id(value: Option<&str>) -> Result<Option<String>, TraceIdRejection> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(TraceIdRejection::EmptyAfterTrim);
    }
    if trimmed.len() > MAX_CLIENT_TRACE_ID_LENGTH {
        return Err(TraceIdRejection::TooLong);
    }
    for ch in trimmed.chars() {
        if !ch.is_ascii() {
            return Err(TraceIdRejection::NonAscii);
        }
        if ch.is_ascii_whitespace() {
            return Err(TraceIdRejection::ContainsWhitespace);
        }
        if ch.is_control() {
            return Err(TraceIdRejection::ContainsControlChar);
        }
        if !is_tchar(ch) {
            return Err(TraceIdRejection::ContainsDisallowedChar);
        }
    }
    Ok(Some(trimmed.to_string()))
}

/// Returns true when the character is a valid HTTP token character.
const fn is_tchar(ch: char) -> bool {
    ch.is_ascii_alphanumeric()
        || matches!(
            ch,
            '!' | '#'
                | '$'
                | '%'
                | '&'
                | '\''
                | '*'
                | '+'
                | '-'
                | '.'
                | '^'
                | '_'
                | '`'
                | '|'
                | '~'
        )
}

// ============================================================================
// SECTION: Tests
// ============================================================================
