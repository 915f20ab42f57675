// crates/exchange-gate-core/src/core/redaction.rs
// ============================================================================
// Module: Exchange Gate Payload Capture
// Description: Controls how much of a payload an audit record retains.
// Purpose: Keep personal identifiers out of audit storage by default.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! Exchange payloads routinely carry citizen identifiers. Audit records always
//! keep a digest of the full payload; [`PayloadCapture`] decides whether the
//! body itself is stored and, if so, whether identifier-shaped keys are
//! stripped first. Keys ending in `_id` (any case) are treated as identifiers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Capture Mode
// ============================================================================

/// Key suffix treated as a personal identifier.
const IDENTIFIER_SUFFIX: &str = "_id";

/// Payload retention mode for audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadCapture {
    /// Store digests only.
    HashOnly,
    /// Store payloads with identifier keys removed.
    #[default]
    Redacted,
    /// Store payloads verbatim.
    Raw,
}

impl PayloadCapture {
    /// Returns the stable label recorded on every audit record.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::HashOnly => "hash_only",
            Self::Redacted => "redacted",
            Self::Raw => "raw",
        }
    }

    /// Applies the mode to a payload.
    #[must_use]
    pub fn capture(self, payload: &Value) -> Option<Value> {
        match self {
            Self::HashOnly => None,
            Self::Redacted => Some(redact_identifiers(payload)),
            Self::Raw => Some(payload.clone()),
        }
    }
}

// ============================================================================
// SECTION: Redaction
// ============================================================================

/// Returns a copy of `payload` with identifier keys removed at every depth.
#[must_use]
pub fn redact_identifiers(payload: &Value) -> Value {
    match payload {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, value) in map {
                if is_identifier_key(key) {
                    continue;
                }
                out.insert(key.clone(), redact_identifiers(value));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_identifiers).collect()),
        other => other.clone(),
    }
}

/// Returns true for keys that name an identifier.
fn is_identifier_key(key: &str) -> bool {
    key.len() >= IDENTIFIER_SUFFIX.len()
        && key
            .get(key.len() - IDENTIFIER_SUFFIX.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(IDENTIFIER_SUFFIX))
}
