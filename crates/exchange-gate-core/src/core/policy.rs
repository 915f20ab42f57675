// crates/exchange-gate-core/src/core/policy.rs
// ============================================================================
// Module: Exchange Gate Policy Facts
// Description: Field policies, allow-lists, and consumer grants.
// Purpose: Model the persisted facts that field-level decisions are made from.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! A [`FieldPolicy`] describes a single provider field: who owns it, whether
//! it is public or restricted, and which consumers hold a time-bounded
//! allow-list entry. A [`ConsumerGrant`] lists the fields a consumer
//! application has been approved to request at all. Both are read through
//! store interfaces and carried in [`Versioned`] envelopes so writers can
//! replace them with optimistic concurrency.
//!
//! Invariants:
//! - A field is identified by its name alone; the provider attribute records
//!   ownership but does not scope the lookup.
//! - An allow-list holds at most one entry per consumer after [`AllowList::upsert`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::ConsumerId;
use crate::core::identifiers::FieldName;
use crate::core::identifiers::ProviderId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Access Control
// ============================================================================

/// Access control classification for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessControlType {
    /// Any consumer holding a grant for the field may read it.
    Public,
    /// Readers additionally need an unexpired allow-list entry.
    #[default]
    Restricted,
}

impl AccessControlType {
    /// Returns a stable label for logs and storage.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "public",
            Self::Restricted => "restricted",
        }
    }
}

// ============================================================================
// SECTION: Allow-Lists
// ============================================================================

/// Time-bounded permission for one consumer on one restricted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowListEntry {
    /// Consumer the entry applies to.
    pub consumer_id: ConsumerId,
    /// Instant at which the entry stops granting access.
    pub expiry_time: Timestamp,
    /// Instant the entry was first created.
    pub created_at: Timestamp,
    /// Instant the entry was last extended, if ever.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
}

impl AllowListEntry {
    /// Returns true when the entry still grants access at `now`.
    ///
    /// The expiry instant itself is already expired.
    #[must_use]
    pub fn is_active_at(&self, now: Timestamp) -> bool {
        now < self.expiry_time
    }
}

/// Result of looking up a consumer in an allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllowListMatch<'a> {
    /// An unexpired entry exists for the consumer.
    Active(&'a AllowListEntry),
    /// Only expired entries exist for the consumer.
    Expired(&'a AllowListEntry),
    /// No entry exists for the consumer.
    Absent,
}

/// Allow-list attached to a field policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllowList {
    /// Entries in insertion order.
    entries: Vec<AllowListEntry>,
}

impl AllowList {
    /// Creates an empty allow-list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Builds an allow-list from existing entries.
    #[must_use]
    pub const fn from_entries(entries: Vec<AllowListEntry>) -> Self {
        Self {
            entries,
        }
    }

    /// Returns the entries in insertion order.
    #[must_use]
    pub fn entries(&self) -> &[AllowListEntry] {
        &self.entries
    }

    /// Returns true when the allow-list has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the consumer at `now`.
    ///
    /// Any active entry wins over expired ones, so duplicate entries loaded
    /// from older data never turn an allow into a deny.
    #[must_use]
    pub fn lookup(&self, consumer_id: &ConsumerId, now: Timestamp) -> AllowListMatch<'_> {
        let mut expired = None;
        for entry in self.entries.iter().filter(|entry| &entry.consumer_id == consumer_id) {
            if entry.is_active_at(now) {
                return AllowListMatch::Active(entry);
            }
            expired.get_or_insert(entry);
        }
        expired.map_or(AllowListMatch::Absent, AllowListMatch::Expired)
    }

    /// Inserts or extends the entry for a consumer.
    ///
    /// An existing entry keeps its `created_at` and records `now` as
    /// `updated_at`. Duplicate entries for the consumer are collapsed.
    pub fn upsert(&mut self, consumer_id: ConsumerId, expiry_time: Timestamp, now: Timestamp) {
        let created_at = self
            .entries
            .iter()
            .find(|entry| entry.consumer_id == consumer_id)
            .map(|entry| entry.created_at);
        self.entries.retain(|entry| entry.consumer_id != consumer_id);
        let entry = match created_at {
            Some(created_at) => AllowListEntry {
                consumer_id,
                expiry_time,
                created_at,
                updated_at: Some(now),
            },
            None => AllowListEntry {
                consumer_id,
                expiry_time,
                created_at: now,
                updated_at: None,
            },
        };
        self.entries.push(entry);
    }

    /// Removes every entry for a consumer, returning true when one existed.
    pub fn remove(&mut self, consumer_id: &ConsumerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.consumer_id != consumer_id);
        self.entries.len() != before
    }

    /// Drops entries that are expired at `now`, returning how many were removed.
    pub fn prune_expired(&mut self, now: Timestamp) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.is_active_at(now));
        before - self.entries.len()
    }
}

// ============================================================================
// SECTION: Field Policy
// ============================================================================

/// Access policy for a single provider field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPolicy {
    /// Field the policy applies to.
    pub field_name: FieldName,
    /// Administrative domain responsible for the field.
    pub owner: String,
    /// Provider that serves the field.
    pub provider: ProviderId,
    /// Whether owner consent is expected; informational at decision time.
    #[serde(default)]
    pub consent_required: bool,
    /// Public or restricted classification.
    #[serde(default)]
    pub access_control_type: AccessControlType,
    /// Time-bounded consumer entries for restricted access.
    #[serde(default)]
    pub allow_list: AllowList,
    /// Free-form attributes carried for display and reporting.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl FieldPolicy {
    /// Creates a restricted policy with an empty allow-list.
    #[must_use]
    pub fn restricted(
        field_name: impl Into<FieldName>,
        owner: impl Into<String>,
        provider: impl Into<ProviderId>,
    ) -> Self {
        Self {
            field_name: field_name.into(),
            owner: owner.into(),
            provider: provider.into(),
            consent_required: false,
            access_control_type: AccessControlType::Restricted,
            allow_list: AllowList::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Creates a public policy.
    #[must_use]
    pub fn public(
        field_name: impl Into<FieldName>,
        owner: impl Into<String>,
        provider: impl Into<ProviderId>,
    ) -> Self {
        Self {
            access_control_type: AccessControlType::Public,
            ..Self::restricted(field_name, owner, provider)
        }
    }

    /// Sets the consent flag.
    #[must_use]
    pub const fn with_consent_required(mut self, consent_required: bool) -> Self {
        self.consent_required = consent_required;
        self
    }

    /// Replaces the allow-list.
    #[must_use]
    pub fn with_allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }
}

// ============================================================================
// SECTION: Consumer Grant
// ============================================================================

/// Fields a consumer application has been approved to request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerGrant {
    /// Consumer the grant belongs to.
    pub consumer_id: ConsumerId,
    /// Approved field names.
    #[serde(default)]
    pub approved_fields: BTreeSet<FieldName>,
}

impl ConsumerGrant {
    /// Creates a grant from a consumer and field list.
    #[must_use]
    pub fn new(
        consumer_id: impl Into<ConsumerId>,
        fields: impl IntoIterator<Item = impl Into<FieldName>>,
    ) -> Self {
        Self {
            consumer_id: consumer_id.into(),
            approved_fields: fields.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns true when the field is approved for this consumer.
    #[must_use]
    pub fn approves(&self, field_name: &FieldName) -> bool {
        self.approved_fields.contains(field_name)
    }
}

// ============================================================================
// SECTION: Versioned Records
// ============================================================================

/// Stored value paired with its monotonic version.
///
/// # Invariants
/// - Versions start at 1 and increase by one per successful write to the key,
///   including deletions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned<T> {
    /// Version observed when the value was read.
    pub version: u64,
    /// Stored value.
    pub value: T,
}

impl<T> Versioned<T> {
    /// Pairs a value with a version.
    #[must_use]
    pub const fn new(version: u64, value: T) -> Self {
        Self {
            version,
            value,
        }
    }

    /// Discards the version.
    #[must_use]
    pub fn into_value(self) -> T {
        self.value
    }
}
