// crates/exchange-gate-core/src/runtime/store.rs
// ============================================================================
// Module: Exchange Gate In-Memory Stores
// Description: In-memory policy and grant stores with per-key locking.
// Purpose: Provide deterministic stores for tests, demos, and single-process hosts.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! Each key owns its own reader-writer lock, so a write to one field never
//! blocks reads of another. The outer map lock is held only long enough to
//! find or create a key's slot. Every write replaces the whole record, which
//! makes allow-list updates atomic for readers.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::RwLock;

use crate::core::ConsumerGrant;
use crate::core::ConsumerId;
use crate::core::FieldName;
use crate::core::FieldPolicy;
use crate::core::ProviderId;
use crate::core::Versioned;
use crate::interfaces::ExpectedVersion;
use crate::interfaces::GrantStore;
use crate::interfaces::GrantWriter;
use crate::interfaces::PolicyStore;
use crate::interfaces::PolicyWriter;
use crate::interfaces::StoreError;
use crate::interfaces::StoredVersion;

// ============================================================================
// SECTION: Keyed Slots
// ============================================================================

/// Versioned record slot; `value` is `None` for tombstones.
#[derive(Debug)]
struct Slot<V> {
    /// Last written version.
    version: u64,
    /// Live value, if any.
    value: Option<V>,
}

impl<V> Slot<V> {
    /// Returns the stored version state.
    fn stored_version(&self) -> StoredVersion {
        match (&self.value, self.version) {
            (_, 0) => StoredVersion::Absent,
            (Some(_), version) => StoredVersion::Live(version),
            (None, version) => StoredVersion::Deleted(version),
        }
    }
}

/// Shared handle to a slot.
type SlotHandle<V> = Arc<RwLock<Slot<V>>>;

/// Map of per-key slots.
#[derive(Debug)]
struct KeyedSlots<K, V> {
    /// Slot map; only locked to look up or insert slots.
    slots: RwLock<BTreeMap<K, SlotHandle<V>>>,
}

impl<K: Ord + Clone + fmt::Display, V: Clone> KeyedSlots<K, V> {
    /// Creates an empty map.
    const fn new() -> Self {
        Self {
            slots: RwLock::new(BTreeMap::new()),
        }
    }

    /// Returns the slot for `key` if it exists.
    fn existing(&self, key: &K) -> Result<Option<SlotHandle<V>>, StoreError> {
        let guard = self.slots.read().map_err(|_| poisoned())?;
        Ok(guard.get(key).cloned())
    }

    /// Returns the slot for `key`, creating an empty one if needed.
    fn slot(&self, key: &K) -> Result<SlotHandle<V>, StoreError> {
        if let Some(slot) = self.existing(key)? {
            return Ok(slot);
        }
        let mut guard = self.slots.write().map_err(|_| poisoned())?;
        let slot = guard.entry(key.clone()).or_insert_with(|| {
            Arc::new(RwLock::new(Slot {
                version: 0,
                value: None,
            }))
        });
        Ok(Arc::clone(slot))
    }

    /// Reads the live value for `key`.
    fn get(&self, key: &K) -> Result<Option<Versioned<V>>, StoreError> {
        let Some(slot) = self.existing(key)? else {
            return Ok(None);
        };
        let slot = slot.read().map_err(|_| poisoned())?;
        Ok(slot.value.clone().map(|value| Versioned::new(slot.version, value)))
    }

    /// Writes or deletes the value for `key` under a precondition.
    fn write(
        &self,
        key: &K,
        value: Option<V>,
        expected: ExpectedVersion,
    ) -> Result<(StoredVersion, u64), StoreError> {
        let slot = self.slot(key)?;
        let mut slot = slot.write().map_err(|_| poisoned())?;
        let stored = slot.stored_version();
        if !expected.admits(stored) {
            return Err(StoreError::Conflict {
                key: key.to_string(),
                expected,
                actual: stored,
            });
        }
        let next = slot
            .version
            .checked_add(1)
            .ok_or_else(|| StoreError::Invalid(format!("version overflow for {key}")))?;
        slot.version = next;
        slot.value = value;
        Ok((stored, next))
    }

    /// Returns every live value in key order.
    fn live_values(&self) -> Result<Vec<Versioned<V>>, StoreError> {
        let handles: Vec<SlotHandle<V>> = {
            let guard = self.slots.read().map_err(|_| poisoned())?;
            guard.values().cloned().collect()
        };
        let mut values = Vec::with_capacity(handles.len());
        for handle in handles {
            let slot = handle.read().map_err(|_| poisoned())?;
            if let Some(value) = &slot.value {
                values.push(Versioned::new(slot.version, value.clone()));
            }
        }
        Ok(values)
    }
}

/// Builds the error reported for poisoned locks.
fn poisoned() -> StoreError {
    StoreError::Store("in-memory store lock poisoned".to_string())
}

// ============================================================================
// SECTION: Policy Store
// ============================================================================

/// In-memory field policy store.
#[derive(Debug, Clone)]
pub struct InMemoryPolicyStore {
    /// Policies keyed by field name.
    policies: Arc<KeyedSlots<FieldName, FieldPolicy>>,
}

impl Default for InMemoryPolicyStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPolicyStore {
    /// Creates an empty policy store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            policies: Arc::new(KeyedSlots::new()),
        }
    }

    /// Creates a store seeded with policies.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when seeding fails.
    pub fn with_policies(
        policies: impl IntoIterator<Item = FieldPolicy>,
    ) -> Result<Self, StoreError> {
        let store = Self::new();
        for policy in policies {
            store.put_field_policy(policy, ExpectedVersion::Any)?;
        }
        Ok(store)
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn load_field_policy(
        &self,
        field_name: &FieldName,
    ) -> Result<Option<Versioned<FieldPolicy>>, StoreError> {
        self.policies.get(field_name)
    }
}

impl PolicyWriter for InMemoryPolicyStore {
    fn put_field_policy(
        &self,
        policy: FieldPolicy,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let key = policy.field_name.clone();
        let (_, version) = self.policies.write(&key, Some(policy), expected)?;
        Ok(version)
    }

    fn delete_field_policy(
        &self,
        field_name: &FieldName,
        expected: ExpectedVersion,
    ) -> Result<bool, StoreError> {
        if self.policies.existing(field_name)?.is_none() {
            return match expected {
                ExpectedVersion::Exactly(_) => Err(StoreError::Conflict {
                    key: field_name.to_string(),
                    expected,
                    actual: StoredVersion::Absent,
                }),
                ExpectedVersion::Any | ExpectedVersion::Absent => Ok(false),
            };
        }
        let (previous, _) = self.policies.write(field_name, None, expected)?;
        Ok(matches!(previous, StoredVersion::Live(_)))
    }

    fn list_field_policies(
        &self,
        provider: Option<&ProviderId>,
    ) -> Result<Vec<Versioned<FieldPolicy>>, StoreError> {
        let mut policies = self.policies.live_values()?;
        if let Some(provider) = provider {
            policies.retain(|record| &record.value.provider == provider);
        }
        Ok(policies)
    }
}

// ============================================================================
// SECTION: Grant Store
// ============================================================================

/// In-memory consumer grant store.
#[derive(Debug, Clone)]
pub struct InMemoryGrantStore {
    /// Grants keyed by consumer.
    grants: Arc<KeyedSlots<ConsumerId, ConsumerGrant>>,
}

impl Default for InMemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGrantStore {
    /// Creates an empty grant store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            grants: Arc::new(KeyedSlots::new()),
        }
    }

    /// Creates a store seeded with grants.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when seeding fails.
    pub fn with_grants(grants: impl IntoIterator<Item = ConsumerGrant>) -> Result<Self, StoreError> {
        let store = Self::new();
        for grant in grants {
            store.put_consumer_grant(grant, ExpectedVersion::Any)?;
        }
        Ok(store)
    }
}

impl GrantStore for InMemoryGrantStore {
    fn load_consumer_grant(
        &self,
        consumer_id: &ConsumerId,
    ) -> Result<Option<Versioned<ConsumerGrant>>, StoreError> {
        self.grants.get(consumer_id)
    }
}

impl GrantWriter for InMemoryGrantStore {
    fn put_consumer_grant(
        &self,
        grant: ConsumerGrant,
        expected: ExpectedVersion,
    ) -> Result<u64, StoreError> {
        let key = grant.consumer_id.clone();
        let (_, version) = self.grants.write(&key, Some(grant), expected)?;
        Ok(version)
    }
}
