// crates/exchange-gate-service/src/downstream.rs
// ============================================================================
// Module: Downstream Providers
// Description: Interface to the provider that serves disclosed fields.
// Purpose: Keep the provider call abstract so the gate owns only the policy.
// Dependencies: async-trait, exchange-gate-core, serde_json, thiserror
// ============================================================================

//! ## Overview
//! After the decision phase allows a disclosure, the gate asks a
//! [`Downstream`] provider for the allowed fields. The provider is an
//! external collaborator; [`FixtureDownstream`] serves fields from a static
//! JSON document for local runs and tests.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use async_trait::async_trait;
use exchange_gate_core::ConsumerId;
use exchange_gate_core::CorrelationId;
use exchange_gate_core::FieldName;
use exchange_gate_core::ProviderId;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Request forwarded to a provider after the decision phase.
#[derive(Debug, Clone, PartialEq)]
pub struct DownstreamRequest {
    /// Correlation identifier shared with the audit record.
    pub correlation_id: CorrelationId,
    /// Requesting consumer.
    pub consumer_id: ConsumerId,
    /// Target provider.
    pub provider_id: ProviderId,
    /// Fields cleared for disclosure, in request order.
    pub fields: Vec<FieldName>,
    /// Original request payload, if any.
    pub payload: Option<Value>,
}

/// Provider call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DownstreamError {
    /// Provider could not be reached.
    #[error("provider unavailable: {0}")]
    Unavailable(String),
    /// Provider answered with an error.
    #[error("provider rejected request: {0}")]
    Rejected(String),
}

/// Provider serving disclosed fields.
#[async_trait]
pub trait Downstream: Send + Sync {
    /// Fetches the requested fields.
    ///
    /// # Errors
    ///
    /// Returns [`DownstreamError`] when the provider call fails.
    async fn fetch(&self, request: &DownstreamRequest) -> Result<Value, DownstreamError>;
}

// ============================================================================
// SECTION: Fixture Provider
// ============================================================================

/// Provider answering from static per-provider JSON objects.
#[derive(Debug, Clone, Default)]
pub struct FixtureDownstream {
    /// Field values keyed by provider.
    providers: BTreeMap<ProviderId, Map<String, Value>>,
}

impl FixtureDownstream {
    /// Creates an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the field values served for a provider.
    #[must_use]
    pub fn with_provider(mut self, provider_id: ProviderId, fields: Map<String, Value>) -> Self {
        self.providers.insert(provider_id, fields);
        self
    }

    /// Builds a fixture from a JSON object of `{provider: {field: value}}`.
    ///
    /// # Errors
    ///
    /// Returns [`DownstreamError::Rejected`] when the document is not an
    /// object of objects.
    pub fn from_json(document: Value) -> Result<Self, DownstreamError> {
        let Value::Object(providers) = document else {
            return Err(DownstreamError::Rejected("fixture must be a json object".to_string()));
        };
        let mut fixture = Self::new();
        for (provider, fields) in providers {
            let Value::Object(fields) = fields else {
                return Err(DownstreamError::Rejected(format!(
                    "fixture entry {provider} must be a json object"
                )));
            };
            fixture.providers.insert(ProviderId::new(provider), fields);
        }
        Ok(fixture)
    }
}

#[async_trait]
impl Downstream for FixtureDownstream {
    async fn fetch(&self, request: &DownstreamRequest) -> Result<Value, DownstreamError> {
        let fields = self.providers.get(&request.provider_id).ok_or_else(|| {
            DownstreamError::Unavailable(format!("unknown provider {}", request.provider_id))
        })?;
        let mut response = Map::new();
        for field in &request.fields {
            let value = fields.get(field.as_str()).cloned().unwrap_or(Value::Null);
            response.insert(field.to_string(), value);
        }
        Ok(Value::Object(response))
    }
}
