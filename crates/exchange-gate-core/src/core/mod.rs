// crates/exchange-gate-core/src/core/mod.rs
// ============================================================================
// Module: Exchange Gate Core Types
// Description: Canonical policy, decision, and audit structures.
// Purpose: Provide stable, serializable types shared by every Exchange Gate crate.
// Dependencies: serde, serde_json, time
// ============================================================================

//! ## Overview
//! Core types define the persisted policy facts, the per-field decision
//! model, and the audit trail shapes. They are the canonical source of truth
//! for store schemas, audit sinks, and CLI output.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod audit;
pub mod decision;
pub mod duration;
pub mod hashing;
pub mod identifiers;
pub mod policy;
pub mod redaction;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::AuditContext;
pub use audit::AuditContextError;
pub use audit::AuditLogFilter;
pub use audit::AuditLogRecord;
pub use audit::AuditOutcome;
pub use audit::AuditPhase;
pub use audit::AuditStatus;
pub use audit::CallerMetadata;
pub use audit::DEFAULT_AUDIT_QUERY_LIMIT;
pub use audit::FailureReason;
pub use audit::FinalizedAudit;
pub use audit::MAX_AUDIT_QUERY_LIMIT;
pub use decision::AccessDecision;
pub use decision::AccessOutcome;
pub use decision::DecisionSummary;
pub use decision::DenyReason;
pub use duration::DurationError;
pub use duration::GrantDuration;
pub use duration::parse_iso8601_duration;
pub use hashing::DEFAULT_HASH_ALGORITHM;
pub use hashing::HashAlgorithm;
pub use hashing::HashDigest;
pub use hashing::HashError;
pub use identifiers::ApplicationId;
pub use identifiers::ConsumerId;
pub use identifiers::CorrelationId;
pub use identifiers::FieldName;
pub use identifiers::ProviderId;
pub use identifiers::SchemaId;
pub use policy::AccessControlType;
pub use policy::AllowList;
pub use policy::AllowListEntry;
pub use policy::AllowListMatch;
pub use policy::ConsumerGrant;
pub use policy::FieldPolicy;
pub use policy::Versioned;
pub use redaction::PayloadCapture;
pub use redaction::redact_identifiers;
pub use self::time::Timestamp;
pub use self::time::TimestampError;
