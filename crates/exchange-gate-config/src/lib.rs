// crates/exchange-gate-config/src/lib.rs
// ============================================================================
// Module: Exchange Gate Config Library
// Description: Canonical config model, validation, and example output.
// Purpose: Single source of truth for exchange-gate.toml semantics.
// Dependencies: exchange-gate-audit, exchange-gate-core, serde, toml
// ============================================================================

//! ## Overview
//! `exchange-gate-config` defines the configuration model for Exchange Gate:
//! the policy store backend, audit delivery (sink, retry, monitor), and
//! request orchestration settings. Validation is strict and fail-closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod examples;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use examples::config_toml_example;
