// crates/stmt-diag-config/src/lib.rs
// ============================================================================
// Module: Statement Diagnostics Config Library
// Description: Canonical config model and validation.
// Purpose: Single source of truth for stmt-diag.toml semantics.
// Dependencies: stmt-diag-core, stmt-diag-store-sqlite, serde, toml
// ============================================================================

//! ## Overview
//! `stmt-diag-config` defines the configuration model for statement
//! diagnostics deployments: the durable store, registry timing, and the event
//! log sink. Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
