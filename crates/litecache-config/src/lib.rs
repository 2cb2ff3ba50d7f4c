// crates/litecache-config/src/lib.rs
// ============================================================================
// Module: Litecache Config Library
// Description: TOML configuration model and loader for litecache.
// Purpose: Single source of truth for litecache.toml semantics.
// Dependencies: litecache, serde, toml
// ============================================================================

//! ## Overview
//! `litecache-config` loads a `litecache.toml` file into a validated
//! [`LitecacheConfig`] and opens a [`litecache::CacheCoordinator`] from it.
//! Validation is strict and fails closed.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
