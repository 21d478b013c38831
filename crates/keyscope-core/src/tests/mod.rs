//! Test module for keyscope-core
//!
//! This module contains tests for:
//! - Key search: classification, pagination, cancellation, exact lookups
//! - Search history bounds, promotion and persistence
//! - Event bus delivery order, isolation and unsubscription
//! - Plugin host lifecycle and the built-in plugins
//! - Validated key operations
//! - Key-count polling
//! - Configuration loading and defaults

mod poller_tests;
mod search_tests;
