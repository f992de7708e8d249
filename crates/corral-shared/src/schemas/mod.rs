//! Persisted record shapes and the provider contract.
//!
//! Sessions and templates are stored as `daemon/v1` manifests; unknown keys
//! survive a read-modify-write cycle via the flattened `extra` maps.

pub mod approval;
pub mod chat;
pub mod group;
pub mod message;
pub mod session;
pub mod template;

/// Manifest apiVersion shared by session and template records.
pub const API_VERSION: &str = "daemon/v1";
/// Manifest kind shared by session and template records.
pub const KIND_AGENT: &str = "Agent";
