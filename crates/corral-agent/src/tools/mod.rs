//! Child-side tool handlers.
//!
//! The full catalog's metadata is registered so routing and the agent loop
//! see every tool; handlers are bound only for the tools this process can
//! execute itself. Everything else round-trips to the host.

pub mod ask;
pub mod fs;
pub mod send;
pub mod shell;

use std::sync::Arc;

use corral_infra::tools::catalog::builtin_metas;
use corral_infra::tools::{ToolDef, ToolRegistry};

use crate::core::ChildState;

pub fn build_registry(state: Arc<ChildState>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for meta in builtin_metas() {
        registry.register(ToolDef::meta_only(meta));
    }
    shell::register(&mut registry, state.clone());
    ask::register(&mut registry, state.clone());
    fs::register(&mut registry);
    send::register(&mut registry, state);
    registry
}

/// Pull a string argument by key, falling back to joining positional tokens.
pub(crate) fn string_arg(args: &serde_json::Value, key: &str) -> Option<String> {
    if let Some(s) = args.get(key).and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    if let Some(items) = args.as_array() {
        let joined = items
            .iter()
            .filter_map(|v| v.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        if !joined.is_empty() {
            return Some(joined);
        }
    }
    None
}
