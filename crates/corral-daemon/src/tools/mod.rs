//! Host-side tool handlers.
//!
//! The full catalog's metadata is registered so the dispatcher sees every
//! tool; handlers are bound for host-executed tools only. Session-context
//! tools (shell, ask, workspace fs, send) stay metadata-only here and are
//! forwarded over the bridge.

mod groups;
mod human;
mod sessions;
mod status;
mod web;

use std::sync::Arc;

use serde_json::Value;

use corral_infra::tools::{ToolCtx, ToolDef, ToolHandler, ToolRegistry, catalog::builtin_metas};
use corral_shared::outcome::Outcome;

use crate::core::HostState;

pub fn build_registry(state: Arc<HostState>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    for meta in builtin_metas() {
        registry.register(ToolDef::meta_only(meta));
    }
    sessions::register(&mut registry, state.clone());
    groups::register(&mut registry, state.clone());
    human::register(&mut registry, state.clone());
    status::register(&mut registry, state);
    web::register(&mut registry);
    registry
}

/// Adapt an async fn taking the shared state into a registry handler.
pub(crate) fn bind<F, Fut>(
    registry: &mut ToolRegistry,
    name: &str,
    state: Arc<HostState>,
    f: F,
) where
    F: Fn(Arc<HostState>, Value, ToolCtx) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    let handler: ToolHandler = Arc::new(move |args, ctx| Box::pin(f(state.clone(), args, ctx)));
    registry.bind_handler(name, handler);
}

/// String argument by key, with a positional fallback.
pub(crate) fn arg_str(args: &Value, key: &str, position: usize) -> Option<String> {
    if let Some(s) = args.get(key).and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    args.get(position).and_then(|v| v.as_str()).map(String::from)
}

/// Numeric argument by key or position; string digits count.
pub(crate) fn arg_u64(args: &Value, key: &str, position: usize) -> Option<u64> {
    let value = args.get(key).or_else(|| args.get(position))?;
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

/// Target session: explicit argument first, then the command context.
pub(crate) fn session_arg(args: &Value, ctx: &ToolCtx) -> Option<u64> {
    arg_u64(args, "id", 0).or((ctx.session_id > 0).then_some(ctx.session_id))
}

/// Join the remaining positional tokens into free text (for explanations and
/// answers typed straight on the command line).
pub(crate) fn rest_str(args: &Value, key: &str, from: usize) -> Option<String> {
    if let Some(s) = args.get(key).and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    let items = args.as_array()?;
    let joined = items[from.min(items.len())..]
        .iter()
        .filter_map(|v| v.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    (!joined.is_empty()).then_some(joined)
}
