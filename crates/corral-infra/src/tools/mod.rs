//! Tool catalog, registry, and command resolution.
//!
//! A tool is a metadata record plus, in the process that can execute it, a
//! handler closure returning the three-state outcome. Handlers capture their
//! collaborators at registration time; the per-invocation context carries
//! only call-scoped data.

pub mod argv;
pub mod catalog;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use corral_shared::outcome::Outcome;
use corral_shared::utils::cancel::CancelToken;

pub type ToolFuture = Pin<Box<dyn Future<Output = Outcome> + Send>>;
pub type ToolHandler = Arc<dyn Fn(Value, ToolCtx) -> ToolFuture + Send + Sync>;
pub type AliasResolver = Arc<dyn Fn(&[String]) -> Option<AliasMatch> + Send + Sync>;

/// Result of an alias resolver: the canonical tool plus its parsed args.
#[derive(Debug, Clone)]
pub struct AliasMatch {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolMeta {
    /// Canonical `plugin__area__action` name.
    pub name: String,
    pub description: String,
    /// JSON schema of the parameters, as offered to the model.
    pub parameters: Value,
    /// Must run on the host (credentials, signals, container control).
    #[serde(default)]
    pub requires_host_execution: bool,
    /// Never offered to the model; CLI/human channel only.
    #[serde(default)]
    pub human_only: bool,
    /// Executes on the host even when a session is current.
    #[serde(default)]
    pub local_command: bool,
}

#[derive(Clone)]
pub struct ToolDef {
    pub meta: ToolMeta,
    /// Absent when this process cannot execute the tool itself.
    pub handler: Option<ToolHandler>,
    pub alias: Option<AliasResolver>,
}

impl ToolDef {
    pub fn meta_only(meta: ToolMeta) -> Self {
        Self {
            meta,
            handler: None,
            alias: None,
        }
    }
}

/// Per-invocation context handed to a handler.
#[derive(Debug, Clone)]
pub struct ToolCtx {
    pub session_id: u64,
    pub tool_call_id: String,
    /// Phase state returned by a previous RUNNING outcome, `Null` initially.
    pub state: Value,
    /// Data injected by an approval/answer since the last invocation.
    pub external_data: Option<Value>,
    pub cancel: CancelToken,
    /// True when the invocation arrived on the CLI/human path.
    pub human: bool,
}

impl ToolCtx {
    pub fn new(session_id: u64, tool_call_id: impl Into<String>) -> Self {
        Self {
            session_id,
            tool_call_id: tool_call_id.into(),
            state: Value::Null,
            external_data: None,
            cancel: CancelToken::new(),
            human: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedCommand {
    pub name: String,
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Empty,
    NotFound(String),
}

impl std::fmt::Display for ResolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty command"),
            Self::NotFound(cmd) => write!(f, "command not found: {cmd}"),
        }
    }
}

impl std::error::Error for ResolveError {}

/// The catalog. Registration order is significant: alias resolution scans it
/// linearly and the first match wins.
#[derive(Default)]
pub struct ToolRegistry {
    defs: Vec<ToolDef>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool; a repeated name replaces the earlier definition but
    /// keeps its position in the scan order.
    pub fn register(&mut self, def: ToolDef) {
        let name = def.meta.name.clone();
        match self.index.get(&name) {
            Some(&i) => self.defs[i] = def,
            None => {
                self.index.insert(name, self.defs.len());
                self.defs.push(def);
            }
        }
    }

    /// Attach a handler to an already-registered meta.
    pub fn bind_handler(&mut self, name: &str, handler: ToolHandler) {
        if let Some(&i) = self.index.get(name) {
            self.defs[i].handler = Some(handler);
        }
    }

    /// Attach an alias resolver to an already-registered meta.
    pub fn bind_alias(&mut self, name: &str, alias: AliasResolver) {
        if let Some(&i) = self.index.get(name) {
            self.defs[i].alias = Some(alias);
        }
    }

    pub fn get(&self, name: &str) -> Option<&ToolDef> {
        self.index.get(name).map(|&i| &self.defs[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ToolDef> {
        self.defs.iter()
    }

    /// Resolve a command string.
    ///
    /// Alias resolvers are tried in registration order; first match wins.
    /// Failing that, argv tokens are glued with `__` and the longest
    /// concatenation present in the registry wins, the remaining tokens
    /// becoming positional args (a single trailing flow-style token is
    /// parsed as structured args).
    pub fn resolve(&self, command: &str) -> Result<ResolvedCommand, ResolveError> {
        let tokens = argv::split(command);
        if tokens.is_empty() {
            return Err(ResolveError::Empty);
        }

        for def in &self.defs {
            if let Some(ref alias) = def.alias
                && let Some(m) = alias(&tokens)
            {
                return Ok(ResolvedCommand {
                    name: m.name,
                    args: m.args,
                });
            }
        }

        let mut best: Option<(String, usize)> = None;
        for end in 1..=tokens.len() {
            let name = tokens[..end].join("__");
            if self.index.contains_key(&name) {
                best = Some((name, end));
            }
        }
        let Some((name, consumed)) = best else {
            return Err(ResolveError::NotFound(tokens[0].clone()));
        };

        Ok(ResolvedCommand {
            args: positional_args(&tokens[consumed..]),
            name,
        })
    }
}

/// Turn leftover argv tokens into handler args: a single flow-style token
/// parses as JSON, anything else rides as a positional string array.
fn positional_args(rest: &[String]) -> Value {
    if rest.len() == 1 && (rest[0].starts_with('{') || rest[0].starts_with('[')) {
        if let Ok(value) = serde_json::from_str::<Value>(&rest[0]) {
            return value;
        }
    }
    Value::Array(rest.iter().map(|t| Value::String(t.clone())).collect())
}
