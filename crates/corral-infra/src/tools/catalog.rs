//! Built-in tool metadata.
//!
//! The catalog is shared verbatim by host and child; each process binds
//! handlers for the tools it can execute. Child-executed tools keep their
//! metadata visible on the host (and vice versa) so command routing and the
//! agent loop's allowlist intersection see the same catalog everywhere.

use serde_json::json;

use super::ToolMeta;

fn meta(
    name: &str,
    description: &str,
    parameters: serde_json::Value,
) -> ToolMeta {
    ToolMeta {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
        requires_host_execution: false,
        human_only: false,
        local_command: false,
    }
}

fn host(mut m: ToolMeta) -> ToolMeta {
    m.requires_host_execution = true;
    m
}

fn human(mut m: ToolMeta) -> ToolMeta {
    m.human_only = true;
    m
}

fn local(mut m: ToolMeta) -> ToolMeta {
    m.local_command = true;
    m
}

fn string_arg(name: &str, description: &str) -> serde_json::Value {
    json!({
        "type": "object",
        "properties": { name: {"type": "string", "description": description} },
        "required": [name],
    })
}

/// Every built-in tool, in registration order.
pub fn builtin_metas() -> Vec<ToolMeta> {
    vec![
        // -- agent-facing tools --
        meta(
            "shell__execute",
            "Run a shell command in the session workspace",
            string_arg("command", "The command line to execute"),
        ),
        meta(
            "human__ask",
            "Ask the human operator a question and wait for the answer",
            string_arg("question", "The question to ask"),
        ),
        meta(
            "fs__file__read",
            "Read a file from the session workspace",
            string_arg("path", "Path of the file to read"),
        ),
        meta(
            "fs__file__write",
            "Write a file in the session workspace",
            json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Path of the file to write"},
                    "content": {"type": "string", "description": "Full file contents"},
                },
                "required": ["path", "content"],
            }),
        ),
        host(meta(
            "fs__directory__list",
            "List a directory on the host filesystem",
            string_arg("path", "Directory to list"),
        )),
        host(meta(
            "web__search",
            "Search the web and return result titles and links",
            string_arg("query", "The search query"),
        )),
        // -- human commands: session management --
        local(human(meta(
            "session__new",
            "Create a session from a template",
            json!({
                "type": "object",
                "properties": {
                    "template": {"type": "string"},
                    "name": {"type": "string"},
                },
                "required": ["template"],
            }),
        ))),
        local(human(meta(
            "session__list",
            "List sessions",
            json!({"type": "object", "properties": {"all": {"type": "boolean"}}}),
        ))),
        local(human(meta(
            "session__show",
            "Show one session record",
            string_arg("id", "Session id"),
        ))),
        human(meta(
            "session__send",
            "Append a user message to the session conversation",
            string_arg("text", "The message text"),
        )),
        local(human(meta(
            "session__pause",
            "Pause a session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__resume",
            "Resume a paused session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__stop",
            "Stop a session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__run",
            "Run a stopped session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__retry",
            "Retry a finished session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__delete",
            "Soft-delete a session",
            string_arg("id", "Session id"),
        ))),
        local(human(meta(
            "session__clean",
            "Purge soft-deleted sessions and their workspaces",
            json!({"type": "object"}),
        ))),
        local(human(meta(
            "session__logs",
            "Show the tail of a session's message log",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "tail": {"type": "string", "description": "Number of messages to show"},
                },
                "required": ["id"],
            }),
        ))),
        local(human(meta(
            "daemon__status",
            "Report daemon health: sessions, children, pending human input",
            json!({"type": "object"}),
        ))),
        // -- human commands: templates, groups, approvals --
        local(human(meta(
            "template__list",
            "List agent templates",
            json!({"type": "object"}),
        ))),
        local(human(meta(
            "template__show",
            "Show one template",
            string_arg("name", "Template name"),
        ))),
        local(human(meta(
            "group__create",
            "Create a session group",
            string_arg("name", "Group name"),
        ))),
        local(human(meta(
            "group__add",
            "Add a session to a group (membership is exclusive)",
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "id": {"type": "string"}},
                "required": ["name", "id"],
            }),
        ))),
        local(human(meta(
            "group__remove",
            "Remove a session from a group",
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "id": {"type": "string"}},
                "required": ["name", "id"],
            }),
        ))),
        local(human(meta(
            "group__list",
            "List groups and their members",
            json!({"type": "object"}),
        ))),
        local(human(meta(
            "group__send",
            "Fan a user message out to every session in a group",
            json!({
                "type": "object",
                "properties": {"name": {"type": "string"}, "text": {"type": "string"}},
                "required": ["name", "text"],
            }),
        ))),
        local(human(meta(
            "approval__list",
            "List pending approvals",
            json!({"type": "object"}),
        ))),
        local(human(meta(
            "approval__resolve",
            "Resolve a pending approval",
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string"},
                    "choice": {"type": "string", "enum": ["APPROVE", "REJECT", "MODIFY"]},
                    "explanation": {"type": "string"},
                },
                "required": ["id", "choice"],
            }),
        ))),
        local(human(meta(
            "question__list",
            "List pending questions",
            json!({"type": "object"}),
        ))),
        local(human(meta(
            "question__answer",
            "Answer a pending question",
            json!({
                "type": "object",
                "properties": {"id": {"type": "string"}, "answer": {"type": "string"}},
                "required": ["id", "answer"],
            }),
        ))),
    ]
}
