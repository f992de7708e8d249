//! The conversation driver: one loop per child, one session per loop.
//!
//! The loop polls the session record every couple of seconds; the store's
//! mtime refresh is the synchronization point with the host. Each tick acts
//! only when the trailing message calls for work, asks the host for a
//! completion when no tool calls are pending, and fans pending tool calls
//! out through the bridge.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use corral_shared::protocol::{AiPromptRequestMsg, BridgeMessage};
use corral_shared::schemas::chat::{ChatRequest, ChatResponse, ToolSpec};
use corral_shared::schemas::message::{ChatMessage, Role, ToolCall};
use corral_shared::schemas::session::{SessionAction, SessionRecord, SessionStatus};

use crate::bridge::AI_PROMPT_TIMEOUT;
use crate::core::ChildCore;
use crate::dispatch;
use crate::prompt;

pub const TICK_INTERVAL: Duration = Duration::from_secs(2);
/// Tool results are truncated to this many characters before they enter the
/// message log.
pub const MAX_TOOL_RESULT_CHARS: usize = 8_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    Completed,
    Stopped,
    Failed,
}

pub struct AgentLoop {
    core: ChildCore,
    /// `(session_id, message_count)` pairs whose provider call failed;
    /// suppresses infinite retries until the log moves or a human retries.
    failed_attempts: HashSet<(u64, usize)>,
    /// Provider round-trips spent so far, checked against `max_turns`.
    turns: u32,
}

impl AgentLoop {
    pub fn new(core: ChildCore) -> Self {
        Self {
            core,
            failed_attempts: HashSet::new(),
            turns: 0,
        }
    }

    pub async fn run(&mut self) -> Result<LoopExit> {
        self.startup().await?;

        loop {
            if self.core.state.stop_requested() {
                let mut sessions = self.core.state.sessions.lock().await;
                if let Err(e) = sessions.transition(self.session_id(), SessionAction::Stop) {
                    debug!(%e, "stop transition skipped");
                }
                return Ok(LoopExit::Stopped);
            }
            if self.core.state.take_pause_request() {
                let mut sessions = self.core.state.sessions.lock().await;
                if let Err(e) = sessions.transition(self.session_id(), SessionAction::Pause) {
                    debug!(%e, "pause transition skipped");
                }
                // in-flight work was aborted by the signal; new work may run
                self.core.state.cancel.reset();
            }

            match self.tick().await {
                Ok(Some(exit)) => return Ok(exit),
                Ok(None) => {}
                Err(e) => {
                    warn!(session_id = self.session_id(), error = %e, "tick failed");
                    let mut sessions = self.core.state.sessions.lock().await;
                    if let Err(e) = sessions.transition(self.session_id(), SessionAction::Fail) {
                        debug!(%e, "fail transition skipped");
                    }
                    return Ok(LoopExit::Failed);
                }
            }

            tokio::time::sleep(TICK_INTERVAL).await;
        }
    }

    fn session_id(&self) -> u64 {
        self.core.state.session_id
    }

    /// Move PENDING→RUNNING and render the system prompt once in the
    /// sandbox environment.
    async fn startup(&self) -> Result<()> {
        let mut sessions = self.core.state.sessions.lock().await;
        let record = sessions
            .get(self.session_id())
            .ok_or_else(|| anyhow!("session {} record is missing", self.session_id()))?;

        if record.spec.status == SessionStatus::Pending {
            sessions.transition(self.session_id(), SessionAction::Start)?;
        }

        if !record.spec.system_prompt_evaluated {
            let rendered = prompt::render(&record.spec.system_prompt);
            let mut fresh = sessions
                .get(self.session_id())
                .ok_or_else(|| anyhow!("session {} record is missing", self.session_id()))?;
            fresh.spec.system_prompt = rendered;
            fresh.spec.system_prompt_evaluated = true;
            sessions.persist(fresh)?;
            debug!(session_id = self.session_id(), "system prompt rendered");
        }
        Ok(())
    }

    async fn tick(&mut self) -> Result<Option<LoopExit>> {
        let mut record = {
            let mut sessions = self.core.state.sessions.lock().await;
            sessions
                .get(self.session_id())
                .ok_or_else(|| anyhow!("session {} record is missing", self.session_id()))?
        };

        match record.spec.status {
            SessionStatus::Paused => return Ok(None),
            SessionStatus::Stopped => return Ok(Some(LoopExit::Stopped)),
            SessionStatus::Success => return Ok(Some(LoopExit::Completed)),
            SessionStatus::Error => return Ok(Some(LoopExit::Failed)),
            SessionStatus::Pending => {
                let mut sessions = self.core.state.sessions.lock().await;
                sessions.transition(self.session_id(), SessionAction::Start)?;
                record.spec.status = SessionStatus::Running;
            }
            SessionStatus::Running => {}
        }

        let pending = record.unresolved_tool_calls();
        let Some(last) = record.spec.messages.last() else {
            return Ok(None);
        };
        let actionable = matches!(last.role, Role::User | Role::Tool)
            || (last.role == Role::Assistant && !pending.is_empty());
        if !actionable {
            return Ok(None);
        }

        if !pending.is_empty() {
            // resuming a previously appended assistant message
            self.execute_tool_calls(&pending).await?;
            return Ok(None);
        }

        self.prompt_and_act(&record).await
    }

    async fn prompt_and_act(&mut self, record: &SessionRecord) -> Result<Option<LoopExit>> {
        if let Some(limit) = self.core.state.config.settings.max_turns
            && self.turns >= limit
        {
            warn!(
                session_id = self.session_id(),
                limit, "turn limit exhausted, failing the session"
            );
            let mut sessions = self.core.state.sessions.lock().await;
            if let Err(e) = sessions.transition(self.session_id(), SessionAction::Fail) {
                debug!(%e, "fail transition skipped");
            }
            return Ok(Some(LoopExit::Failed));
        }

        let key = (self.session_id(), record.spec.messages.len());
        if self.failed_attempts.contains(&key) {
            return Ok(None);
        }
        self.turns += 1;

        let request = build_request(record, &self.allowed_tools(record));
        let message = BridgeMessage::AiPromptRequest(AiPromptRequestMsg {
            message_id: None,
            session_id: self.session_id(),
            request,
        });

        let response = self
            .core
            .state
            .bridge
            .request(message, AI_PROMPT_TIMEOUT, &self.core.state.cancel)
            .await;

        let chat: ChatResponse = match response {
            Ok(resp) if resp.success => match serde_json::from_value(resp.data) {
                Ok(chat) => chat,
                Err(e) => {
                    warn!(error = %e, "malformed provider response");
                    self.failed_attempts.insert(key);
                    return Ok(None);
                }
            },
            Ok(resp) => {
                warn!(
                    error = resp.error.as_deref().unwrap_or("unknown"),
                    "provider call failed"
                );
                self.failed_attempts.insert(key);
                return Ok(None);
            }
            Err(e) => {
                warn!(error = %e, "provider round-trip failed");
                self.failed_attempts.insert(key);
                return Ok(None);
            }
        };
        self.failed_attempts.clear();

        // finish_reason is tick-local: derived here, never carried over
        let merged = chat.merge_choices();
        let has_tool_calls = merged
            .message
            .tool_calls
            .as_ref()
            .is_some_and(|c| !c.is_empty());

        {
            let mut sessions = self.core.state.sessions.lock().await;
            let mut fresh = sessions
                .get(self.session_id())
                .ok_or_else(|| anyhow!("session {} record is missing", self.session_id()))?;
            if let Some(usage) = chat.usage {
                fresh.spec.latest_usage = Some(usage);
            }
            fresh.push_message(merged.message.clone());
            sessions.persist(fresh)?;
        }

        if has_tool_calls {
            let calls = merged.message.tool_calls.unwrap_or_default();
            self.execute_tool_calls(&calls).await?;
            return Ok(None);
        }

        if matches!(merged.finish_reason.as_deref(), Some("stop") | Some("end_turn")) {
            let mut sessions = self.core.state.sessions.lock().await;
            sessions.transition(self.session_id(), SessionAction::Complete)?;
            info!(session_id = self.session_id(), "conversation completed");
            return Ok(Some(LoopExit::Completed));
        }

        debug!(
            finish_reason = merged.finish_reason.as_deref().unwrap_or("none"),
            "assistant message appended without terminal finish reason"
        );
        Ok(None)
    }

    async fn execute_tool_calls(&self, calls: &[ToolCall]) -> Result<()> {
        for call in calls {
            if self.core.state.cancel.is_cancelled() {
                debug!("tool fan-out interrupted by cancellation");
                return Ok(());
            }

            let outcome = dispatch::route_tool_call(&self.core, call).await;
            if outcome.is_running() {
                // no result message yet; a later tick revisits this call once
                // external data arrives
                debug!(tool_call_id = %call.id, "tool call suspended");
                continue;
            }

            let content = outcome
                .into_log_content()
                .unwrap_or_default();
            let content = truncate_result(&content);

            // reload before persisting: the host may have toggled status
            // while the tool ran
            let mut sessions = self.core.state.sessions.lock().await;
            let mut fresh = sessions
                .get(self.session_id())
                .ok_or_else(|| anyhow!("session {} record is missing", self.session_id()))?;
            fresh.push_message(ChatMessage::tool(
                call.id.clone(),
                call.function.name.clone(),
                content,
            ));
            sessions.persist(fresh)?;
        }
        Ok(())
    }

    /// Intersect the session's allowlist with the catalog, dropping
    /// human-only tools. Unknown names are skipped.
    fn allowed_tools(&self, record: &SessionRecord) -> Vec<ToolSpec> {
        record
            .spec
            .tools
            .iter()
            .filter_map(|grant| self.core.registry.get(grant.name()))
            .filter(|def| !def.meta.human_only)
            .map(|def| ToolSpec {
                name: def.meta.name.clone(),
                description: def.meta.description.clone(),
                parameters: def.meta.parameters.clone(),
            })
            .collect()
    }
}

fn build_request(record: &SessionRecord, tools: &[ToolSpec]) -> ChatRequest {
    ChatRequest {
        model: record.spec.model.clone(),
        system: if record.spec.system_prompt.is_empty() {
            None
        } else {
            Some(record.spec.system_prompt.clone())
        },
        messages: record.spec.messages.clone(),
        tools: tools.to_vec(),
    }
}

fn truncate_result(content: &str) -> String {
    if content.chars().count() <= MAX_TOOL_RESULT_CHARS {
        return content.to_string();
    }
    let kept: String = content.chars().take(MAX_TOOL_RESULT_CHARS).collect();
    format!("{kept}… [truncated]")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;

    use tokio::io::AsyncReadExt;
    use tokio::sync::Mutex;

    use corral_infra::allowlist::Allowlist;
    use corral_infra::config::Configuration;
    use corral_infra::framing::{FrameBuffer, write_message};
    use corral_infra::sessions::SessionStore;
    use corral_shared::outcome::Outcome;
    use corral_shared::protocol::{CommandResponseMsg, ToolCallMsg};
    use corral_shared::schemas::chat::{AssistantMessage, Choice};
    use corral_shared::schemas::session::ToolGrant;
    use corral_shared::utils::cancel::CancelToken;

    use crate::bridge::ChildBridge;
    use crate::core::ChildState;
    use crate::tool_state::ToolStateMap;

    /// A scripted host: answers each `ai_prompt_request` with the next
    /// response from the queue and echoes host tool calls as SUCCESS.
    fn spawn_host(
        listener: tokio::net::UnixListener,
        mut responses: Vec<ChatResponse>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut read, mut write) = stream.into_split();
            let mut buf = FrameBuffer::new();
            let mut bytes = [0u8; 4096];
            responses.reverse();
            loop {
                let n = match read.read(&mut bytes).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for message in buf.push_messages(&bytes[..n]).into_iter().flatten() {
                    match message {
                        BridgeMessage::AiPromptRequest(m) => {
                            let chat = responses.pop().unwrap_or_default();
                            let reply = BridgeMessage::CommandResponse(CommandResponseMsg::ok(
                                m.message_id,
                                None,
                                serde_json::to_value(&chat).unwrap(),
                            ));
                            write_message(&mut write, &reply).await.unwrap();
                        }
                        BridgeMessage::ToolCall(ToolCallMsg {
                            message_id,
                            tool_call,
                            ..
                        }) => {
                            let outcome =
                                Outcome::success(format!("listing for {}", tool_call.id));
                            let reply = BridgeMessage::CommandResponse(CommandResponseMsg::ok(
                                message_id,
                                None,
                                serde_json::to_value(&outcome).unwrap(),
                            ));
                            write_message(&mut write, &reply).await.unwrap();
                        }
                        _ => {}
                    }
                }
            }
        })
    }

    async fn child_core(dir: &std::path::Path, session: SessionRecord) -> ChildCore {
        let config = Configuration::for_home(dir.join("home")).unwrap();
        config.ensure_layout().unwrap();
        let mut sessions = SessionStore::open(&config.sessions_dir);
        let session_id = session.id();
        sessions.persist(session).unwrap();

        let socket = dir.join("host.sock");
        let state = Arc::new(ChildState {
            config,
            session_id,
            sessions: Mutex::new(sessions),
            bridge: ChildBridge::new(&socket),
            tool_states: ToolStateMap::new(),
            cancel: CancelToken::new(),
            pause_requested: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            global_allowlist: Allowlist::default(),
        });
        let registry = crate::tools::build_registry(state.clone());
        ChildCore {
            state,
            registry: Arc::new(registry),
        }
    }

    async fn connect_and_pump(core: &ChildCore) {
        let reader = core.state.bridge.connect(10).await.unwrap();
        let pump = core.clone();
        tokio::spawn(async move {
            let mut reader = reader;
            let mut buf = FrameBuffer::new();
            let mut bytes = [0u8; 4096];
            loop {
                let n = match reader.read(&mut bytes).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for message in buf.push_messages(&bytes[..n]).into_iter().flatten() {
                    dispatch::handle_inbound(&pump, message).await;
                }
            }
        });
    }

    fn stop_choice(content: &str) -> ChatResponse {
        ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: Some(content.to_string()),
                    tool_calls: None,
                },
                finish_reason: Some("stop".to_string()),
            }],
            usage: None,
        }
    }

    #[tokio::test]
    async fn happy_path_without_tools_completes_the_session() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = tokio::net::UnixListener::bind(tmp.path().join("host.sock")).unwrap();
        let _host = spawn_host(listener, vec![stop_choice("Pong")]);

        let mut session = SessionRecord::new(1, "echo-1", "xai:mock");
        session.spec.system_prompt = "You are an echo.".to_string();
        session.push_message(ChatMessage::user("Ping"));

        let core = child_core(tmp.path(), session).await;
        connect_and_pump(&core).await;

        let mut agent = AgentLoop::new(core.clone());
        agent.startup().await.unwrap();

        // first tick: prompt, merge, append, complete
        let exit = agent.tick().await.unwrap();
        assert_eq!(exit, Some(LoopExit::Completed));

        let mut sessions = core.state.sessions.lock().await;
        let record = sessions.get(1).unwrap();
        assert_eq!(record.spec.status, SessionStatus::Success);
        let roles: Vec<Role> = record.spec.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
        assert_eq!(record.spec.messages[1].content, "Pong");
        assert!(record.spec.system_prompt_evaluated);
    }

    #[tokio::test]
    async fn host_tool_round_trip_appends_the_result() {
        let tmp = tempfile::tempdir().unwrap();
        let listener = tokio::net::UnixListener::bind(tmp.path().join("host.sock")).unwrap();

        let tool_turn = ChatResponse {
            choices: vec![Choice {
                message: AssistantMessage {
                    content: Some(String::new()),
                    tool_calls: Some(vec![ToolCall::new(
                        "tc_ls",
                        "fs__directory__list",
                        "{\"path\": \"/tmp\"}",
                    )]),
                },
                finish_reason: Some("tool_calls".to_string()),
            }],
            usage: None,
        };
        let _host = spawn_host(listener, vec![tool_turn, stop_choice("done")]);

        let mut session = SessionRecord::new(2, "lister", "xai:mock");
        session.spec.tools = vec![ToolGrant::Name("fs__directory__list".to_string())];
        session.push_message(ChatMessage::user("ls /tmp"));

        let core = child_core(tmp.path(), session).await;
        connect_and_pump(&core).await;

        let mut agent = AgentLoop::new(core.clone());
        agent.startup().await.unwrap();

        // tick 1: assistant w/ tool call, forwarded to host, result appended
        assert_eq!(agent.tick().await.unwrap(), None);
        {
            let mut sessions = core.state.sessions.lock().await;
            let record = sessions.get(2).unwrap();
            let roles: Vec<Role> = record.spec.messages.iter().map(|m| m.role).collect();
            assert_eq!(roles, vec![Role::User, Role::Assistant, Role::Tool]);
            assert!(record.spec.messages[2].content.contains("listing for tc_ls"));
        }

        // tick 2: plain assistant answer, completion
        assert_eq!(agent.tick().await.unwrap(), Some(LoopExit::Completed));
    }

    #[tokio::test]
    async fn failed_provider_call_is_not_retried_for_the_same_log_length() {
        let tmp = tempfile::tempdir().unwrap();
        let socket = tmp.path().join("host.sock");
        let listener = tokio::net::UnixListener::bind(&socket).unwrap();
        // host that always errors
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut read, mut write) = stream.into_split();
            let mut buf = FrameBuffer::new();
            let mut bytes = [0u8; 4096];
            loop {
                let n = match read.read(&mut bytes).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for message in buf.push_messages(&bytes[..n]).into_iter().flatten() {
                    if let BridgeMessage::AiPromptRequest(m) = message {
                        let reply = BridgeMessage::CommandResponse(CommandResponseMsg::err(
                            m.message_id,
                            None,
                            "provider exploded",
                        ));
                        write_message(&mut write, &reply).await.unwrap();
                    }
                }
            }
        });

        let mut session = SessionRecord::new(3, "flaky", "xai:mock");
        session.push_message(ChatMessage::user("hi"));

        let core = child_core(tmp.path(), session).await;
        connect_and_pump(&core).await;
        let mut agent = AgentLoop::new(core.clone());
        agent.startup().await.unwrap();

        assert_eq!(agent.tick().await.unwrap(), None);
        assert_eq!(agent.failed_attempts.len(), 1);

        // second tick is suppressed by the failed-attempt set
        assert_eq!(agent.tick().await.unwrap(), None);
        assert_eq!(agent.failed_attempts.len(), 1);

        // no assistant message was appended
        let mut sessions = core.state.sessions.lock().await;
        let record = sessions.get(3).unwrap();
        assert_eq!(record.spec.messages.len(), 1);
    }

    #[tokio::test]
    async fn approval_resumption_reexecutes_the_original_command() {
        use corral_shared::protocol::ApprovalResponseMsg;
        use corral_shared::schemas::approval::ApprovalChoice;

        let tmp = tempfile::tempdir().unwrap();
        let listener = tokio::net::UnixListener::bind(tmp.path().join("host.sock")).unwrap();

        // host that serves one shell tool-call turn and auto-approves
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut read, mut write) = stream.into_split();
            let mut buf = FrameBuffer::new();
            let mut bytes = [0u8; 4096];
            let mut served_prompt = false;
            loop {
                let n = match read.read(&mut bytes).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                for message in buf.push_messages(&bytes[..n]).into_iter().flatten() {
                    match message {
                        BridgeMessage::AiPromptRequest(m) => {
                            let chat = if served_prompt {
                                stop_choice("done")
                            } else {
                                served_prompt = true;
                                ChatResponse {
                                    choices: vec![Choice {
                                        message: AssistantMessage {
                                            content: Some(String::new()),
                                            tool_calls: Some(vec![ToolCall::new(
                                                "tc_push",
                                                "shell__execute",
                                                "{\"command\": \"echo approved-run\"}",
                                            )]),
                                        },
                                        finish_reason: Some("tool_calls".to_string()),
                                    }],
                                    usage: None,
                                }
                            };
                            let reply = BridgeMessage::CommandResponse(CommandResponseMsg::ok(
                                m.message_id,
                                None,
                                serde_json::to_value(&chat).unwrap(),
                            ));
                            write_message(&mut write, &reply).await.unwrap();
                        }
                        BridgeMessage::ApprovalRequest(m) => {
                            let reply = BridgeMessage::ApprovalResponse(ApprovalResponseMsg {
                                session_id: m.session_id,
                                tool_call_id: m.tool_call_id,
                                approval_id: 1,
                                choice: ApprovalChoice::Approve,
                                explanation: None,
                            });
                            write_message(&mut write, &reply).await.unwrap();
                        }
                        _ => {}
                    }
                }
            }
        });

        let mut session = SessionRecord::new(4, "gated", "xai:mock");
        session.spec.tools = vec![ToolGrant::Name("shell__execute".to_string())];
        session.push_message(ChatMessage::user("run it"));

        let core = child_core(tmp.path(), session).await;
        connect_and_pump(&core).await;
        let mut agent = AgentLoop::new(core.clone());
        agent.startup().await.unwrap();

        // tick 1: tool call appended, approval requested, session paused
        // (the scripted host may approve before we can observe PAUSED)
        assert_eq!(agent.tick().await.unwrap(), None);
        assert!(core.state.tool_states.is_running("tc_push"));
        {
            let mut sessions = core.state.sessions.lock().await;
            let record = sessions.get(4).unwrap();
            assert_eq!(record.unresolved_tool_calls().len(), 1);
            assert!(matches!(
                record.spec.status,
                SessionStatus::Paused | SessionStatus::Pending
            ));
        }

        // the host's approval response resumes the session and injects
        // external data; give the read pump a moment
        tokio::time::sleep(Duration::from_millis(200)).await;
        {
            let mut sessions = core.state.sessions.lock().await;
            let record = sessions.get(4).unwrap();
            assert_eq!(record.spec.status, SessionStatus::Pending);
        }

        // tick 2: PENDING→RUNNING, the stored state plus approval re-invoke
        // the tool, which now executes the original command
        assert_eq!(agent.tick().await.unwrap(), None);
        {
            let mut sessions = core.state.sessions.lock().await;
            let record = sessions.get(4).unwrap();
            let tool_msg = record
                .spec
                .messages
                .iter()
                .find(|m| m.role == Role::Tool)
                .expect("tool result appended");
            assert!(tool_msg.content.contains("approved-run"));
            assert!(!core.state.tool_states.is_running("tc_push"));
        }
    }

    #[test]
    fn truncation_marks_oversized_results() {
        let long = "x".repeat(MAX_TOOL_RESULT_CHARS + 10);
        let out = truncate_result(&long);
        assert!(out.ends_with("[truncated]"));
        assert!(out.chars().count() < long.chars().count() + 20);
        assert_eq!(truncate_result("short"), "short");
    }

    #[test]
    fn allowed_tools_drop_human_only_and_unknown_names() {
        let mut record = SessionRecord::new(9, "t", "xai:mock");
        record.spec.tools = vec![
            ToolGrant::Name("shell__execute".to_string()),
            ToolGrant::Name("session__list".to_string()), // human-only
            ToolGrant::Name("no_such__tool".to_string()),
            ToolGrant::Detailed {
                name: "fs__directory__list".to_string(),
                options: BTreeMap::new(),
            },
        ];

        // registry without a live state: metas only
        let mut registry = corral_infra::tools::ToolRegistry::new();
        for meta in corral_infra::tools::catalog::builtin_metas() {
            registry.register(corral_infra::tools::ToolDef::meta_only(meta));
        }

        let names: Vec<String> = record
            .spec
            .tools
            .iter()
            .filter_map(|g| registry.get(g.name()))
            .filter(|d| !d.meta.human_only)
            .map(|d| d.meta.name.clone())
            .collect();
        assert_eq!(names, vec!["shell__execute", "fs__directory__list"]);
    }
}
