//! Child side of the duplex channel.
//!
//! One outbound connection to the host's per-session socket. Requests carry
//! a per-process monotonic integer `messageId` and park a resolver until the
//! matching `command_response` arrives or the deadline fires.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use tokio::net::UnixStream;
use tokio::net::unix::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use corral_infra::framing::write_message;
use corral_shared::protocol::{BridgeMessage, CommandResponseMsg, MessageId};
use corral_shared::utils::cancel::CancelToken;

use crate::outbox::Outbox;

/// Round-trip deadline for ordinary host↔child requests.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Provider completions get a far longer leash than control traffic.
pub const AI_PROMPT_TIMEOUT: Duration = Duration::from_secs(120);

const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(500);

pub struct ChildBridge {
    socket_path: PathBuf,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<CommandResponseMsg>>>,
    outbox: Mutex<Outbox>,
    seq: AtomicU64,
}

impl ChildBridge {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
            writer: tokio::sync::Mutex::new(None),
            pending: Mutex::new(HashMap::new()),
            outbox: Mutex::new(Outbox::new()),
            seq: AtomicU64::new(0),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Connect, retrying while the host brings the listener up. Returns the
    /// read half; the write half is kept for outbound traffic.
    pub async fn connect(&self, max_attempts: usize) -> Result<OwnedReadHalf> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match UnixStream::connect(&self.socket_path).await {
                Ok(stream) => {
                    let (read, write) = stream.into_split();
                    {
                        // hold the writer lock while flushing so emit()
                        // cannot enqueue behind an already-drained outbox
                        let mut guard = self.writer.lock().await;
                        let mut write = write;
                        let queued: Vec<BridgeMessage> =
                            self.outbox.lock().unwrap().drain();
                        for message in &queued {
                            if let Err(e) = write_message(&mut write, message).await {
                                warn!(error = %e, "failed to flush queued message");
                            }
                        }
                        *guard = Some(write);
                    }
                    debug!(path = %self.socket_path.display(), attempt, "connected to host socket");
                    return Ok(read);
                }
                Err(e) if attempt < max_attempts => {
                    debug!(attempt, error = %e, "host socket not ready, retrying");
                    tokio::time::sleep(CONNECT_RETRY_DELAY).await;
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!(
                            "failed to connect to host socket {} after {attempt} attempts",
                            self.socket_path.display()
                        )
                    });
                }
            }
        }
    }

    /// Drop the writer and fail every parked request. Called when the reader
    /// observes EOF so a reconnect starts clean.
    pub async fn disconnect(&self) {
        *self.writer.lock().await = None;
        let drained: Vec<_> = {
            let mut pending = self.pending.lock().unwrap();
            pending.drain().collect()
        };
        for (id, tx) in drained {
            let _ = tx.send(CommandResponseMsg::err(
                Some(MessageId::Seq(id)),
                None,
                "connection to host lost",
            ));
        }
    }

    /// Write now or fail; used for correlated traffic with its own deadline.
    pub async fn send(&self, message: &BridgeMessage) -> Result<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| anyhow!("not connected to host"))?;
        write_message(writer, message).await
    }

    /// Fire-and-forget write that queues while the connection is down and
    /// drains on reconnect. Human-input requests ride this path so a
    /// reconnect window cannot swallow them.
    pub async fn emit(&self, message: BridgeMessage) -> Result<()> {
        let mut guard = self.writer.lock().await;
        match guard.as_mut() {
            Some(writer) => write_message(writer, &message).await,
            None => {
                debug!(r#type = message.type_name(), "not connected, queueing message");
                self.outbox.lock().unwrap().enqueue(message);
                Ok(())
            }
        }
    }

    /// Allocate a `messageId`, send, and suspend until the matched response,
    /// the deadline, or cancellation.
    pub async fn request(
        &self,
        mut message: BridgeMessage,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<CommandResponseMsg> {
        let id = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        set_message_id(&mut message, MessageId::Seq(id));

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        if let Err(e) = self.send(&message).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(e);
        }

        tokio::select! {
            outcome = tokio::time::timeout(timeout, rx) => match outcome {
                Ok(Ok(response)) => Ok(response),
                Ok(Err(_)) => {
                    self.pending.lock().unwrap().remove(&id);
                    bail!("response channel closed for message {id}")
                }
                Err(_) => {
                    self.pending.lock().unwrap().remove(&id);
                    bail!(
                        "{} round-trip timed out after {}s",
                        message.type_name(),
                        timeout.as_secs()
                    )
                }
            },
            _ = cancel.cancelled() => {
                self.pending.lock().unwrap().remove(&id);
                bail!("request cancelled")
            }
        }
    }

    /// Resolve a parked request from the read loop. Unmatched responses are
    /// logged and dropped.
    pub fn resolve(&self, response: CommandResponseMsg) {
        let Some(MessageId::Seq(id)) = response.message_id else {
            warn!(?response.message_id, "response without a usable messageId");
            return;
        };
        match self.pending.lock().unwrap().remove(&id) {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => warn!(message_id = id, "no pending request for response"),
        }
    }
}

fn set_message_id(message: &mut BridgeMessage, id: MessageId) {
    match message {
        BridgeMessage::ToolCall(m) => m.message_id = Some(id),
        BridgeMessage::AiPromptRequest(m) => m.message_id = Some(id),
        BridgeMessage::Command(m) => m.message_id = Some(id),
        BridgeMessage::CommandResponse(m) => m.message_id = Some(id),
        _ => {}
    }
}
