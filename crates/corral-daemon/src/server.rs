//! Socket servers: one listener per session for its child, plus the
//! well-known control socket for CLI clients.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use corral_infra::framing::{FrameBuffer, write_message};
use corral_shared::protocol::{BridgeMessage, CommandResponseMsg};

use crate::core::Core;
use crate::{bridge, dispatch};

/// Bind the per-session socket and accept its child. Idempotent per session.
pub async fn start_session_listener(core: &Core, session_id: u64) -> Result<()> {
    {
        let mut listeners = core.state.listeners.lock().await;
        if !listeners.insert(session_id) {
            return Ok(());
        }
    }

    let path = core.state.config.session_socket(session_id);
    let listener = bind_unix(&path)?;
    info!(session_id, path = %path.display(), "session socket listening");

    let core = core.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    handle_child_connection(core.clone(), session_id, stream);
                }
                Err(e) => {
                    warn!(session_id, error = %e, "accept failed on session socket");
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            }
        }
    });
    Ok(())
}

fn bind_unix(path: &Path) -> Result<UnixListener> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    // remove a stale socket from a previous run
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed stale socket"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("failed to remove {}", path.display()));
        }
    }
    UnixListener::bind(path).with_context(|| format!("failed to bind {}", path.display()))
}

/// Register the connection and pump both directions until EOF.
fn handle_child_connection(core: Core, session_id: u64, stream: UnixStream) {
    let (mut read, mut write) = stream.into_split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<BridgeMessage>();

    tokio::spawn(async move {
        bridge::register_connection(&core.state, session_id, out_tx.clone()).await;

        // outgoing pump
        let writer = tokio::spawn(async move {
            while let Some(message) = out_rx.recv().await {
                if let Err(e) = write_message(&mut write, &message).await {
                    debug!(session_id, error = %e, "write to child failed, closing pump");
                    break;
                }
            }
        });

        // incoming frames
        let mut buf = FrameBuffer::new();
        let mut bytes = [0u8; 16 * 1024];
        loop {
            let n = match read.read(&mut bytes).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!(session_id, error = %e, "read from child failed");
                    break;
                }
            };
            for message in buf.push_messages(&bytes[..n]) {
                match message {
                    Ok(m) => bridge::route_from_child(&core, session_id, m).await,
                    Err(e) => warn!(session_id, error = %e, "dropping malformed frame"),
                }
            }
        }

        bridge::remove_connection(&core.state, session_id, &out_tx).await;
        writer.abort();
    });
}

/// The CLI control channel: short-lived connections, one command each,
/// correlated by `requestId`. Everything arriving here is the human path.
pub async fn start_control_listener(core: &Core) -> Result<()> {
    let path = core.state.config.control_socket.clone();
    let listener = bind_unix(&path)?;
    info!(path = %path.display(), "control socket listening");

    let core = core.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    let core = core.clone();
                    tokio::spawn(async move {
                        handle_control_connection(core, stream).await;
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed on control socket");
                    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                }
            }
        }
    });
    Ok(())
}

async fn handle_control_connection(core: Core, stream: UnixStream) {
    let (mut read, mut write) = stream.into_split();
    let mut buf = FrameBuffer::new();
    let mut bytes = [0u8; 16 * 1024];

    loop {
        let n = match read.read(&mut bytes).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(_) => return,
        };
        for message in buf.push_messages(&bytes[..n]) {
            let response = match message {
                Ok(BridgeMessage::Command(mut cmd)) => {
                    // the control socket is the human channel by definition
                    cmd.human = true;
                    dispatch::execute_command(&core, cmd).await
                }
                Ok(other) => CommandResponseMsg::err(
                    None,
                    None,
                    format!("unexpected message type {} on control socket", other.type_name()),
                ),
                Err(e) => CommandResponseMsg::err(None, None, e.to_string()),
            };
            if let Err(e) =
                write_message(&mut write, &BridgeMessage::CommandResponse(response)).await
            {
                debug!(error = %e, "control client went away");
                return;
            }
        }
    }
}
