//! The per-session child process.
//!
//! Connects to the host's per-session socket, installs the pause/stop signal
//! handlers, and drives the agent loop until the session reaches a terminal
//! status.

pub mod agent_loop;
pub mod bridge;
pub mod core;
pub mod dispatch;
pub mod outbox;
pub mod prompt;
pub mod tool_state;
pub mod tools;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use anyhow::{Context, Result};
use tokio::io::AsyncReadExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use corral_infra::allowlist::Allowlist;
use corral_infra::config::Configuration;
use corral_infra::framing::FrameBuffer;
use corral_infra::sessions::SessionStore;
use corral_shared::utils::cancel::CancelToken;

use crate::agent_loop::AgentLoop;
use crate::bridge::ChildBridge;
use crate::core::{ChildCore, ChildState};
use crate::tool_state::ToolStateMap;

const CONNECT_ATTEMPTS: usize = 30;
const RECONNECT_ATTEMPTS: usize = 10_000;

pub async fn run_agent(session_id: u64) -> Result<()> {
    let config = Configuration::create()?;
    let sessions = SessionStore::open(&config.sessions_dir);
    let global_allowlist = Allowlist::load(&config.allowlist_path()).unwrap_or_else(|e| {
        warn!(error = %e, "failed to load allowlist, starting empty");
        Allowlist::default()
    });

    let state = Arc::new(ChildState {
        bridge: ChildBridge::new(socket_path(&config, session_id)),
        session_id,
        sessions: Mutex::new(sessions),
        tool_states: ToolStateMap::new(),
        cancel: CancelToken::new(),
        pause_requested: AtomicBool::new(false),
        stop_requested: AtomicBool::new(false),
        global_allowlist,
        config,
    });
    let registry = tools::build_registry(state.clone());
    let core = ChildCore {
        state,
        registry: Arc::new(registry),
    };

    let reader = core
        .state
        .bridge
        .connect(CONNECT_ATTEMPTS)
        .await
        .context("could not reach the host daemon")?;
    info!(session_id, "connected to host");

    spawn_reader(core.clone(), reader);
    install_signal_handlers(core.state.clone())?;

    let exit = AgentLoop::new(core.clone()).run().await?;
    info!(session_id, ?exit, "agent loop finished");
    if exit == agent_loop::LoopExit::Failed {
        anyhow::bail!("session {session_id} failed");
    }
    Ok(())
}

/// The socket appears inside the sandbox under the workspace's own `db`
/// tree; fall back to the host-side path when the child was started outside
/// its workspace.
fn socket_path(config: &Configuration, session_id: u64) -> PathBuf {
    let relative = PathBuf::from("db")
        .join("sockets")
        .join(format!("{session_id}.sock"));
    if relative.exists() {
        relative
    } else {
        config.session_socket(session_id)
    }
}

/// Pump inbound frames into the dispatcher, reconnecting until a stop is
/// requested.
fn spawn_reader(core: ChildCore, initial: tokio::net::unix::OwnedReadHalf) {
    tokio::spawn(async move {
        let mut reader = initial;
        loop {
            read_until_eof(&core, &mut reader).await;
            core.state.bridge.disconnect().await;
            if core.state.stop_requested() {
                return;
            }
            warn!("connection to host lost, reconnecting");
            match core.state.bridge.connect(RECONNECT_ATTEMPTS).await {
                Ok(next) => reader = next,
                Err(e) => {
                    warn!(error = %e, "could not re-establish host connection");
                    core.state.request_stop();
                    return;
                }
            }
        }
    });
}

async fn read_until_eof(core: &ChildCore, reader: &mut tokio::net::unix::OwnedReadHalf) {
    let mut buf = FrameBuffer::new();
    let mut bytes = [0u8; 16 * 1024];
    loop {
        let n = match reader.read(&mut bytes).await {
            Ok(0) => return,
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "socket read error");
                return;
            }
        };
        for message in buf.push_messages(&bytes[..n]) {
            match message {
                Ok(m) => dispatch::handle_inbound(core, m).await,
                Err(e) => warn!(error = %e, "dropping malformed frame"),
            }
        }
    }
}

/// SIGUSR1 pauses, SIGUSR2 stops. Both abort in-flight work through the
/// shared cancel token; the agent loop applies the matching transition.
#[cfg(unix)]
fn install_signal_handlers(state: Arc<ChildState>) -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut usr1 = signal(SignalKind::user_defined1()).context("failed to register SIGUSR1")?;
    let mut usr2 = signal(SignalKind::user_defined2()).context("failed to register SIGUSR2")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = usr1.recv() => {
                    info!("received SIGUSR1, pausing");
                    state.request_pause();
                }
                _ = usr2.recv() => {
                    info!("received SIGUSR2, stopping");
                    state.request_stop();
                    return;
                }
            }
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn install_signal_handlers(_state: Arc<ChildState>) -> Result<()> {
    Ok(())
}
