//! Container/child lifecycle: workspace provisioning, child spawn, crash
//! recovery, and daemon shutdown.

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use corral_infra::fsutil::write_yaml;
use corral_infra::process::{is_process_alive, send_signal};
use corral_shared::schemas::session::{SessionAction, SessionStatus};
use corral_shared::utils::time::epoch_secs;

use crate::core::Core;
use crate::server;

/// Provision the workspace, bring the socket up, and spawn the child.
pub async fn spawn_session(core: &Core, session_id: u64) -> Result<()> {
    let mut record = {
        let mut sessions = core.state.sessions.lock().await;
        sessions
            .get(session_id)
            .ok_or_else(|| anyhow!("no such session: {session_id}"))?
    };

    let workspace = core.state.config.workspace_dir(session_id);
    for sub in ["db/sessions", "db/sockets"] {
        std::fs::create_dir_all(workspace.join(sub))
            .with_context(|| format!("failed to provision workspace for session {session_id}"))?;
    }

    record.spec.container_id = Some(format!("{session_id}_{}", epoch_secs()));
    // the sandbox's own copy of the record
    write_yaml(&core.state.config.workspace_session_file(session_id), &record)?;

    server::start_session_listener(core, session_id).await?;

    let exe = std::env::current_exe().context("failed to determine current executable")?;
    let mut command = tokio::process::Command::new(exe);
    command
        .arg("agent")
        .arg("--session")
        .arg(session_id.to_string())
        .current_dir(&workspace)
        .env("CORRAL_HOME", &core.state.config.home_dir)
        .stdin(std::process::Stdio::null())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::piped());

    // detach so children survive a daemon restart; pid == pgid afterwards
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = command
        .spawn()
        .with_context(|| format!("failed to spawn child for session {session_id}"))?;
    let pid = child
        .id()
        .ok_or_else(|| anyhow!("spawned child for session {session_id} has no pid"))?;

    record.spec.pid = Some(pid);
    {
        let mut sessions = core.state.sessions.lock().await;
        sessions.persist(record)?;
    }
    core.state.children.lock().await.insert(session_id, pid);
    info!(session_id, pid, "spawned session child");

    // forward the child's stderr and reap it on exit
    let core = core.clone();
    tokio::spawn(async move {
        if let Some(stderr) = child.stderr.take() {
            let mut reader = tokio::io::BufReader::new(stderr);
            tokio::spawn(async move {
                use tokio::io::AsyncBufReadExt;
                let mut line = String::new();
                loop {
                    line.clear();
                    match reader.read_line(&mut line).await {
                        Ok(0) | Err(_) => return,
                        Ok(_) => debug!(session_id, "[child] {}", line.trim_end()),
                    }
                }
            });
        }
        match child.wait().await {
            Ok(status) => info!(session_id, pid, code = ?status.code(), "child exited"),
            Err(e) => warn!(session_id, pid, error = %e, "child wait failed"),
        }
        core.state.children.lock().await.remove(&session_id);
    });

    Ok(())
}

/// Signal a session's child, looking the pid up from the live table first
/// and the record second.
pub async fn signal_child(core: &Core, session_id: u64, signal: i32) -> bool {
    let pid = {
        let children = core.state.children.lock().await;
        children.get(&session_id).copied()
    };
    let pid = match pid {
        Some(p) => Some(p),
        None => {
            let mut sessions = core.state.sessions.lock().await;
            sessions.get(session_id).and_then(|r| r.spec.pid)
        }
    };
    match pid {
        Some(p) if is_process_alive(p) => send_signal(p, signal),
        _ => false,
    }
}

pub async fn child_alive(core: &Core, session_id: u64) -> bool {
    if let Some(pid) = core.state.children.lock().await.get(&session_id) {
        return is_process_alive(*pid);
    }
    let mut sessions = core.state.sessions.lock().await;
    sessions
        .get(session_id)
        .and_then(|r| r.spec.pid)
        .is_some_and(is_process_alive)
}

/// Recovery scan, run once the collections are loaded and the socket server
/// is up: respawn dead children for sessions that expect one, re-listen for
/// survivors, and set stopped-but-live sessions running again. Terminal
/// sessions with no live child are left idle.
pub async fn recover(core: &Core) -> Result<()> {
    let records = {
        let mut sessions = core.state.sessions.lock().await;
        sessions.list_records(false)
    };

    for record in records {
        let session_id = record.id();
        let alive = record.spec.pid.is_some_and(is_process_alive);

        match record.spec.status {
            status if status.expects_child() => {
                if alive {
                    let pid = record.spec.pid.unwrap_or_default();
                    info!(session_id, pid, "recovered live child, re-listening");
                    core.state.children.lock().await.insert(session_id, pid);
                    server::start_session_listener(core, session_id).await?;
                } else {
                    info!(session_id, "child missing, respawning");
                    if let Err(e) = spawn_session(core, session_id).await {
                        warn!(session_id, error = %e, "respawn failed");
                    }
                }
            }
            SessionStatus::Stopped if alive => {
                info!(session_id, "stopped session has a live child, running it");
                let mut sessions = core.state.sessions.lock().await;
                if let Err(e) = sessions.transition(session_id, SessionAction::Run) {
                    warn!(session_id, %e, "run transition failed during recovery");
                }
                drop(sessions);
                let pid = record.spec.pid.unwrap_or_default();
                core.state.children.lock().await.insert(session_id, pid);
                server::start_session_listener(core, session_id).await?;
            }
            _ => {}
        }
    }
    Ok(())
}

/// Periodic sweep pruning children whose process died. Sessions that still
/// expect a child are only reported; respawning is the recovery scan's and
/// the human's business.
pub fn start_liveness_sweep(core: &Core, interval: std::time::Duration) {
    let core = core.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let dead: Vec<(u64, u32)> = {
                let children = core.state.children.lock().await;
                children
                    .iter()
                    .filter(|(_, pid)| !is_process_alive(**pid))
                    .map(|(s, p)| (*s, *p))
                    .collect()
            };
            for (session_id, pid) in dead {
                core.state.children.lock().await.remove(&session_id);
                let expects_child = {
                    let mut sessions = core.state.sessions.lock().await;
                    sessions
                        .get(session_id)
                        .is_some_and(|r| r.spec.status.expects_child())
                };
                if expects_child {
                    warn!(session_id, pid, "child died while its session is live");
                } else {
                    debug!(session_id, pid, "pruned exited child");
                }
            }
        }
    });
}

/// Daemon shutdown: close per-session sockets, terminate children, drop the
/// control socket and pid file.
pub async fn shutdown(core: &Core) {
    let children: Vec<(u64, u32)> = core
        .state
        .children
        .lock()
        .await
        .iter()
        .map(|(s, p)| (*s, *p))
        .collect();
    for (session_id, pid) in children {
        info!(session_id, pid, "terminating child");
        send_signal(pid, libc::SIGTERM);
    }

    let listeners: Vec<u64> = core.state.listeners.lock().await.iter().copied().collect();
    for session_id in listeners {
        let path = core.state.config.session_socket(session_id);
        let _ = std::fs::remove_file(path);
    }
    let _ = std::fs::remove_file(&core.state.config.control_socket);
    let _ = std::fs::remove_file(&core.state.config.pid_file);
    info!("daemon shut down");
}
