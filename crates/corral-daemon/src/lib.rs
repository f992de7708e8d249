//! The host daemon: owns templates, credentials, sockets, and CLI control.

pub mod approvals;
pub mod bridge;
pub mod core;
pub mod dispatch;
pub mod providers;
pub mod server;
pub mod supervisor;
pub mod tools;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use corral_infra::config::{Configuration, load_env_file};
use corral_infra::process::is_process_alive;

pub async fn run_daemon() -> Result<()> {
    let config = Configuration::create()?;
    config.ensure_layout()?;

    // credentials and endpoints; read in this process only
    match load_env_file(&config.home_dir.join(".env")) {
        Ok(0) => {}
        Ok(n) => info!(count = n, "loaded environment from .env"),
        Err(e) => warn!(error = %e, "failed to load .env"),
    }

    claim_pid_file(&config)?;

    let core = core::boot(config)?;
    bridge::watch_transitions(&core);
    server::start_control_listener(&core).await?;
    supervisor::recover(&core).await?;
    supervisor::start_liveness_sweep(&core, std::time::Duration::from_secs(60));
    info!(
        home = %core.state.config.home_dir.display(),
        "daemon ready"
    );

    wait_for_shutdown().await;
    supervisor::shutdown(&core).await;
    Ok(())
}

/// Refuse to start beside a live daemon; adopt a stale pid file otherwise.
fn claim_pid_file(config: &Configuration) -> Result<()> {
    if let Ok(text) = std::fs::read_to_string(&config.pid_file)
        && let Ok(pid) = text.trim().parse::<u32>()
        && pid != std::process::id()
        && is_process_alive(pid)
    {
        bail!(
            "daemon already running with pid {pid} (pid file {})",
            config.pid_file.display()
        );
    }
    std::fs::write(&config.pid_file, std::process::id().to_string())
        .with_context(|| format!("failed to write {}", config.pid_file.display()))
}

async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM");
        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("received Ctrl+C");
    }
}
