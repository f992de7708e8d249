//! Process configuration: home directory resolution, db layout, `config.yml`
//! settings, and `.env` loading for the host.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// When true, commands the allowlist does not approve fail instead of
    /// waiting for a human.
    #[serde(default)]
    pub unattended: bool,
    /// Session a bare command targets; 0 means "the host itself".
    #[serde(default)]
    pub current_session: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// Per-user allowlist file; defaults to `<home>/allowlist.yml`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowlist: Option<PathBuf>,
    /// Provider round-trips a session may spend before it is failed;
    /// unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub home_dir: PathBuf,
    pub db_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub workspaces_dir: PathBuf,
    pub groups_dir: PathBuf,
    pub approvals_dir: PathBuf,
    pub questions_dir: PathBuf,
    pub templates_dir: PathBuf,
    pub run_dir: PathBuf,
    pub control_socket: PathBuf,
    pub pid_file: PathBuf,
    pub settings: Settings,
}

impl Configuration {
    /// Resolve from the environment: `CORRAL_HOME` wins, else `~/.corral`.
    pub fn create() -> Result<Self> {
        let home_dir = if let Ok(home) = std::env::var("CORRAL_HOME") {
            if let Some(rest) = home.strip_prefix("~/") {
                dirs_next::home_dir()
                    .ok_or_else(|| anyhow!("cannot determine home directory"))?
                    .join(rest)
            } else {
                PathBuf::from(home)
            }
        } else {
            dirs_next::home_dir()
                .ok_or_else(|| anyhow!("cannot determine home directory"))?
                .join(".corral")
        };
        Self::for_home(home_dir)
    }

    pub fn for_home(home_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&home_dir)
            .with_context(|| format!("failed to create {}", home_dir.display()))?;

        let db_dir = home_dir.join("db");
        let run_dir = home_dir.join("run");
        let config = Self {
            sessions_dir: db_dir.join("sessions"),
            workspaces_dir: db_dir.join("workspaces"),
            groups_dir: db_dir.join("groups"),
            approvals_dir: db_dir.join("approvals"),
            questions_dir: db_dir.join("questions"),
            templates_dir: home_dir.join("agent").join("templates"),
            control_socket: run_dir.join("control.sock"),
            pid_file: run_dir.join("daemon.pid"),
            settings: load_settings(&home_dir.join("config.yml"))?,
            db_dir,
            run_dir,
            home_dir,
        };
        Ok(config)
    }

    /// Create every directory the daemon expects.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [
            &self.sessions_dir,
            &self.workspaces_dir,
            &self.groups_dir,
            &self.approvals_dir,
            &self.questions_dir,
            &self.templates_dir,
            &self.run_dir,
        ] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn allowlist_path(&self) -> PathBuf {
        self.settings
            .allowlist
            .clone()
            .unwrap_or_else(|| self.home_dir.join("allowlist.yml"))
    }

    // Per-session workspace layout. The host-side socket path is
    // `db/workspaces/<id>/db/sockets/<id>.sock`; inside the child's sandbox
    // the same tree appears under its working directory.

    pub fn workspace_dir(&self, session_id: u64) -> PathBuf {
        self.workspaces_dir.join(session_id.to_string())
    }

    pub fn workspace_session_file(&self, session_id: u64) -> PathBuf {
        self.workspace_dir(session_id)
            .join("db")
            .join("sessions")
            .join(format!("{session_id}.yml"))
    }

    pub fn session_socket(&self, session_id: u64) -> PathBuf {
        self.workspace_dir(session_id)
            .join("db")
            .join("sockets")
            .join(format!("{session_id}.sock"))
    }
}

fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_yaml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

/// Load `KEY=VALUE` pairs from a `.env` file into the process environment.
/// Lines starting with `#` and blank lines are ignored; existing variables
/// are not overwritten. Returns the number of variables set.
pub fn load_env_file(path: &Path) -> Result<usize> {
    if !path.exists() {
        return Ok(0);
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut applied = 0;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim().trim_matches('"').trim_matches('\'');
        if key.is_empty() || std::env::var_os(key).is_some() {
            continue;
        }
        // Single-threaded boot phase; no reader races with this write.
        unsafe { std::env::set_var(key, value) };
        applied += 1;
    }
    Ok(applied)
}
