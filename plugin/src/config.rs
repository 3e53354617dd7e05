use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::PluginEvent;
use crate::process_monitor::DEFAULT_POLL_INTERVAL_MS;

pub const MIN_POLL_INTERVAL_MS: u64 = 100;
pub const MAX_POLL_INTERVAL_MS: u64 = 60_000;
pub const DEFAULT_SHELL: &str = "powershell";
/// Resolved against the plugin executable's directory when relative.
pub const DEFAULT_SCRIPTS_DIR: &str = "scripts";
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Plugin-wide configuration.  Deserialized from `<app data>/OpenClose/config.toml`.
///
/// Per-key settings are not stored here; the host hands them over with
/// every key event.
#[derive(Debug, Default, Deserialize, Clone, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Process-liveness polling.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Time between two process-list snapshots. Clamped to [100, 60000].
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
        )
    }
}

/// How run/focus/close/kill scripts are invoked.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct CommandsConfig {
    /// Shell binary the scripts are handed to.
    #[serde(default = "default_shell")]
    pub shell: String,
    /// Directory holding `run.ps1`, `focus.ps1`, `close.ps1` and `kill.ps1`.
    #[serde(default = "default_scripts_dir")]
    pub scripts_dir: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            scripts_dir: DEFAULT_SCRIPTS_DIR.to_string(),
        }
    }
}

impl CommandsConfig {
    /// The scripts directory, anchored at the plugin executable's directory
    /// when configured as a relative path.
    pub fn resolved_scripts_dir(&self) -> PathBuf {
        let dir = PathBuf::from(&self.scripts_dir);
        if dir.is_absolute() {
            return dir;
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .map(|base| base.join(&dir))
            .unwrap_or(dir)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    /// `tracing` env-filter directive, overridden by `RUST_LOG` and `--log-level`.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

/// Reads the plugin config at `path`.  A missing file means defaults; a file
/// that exists but cannot be read or parsed is an error.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Re-parses the config whenever it is written and forwards the result as
/// [`PluginEvent::ConfigReloaded`].  Runs until the event channel closes.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<PluginEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!(error = %e, "failed to create config watcher");
            return;
        }
    };

    // Atomic saves replace the file, so the directory is what gets watched.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!(path = %path.display(), "config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        warn!(dir = %watch_dir.display(), error = %e, "not watching config directory");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        if !is_config_write(&event, &path) {
            continue;
        }
        match load_or_default(&path) {
            Ok(config) => {
                if tx.send(PluginEvent::ConfigReloaded(config)).await.is_err() {
                    break;
                }
            }
            Err(e) => error!(error = %format!("{e:#}"), "failed to reload config"),
        }
    }
}

fn is_config_write(event: &notify::Event, path: &Path) -> bool {
    let affects_config = event.paths.iter().any(|p| p == path);
    let is_write = matches!(
        event.kind,
        notify::EventKind::Create(_) | notify::EventKind::Modify(_)
    );
    affects_config && is_write
}

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

fn default_shell() -> String {
    DEFAULT_SHELL.to_string()
}

fn default_scripts_dir() -> String {
    DEFAULT_SCRIPTS_DIR.to_string()
}

fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_string()
}
