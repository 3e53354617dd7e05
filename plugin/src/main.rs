mod commands;
mod config;
mod controller;
mod error;
mod event;
mod host;
mod paths;
mod plugin;
mod press;
mod process_monitor;
mod router;
mod settings;
mod snapshot;
#[cfg(test)]
mod test_support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::commands::{CommandExecutor, DryRunExecutor, PowerShellRunner};
use crate::event::PluginEvent;
use crate::host::HostSink;
use crate::plugin::Plugin;
use crate::process_monitor::ProcessMonitor;
use crate::router::ActionRouter;
use crate::snapshot::SysinfoSource;

const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Launch, focus, close or kill an application from a single hardware key.
#[derive(Parser, Debug)]
#[command(name = "openclose-plugin", version, about)]
struct Args {
    /// Plugin config file [default: <app data>/OpenClose/config.toml]
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log commands instead of running them
    #[arg(long)]
    dry_run: bool,

    /// Log filter, e.g. `debug` or `openclose_plugin=trace`; RUST_LOG wins
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // ── Configuration ─────────────────────────────────────────────────────────
    let config_path = match args.config.clone() {
        Some(path) => path,
        None => paths::config_file_path()?,
    };
    if let Some(dir) = config_path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create config directory {}", dir.display()))?;
    }
    let (initial_config, config_error) = match config::load_or_default(&config_path) {
        Ok(config) => (config, None),
        Err(e) => (config::Config::default(), Some(e)),
    };

    // ── Logging ───────────────────────────────────────────────────────────────
    // stdout carries the host protocol, so logs go to stderr.
    let fallback = args
        .log_level
        .clone()
        .unwrap_or_else(|| initial_config.logging.filter.clone());
    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        dry_run = args.dry_run,
        "openclose-plugin starting"
    );
    if let Some(e) = config_error {
        error!(error = %format!("{e:#}"), "config unusable; using defaults");
    }

    // ── Core ──────────────────────────────────────────────────────────────────
    let monitor = ProcessMonitor::new(
        Arc::new(SysinfoSource::new()),
        initial_config.monitor.poll_interval(),
    );
    let runner = (!args.dry_run)
        .then(|| Arc::new(PowerShellRunner::new(initial_config.commands.clone())));
    let executor: Arc<dyn CommandExecutor> = match &runner {
        Some(runner) => Arc::clone(runner) as Arc<dyn CommandExecutor>,
        None => Arc::new(DryRunExecutor),
    };
    let router = Arc::new(ActionRouter::new(monitor.clone(), executor));

    let (sink, outbound_rx) = HostSink::new();
    let mut plugin = Plugin::new(monitor.clone(), router, Arc::new(sink));

    // ── Background tasks ──────────────────────────────────────────────────────
    let (event_tx, mut event_rx) = mpsc::channel::<PluginEvent>(64);

    tokio::spawn(config::watch_config(config_path, event_tx.clone()));
    {
        let tx = event_tx.clone();
        std::thread::spawn(move || host::read_messages(std::io::stdin().lock(), tx));
    }
    let writer = tokio::spawn(host::write_messages(outbound_rx, tokio::io::stdout()));

    // Graceful shutdown on Ctrl+C.
    {
        let tx = event_tx.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                let _ = tx.send(PluginEvent::Shutdown).await;
            }
        });
    }
    drop(event_tx);

    // ── Event loop ────────────────────────────────────────────────────────────
    let mut current_config = initial_config;
    while let Some(evt) = event_rx.recv().await {
        match evt {
            PluginEvent::Host(message) => plugin.handle(message),

            PluginEvent::ConfigReloaded(new_config) => {
                info!("config reloaded");
                monitor.set_poll_interval(new_config.monitor.poll_interval());
                if let Some(runner) = &runner {
                    runner.update(new_config.commands.clone());
                }
                if new_config.logging != current_config.logging {
                    warn!("logging filter changes take effect after a restart");
                }
                current_config = new_config;
            }

            PluginEvent::Shutdown => {
                info!("shutting down");
                break;
            }
        }
    }

    plugin.shutdown();
    // Dropping the last sink lets the writer drain and finish.
    drop(plugin);
    match tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await {
        Ok(Ok(Ok(_))) => {}
        Ok(Ok(Err(e))) => warn!(error = %e, "host writer failed"),
        Ok(Err(e)) => warn!(error = %e, "host writer task failed"),
        Err(_) => warn!("host writer did not drain in time"),
    }
    Ok(())
}
