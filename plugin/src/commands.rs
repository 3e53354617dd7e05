/// Command execution: the plugin decides *what* to do, the scripts do it.
///
/// Every operation is fire-and-forget.  Failures are logged here and never
/// reported back to the router; the next press is the retry.
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, info, warn};

use crate::config::CommandsConfig;
use crate::settings::{ResolvedApplication, WindowStyle};

/// Process control delegated outside the core.
pub trait CommandExecutor: Send + Sync {
    /// Starts the application.
    fn launch(
        &self,
        app: ResolvedApplication<'_>,
        window_style: WindowStyle,
        arguments: Option<&str>,
        elevated: bool,
    );
    /// Brings the application's window to the foreground.
    fn focus(&self, name: &str);
    /// Asks the application to close.
    fn close(&self, name: &str);
    /// Terminates every instance of the application.
    fn kill(&self, name: &str);
}

/// The PowerShell scripts shipped next to the plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Run,
    Focus,
    Close,
    Kill,
}

impl Script {
    fn file_name(self) -> &'static str {
        match self {
            Script::Run => "run.ps1",
            Script::Focus => "focus.ps1",
            Script::Close => "close.ps1",
            Script::Kill => "kill.ps1",
        }
    }
}

/// Parameters for `run.ps1`.
fn launch_parameters(
    app: ResolvedApplication<'_>,
    window_style: WindowStyle,
    arguments: Option<&str>,
    elevated: bool,
) -> Vec<String> {
    let mut params = vec!["-path".to_string(), app.path.to_string()];
    if window_style == WindowStyle::Closed {
        params.push("-closeWindow".to_string());
    } else {
        params.push("-WindowStyle".to_string());
        params.push(window_style.as_str().to_string());
    }
    if let Some(arguments) = arguments.filter(|a| !a.is_empty()) {
        params.push("-Arguments".to_string());
        params.push(arguments.to_string());
    }
    if elevated {
        params.push("-RunAsAdmin".to_string());
    }
    params
}

/// Parameters for the focus/close/kill scripts.
fn program_parameters(name: &str) -> Vec<String> {
    vec!["-program".to_string(), name.to_string()]
}

/// Runs the plugin's PowerShell scripts.
///
/// Shell and script directory come from the plugin config and can be swapped
/// at runtime with [`PowerShellRunner::update`].
pub struct PowerShellRunner {
    config: Arc<RwLock<CommandsConfig>>,
}

impl PowerShellRunner {
    pub fn new(config: CommandsConfig) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
        }
    }

    /// Applies reloaded command settings to every later invocation.
    pub fn update(&self, config: CommandsConfig) {
        *self.config.write() = config;
    }

    fn run(&self, script: Script, params: Vec<String>) {
        let (shell, scripts_dir) = {
            let config = self.config.read();
            (config.shell.clone(), config.resolved_scripts_dir())
        };
        spawn_script(shell, scripts_dir, script, params);
    }
}

fn spawn_script(shell: String, scripts_dir: PathBuf, script: Script, params: Vec<String>) {
    let file = script.file_name();
    let mut command = tokio::process::Command::new(&shell);
    command
        .args(["-ExecutionPolicy", "Bypass", "-File", file])
        .args(&params)
        .current_dir(&scripts_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(false);
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(e) => {
            error!(%shell, script = file, dir = %scripts_dir.display(), error = %e, "failed to start script");
            return;
        }
    };
    debug!(script = file, ?params, "script started");

    tokio::spawn(async move {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            if let Err(e) = pipe.read_to_string(&mut stderr).await {
                warn!(script = file, error = %e, "could not read script stderr");
            }
        }
        let stderr = stderr.trim();
        if !stderr.is_empty() {
            error!(script = file, ?params, stderr, "script reported an error");
        }
        match child.wait().await {
            Ok(status) if !status.success() => {
                warn!(script = file, ?params, %status, "script exited unsuccessfully");
            }
            Ok(_) => {}
            Err(e) => warn!(script = file, error = %e, "failed to wait for script"),
        }
    });
}

impl CommandExecutor for PowerShellRunner {
    fn launch(
        &self,
        app: ResolvedApplication<'_>,
        window_style: WindowStyle,
        arguments: Option<&str>,
        elevated: bool,
    ) {
        self.run(
            Script::Run,
            launch_parameters(app, window_style, arguments, elevated),
        );
    }

    fn focus(&self, name: &str) {
        self.run(Script::Focus, program_parameters(name));
    }

    fn close(&self, name: &str) {
        self.run(Script::Close, program_parameters(name));
    }

    fn kill(&self, name: &str) {
        self.run(Script::Kill, program_parameters(name));
    }
}

/// Logs what would have been executed.  Used with `--dry-run`.
pub struct DryRunExecutor;

impl CommandExecutor for DryRunExecutor {
    fn launch(
        &self,
        app: ResolvedApplication<'_>,
        window_style: WindowStyle,
        arguments: Option<&str>,
        elevated: bool,
    ) {
        info!(
            path = app.path,
            style = window_style.as_str(),
            arguments,
            elevated,
            "[dry-run] launch"
        );
    }

    fn focus(&self, name: &str) {
        info!(name, "[dry-run] focus");
    }

    fn close(&self, name: &str) {
        info!(name, "[dry-run] close");
    }

    fn kill(&self, name: &str) {
        info!(name, "[dry-run] kill");
    }
}
