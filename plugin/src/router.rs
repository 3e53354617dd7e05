/// Turns a classified gesture into at most one command for the key's application.
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::commands::CommandExecutor;
use crate::press::Gesture;
use crate::process_monitor::ProcessMonitor;
use crate::settings::{KeyConfiguration, RouteAction};

/// Command handed to the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Launch { elevated: bool },
    Focus,
    Close,
    Kill,
}

/// Why a gesture produced no command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Path, executable or name not set yet.
    IncompleteApplication,
    /// The gesture is mapped to `NONE`.
    NoAction,
    /// Focus/close/kill of an application that is not running.
    NotRunning,
    /// Elevated launch refused for a running single-instance application.
    AlreadyRunning,
    /// The process list could not be read.
    LivenessUnknown,
}

/// Outcome of [`ActionRouter::route`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Dispatched(Command),
    Skipped(Skip),
}

/// Decision table for a mapped action, given the current liveness.
pub fn decide(action: RouteAction, single_instance: bool, running: bool) -> Routed {
    let may_launch = !single_instance || !running;
    match action {
        RouteAction::None => Routed::Skipped(Skip::NoAction),
        RouteAction::Run if may_launch => Routed::Dispatched(Command::Launch { elevated: false }),
        RouteAction::Run => Routed::Dispatched(Command::Focus),
        RouteAction::RunAdmin if may_launch => {
            Routed::Dispatched(Command::Launch { elevated: true })
        }
        RouteAction::RunAdmin => Routed::Skipped(Skip::AlreadyRunning),
        RouteAction::Focus if running => Routed::Dispatched(Command::Focus),
        RouteAction::Close if running => Routed::Dispatched(Command::Close),
        RouteAction::Kill if running => Routed::Dispatched(Command::Kill),
        RouteAction::Focus | RouteAction::Close | RouteAction::Kill => {
            Routed::Skipped(Skip::NotRunning)
        }
    }
}

/// Routes gestures to the command executor.  Shared by every key.
pub struct ActionRouter {
    monitor: ProcessMonitor,
    executor: Arc<dyn CommandExecutor>,
}

impl ActionRouter {
    pub fn new(monitor: ProcessMonitor, executor: Arc<dyn CommandExecutor>) -> Self {
        Self { monitor, executor }
    }

    /// Dispatches whatever `gesture` maps to in `config`.
    ///
    /// Returns once the command has been handed off; its completion is not
    /// awaited.
    pub async fn route(&self, gesture: Gesture, config: &KeyConfiguration) -> Routed {
        let Some(app) = config.application.resolve() else {
            return Routed::Skipped(Skip::IncompleteApplication);
        };
        let action = config.action_for(gesture);
        if action == RouteAction::None {
            return Routed::Skipped(Skip::NoAction);
        }

        let running = match self.monitor.is_running(app.executable).await {
            Ok(running) => running,
            Err(e) => {
                warn!(%gesture, executable = app.executable, error = %e, "liveness unknown; gesture dropped");
                return Routed::Skipped(Skip::LivenessUnknown);
            }
        };

        let routed = decide(action, config.single_instance, running);
        match routed {
            Routed::Dispatched(command) => {
                info!(%gesture, ?action, ?command, executable = app.executable, "dispatching");
                match command {
                    Command::Launch { elevated } => self.executor.launch(
                        app,
                        config.window_style,
                        config.arguments.as_deref(),
                        elevated,
                    ),
                    Command::Focus => self.executor.focus(app.name),
                    Command::Close => self.executor.close(app.name),
                    Command::Kill => self.executor.kill(app.name),
                }
            }
            Routed::Skipped(reason) => {
                debug!(%gesture, ?action, ?reason, running, "nothing to do");
            }
        }
        routed
    }
}
