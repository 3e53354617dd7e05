/// Per-key settings as the host stores them for each button instance.
///
/// Field names follow the host's camelCase JSON.  Every field has a default so
/// that a freshly dropped key with an empty settings object still
/// deserializes; such a key has no application yet and is left alone until
/// the user picks one.
use serde::{Deserialize, Serialize};

use crate::press::Gesture;

pub const DEFAULT_SHORT_PRESS_THRESHOLD_MS: u64 = 200;
pub const DEFAULT_LONG_PRESS_THRESHOLD_MS: u64 = 500;

/// What a gesture should do with the configured application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RouteAction {
    #[default]
    None,
    /// Launch, or focus when single-instance and already running.
    Run,
    /// Launch elevated. Never falls back to focus.
    RunAdmin,
    Focus,
    /// Ask the application to close gracefully.
    Close,
    /// Force-terminate every instance.
    Kill,
}

/// Window style passed to the launcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowStyle {
    #[default]
    Normal,
    Maximized,
    Hidden,
    /// Launch, then close the main window (tray applications).
    Closed,
}

impl WindowStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            WindowStyle::Normal => "Normal",
            WindowStyle::Maximized => "Maximized",
            WindowStyle::Hidden => "Hidden",
            WindowStyle::Closed => "Closed",
        }
    }
}

/// Identity of the target application as picked in the property inspector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Application {
    /// Full path to the executable, used for launching.
    pub path: Option<String>,
    /// Executable file name (e.g. `notepad.exe`), matched against the process list.
    pub executable: Option<String>,
    /// Program name handed to the focus/close/kill scripts.
    pub name: Option<String>,
}

/// An [`Application`] whose three identity fields are all present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedApplication<'a> {
    pub path: &'a str,
    pub executable: &'a str,
    pub name: &'a str,
}

impl Application {
    /// Returns the identity only when path, executable and name are all
    /// non-empty.  Empty strings count as missing.
    pub fn resolve(&self) -> Option<ResolvedApplication<'_>> {
        fn present(field: &Option<String>) -> Option<&str> {
            field.as_deref().filter(|s| !s.is_empty())
        }

        Some(ResolvedApplication {
            path: present(&self.path)?,
            executable: present(&self.executable)?,
            name: present(&self.name)?,
        })
    }
}

/// Images for the two visual states, as data URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IconPair {
    pub off: Option<String>,
    pub on: Option<String>,
}

impl IconPair {
    /// Both images, or `None` if either one is missing.
    pub fn both(&self) -> Option<(&str, &str)> {
        match (self.off.as_deref(), self.on.as_deref()) {
            (Some(off), Some(on)) if !off.is_empty() && !on.is_empty() => Some((off, on)),
            _ => None,
        }
    }
}

/// Full configuration of one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyConfiguration {
    pub application: Application,
    /// Extra command-line arguments for launching.
    pub arguments: Option<String>,
    /// Focus the running instance instead of starting another one.
    pub single_instance: bool,
    pub window_style: WindowStyle,
    pub short_press_action: RouteAction,
    pub double_press_action: RouteAction,
    pub long_press_action: RouteAction,
    /// Window after the last release in which a further press still counts
    /// towards a double press, in milliseconds.
    pub short_press_threshold: u64,
    /// How long the key must be held to count as a long press, in milliseconds.
    pub long_press_threshold: u64,
    /// Reflect the application's running state on the key.
    pub monitor: bool,
    pub icon: IconPair,
}

impl Default for KeyConfiguration {
    fn default() -> Self {
        Self {
            application: Application::default(),
            arguments: None,
            single_instance: true,
            window_style: WindowStyle::Normal,
            short_press_action: RouteAction::Run,
            double_press_action: RouteAction::None,
            long_press_action: RouteAction::Close,
            short_press_threshold: DEFAULT_SHORT_PRESS_THRESHOLD_MS,
            long_press_threshold: DEFAULT_LONG_PRESS_THRESHOLD_MS,
            monitor: true,
            icon: IconPair::default(),
        }
    }
}

impl KeyConfiguration {
    /// The action mapped to `gesture`.
    pub fn action_for(&self, gesture: Gesture) -> RouteAction {
        match gesture {
            Gesture::Short => self.short_press_action,
            Gesture::Double => self.double_press_action,
            Gesture::Long => self.long_press_action,
        }
    }

    /// The executable to watch, if this key wants monitoring and is fully set up.
    pub fn monitored_executable(&self) -> Option<&str> {
        if !self.monitor {
            return None;
        }
        self.application.resolve().map(|app| app.executable)
    }
}
