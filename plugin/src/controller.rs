/// One controller per visible key.
///
/// A controller feeds key-down/up events to its [`PressClassifier`], routes
/// the resulting gestures through the shared [`ActionRouter`], and mirrors
/// the target application's liveness onto the key's two visual states.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::press::{Gesture, PressClassifier};
use crate::process_monitor::{Liveness, ProcessMonitor};
use crate::router::ActionRouter;
use crate::settings::KeyConfiguration;

/// The key's two visual states; the discriminant is the host's state index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    Off = 0,
    On = 1,
}

impl KeyState {
    pub fn index(self) -> u8 {
        self as u8
    }
}

impl From<bool> for KeyState {
    fn from(running: bool) -> Self {
        if running {
            KeyState::On
        } else {
            KeyState::Off
        }
    }
}

impl From<Liveness> for KeyState {
    fn from(event: Liveness) -> Self {
        match event {
            Liveness::Started => KeyState::On,
            Liveness::Stopped => KeyState::Off,
        }
    }
}

/// Where visual updates for a key go.
pub trait VisualStateSink: Send + Sync {
    fn set_state(&self, instance_id: &str, state: KeyState);
    /// Installs the images shown for [`KeyState::Off`] and [`KeyState::On`].
    fn set_images(&self, instance_id: &str, off: &str, on: &str);
}

struct Shared {
    instance_id: String,
    settings: Mutex<KeyConfiguration>,
    /// Executable being watched, including while the initial sync is pending.
    watched: Mutex<Option<String>>,
    /// Bumped (under `watched`) whenever monitoring starts or stops.  Initial
    /// syncs and observers remember the epoch they belong to and go quiet
    /// once it changes.
    epoch: AtomicU64,
    monitor: ProcessMonitor,
    sink: Arc<dyn VisualStateSink>,
}

impl Shared {
    fn stop_monitoring(&self) {
        let mut watched = self.watched.lock();
        self.epoch.fetch_add(1, Ordering::SeqCst);
        if let Some(executable) = watched.take() {
            self.monitor.unsubscribe(&executable, &self.instance_id);
            debug!(instance = %self.instance_id, %executable, "monitoring stopped");
        }
        self.sink.set_state(&self.instance_id, KeyState::Off);
    }
}

/// Controller for one key instance.
pub struct KeyController {
    shared: Arc<Shared>,
    classifier: PressClassifier,
    router_task: JoinHandle<()>,
}

impl KeyController {
    pub fn new(
        instance_id: String,
        monitor: ProcessMonitor,
        router: Arc<ActionRouter>,
        sink: Arc<dyn VisualStateSink>,
    ) -> Self {
        let shared = Arc::new(Shared {
            instance_id,
            settings: Mutex::new(KeyConfiguration::default()),
            watched: Mutex::new(None),
            epoch: AtomicU64::new(0),
            monitor,
            sink,
        });

        let (gesture_tx, gesture_rx) = mpsc::unbounded_channel();
        let router_task = tokio::spawn(route_gestures(Arc::clone(&shared), router, gesture_rx));

        Self {
            shared,
            classifier: PressClassifier::new(gesture_tx),
            router_task,
        }
    }

    /// Executable this key is subscribed to (or about to be).
    pub fn watched(&self) -> Option<String> {
        self.shared.watched.lock().clone()
    }

    pub fn key_down(&self, config: KeyConfiguration) {
        let threshold = Duration::from_millis(config.long_press_threshold);
        *self.shared.settings.lock() = config;
        self.classifier.key_down(threshold);
    }

    pub fn key_up(&self, config: KeyConfiguration) {
        let threshold = Duration::from_millis(config.short_press_threshold);
        *self.shared.settings.lock() = config;
        self.classifier.key_up(threshold);
    }

    /// The key became visible.
    pub fn appear(&self, config: KeyConfiguration) {
        self.apply_icons(&config);
        let executable = config.monitored_executable().map(str::to_string);
        *self.shared.settings.lock() = config;

        if let Some(executable) = executable {
            self.start_monitoring(executable);
        }
    }

    /// The key is going away; nothing it started may outlive this call.
    pub fn disappear(&self) {
        self.classifier.reset();
        self.shared.stop_monitoring();
    }

    /// New settings arrived for a visible key.
    pub fn update(&self, config: KeyConfiguration) {
        self.apply_icons(&config);
        let desired = config.monitored_executable().map(str::to_string);
        *self.shared.settings.lock() = config;

        match desired {
            None => self.shared.stop_monitoring(),
            Some(executable) => {
                if self.watched().as_deref() != Some(executable.as_str()) {
                    self.start_monitoring(executable);
                }
            }
        }
    }

    fn apply_icons(&self, config: &KeyConfiguration) {
        if let Some((off, on)) = config.icon.both() {
            self.shared.sink.set_images(&self.shared.instance_id, off, on);
        }
    }

    /// Queries liveness once for the initial state, then subscribes.
    fn start_monitoring(&self, executable: String) {
        let epoch = {
            let mut watched = self.shared.watched.lock();
            if let Some(previous) = watched.take() {
                self.shared.monitor.unsubscribe(&previous, &self.shared.instance_id);
            }
            *watched = Some(executable.clone());
            self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1
        };
        debug!(instance = %self.shared.instance_id, %executable, "monitoring started");

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let running = shared.monitor.is_running(&executable).await;

            let _watched = shared.watched.lock();
            if shared.epoch.load(Ordering::SeqCst) != epoch {
                trace!(instance = %shared.instance_id, "initial sync superseded");
                return;
            }
            match running {
                Ok(running) => shared.sink.set_state(&shared.instance_id, running.into()),
                // The first poll tick will report it if it is running.
                Err(e) => warn!(instance = %shared.instance_id, error = %e, "initial liveness unknown"),
            }

            let observer_shared = Arc::clone(&shared);
            shared
                .monitor
                .subscribe(&executable, &shared.instance_id, move |event| {
                    if observer_shared.epoch.load(Ordering::SeqCst) != epoch {
                        return;
                    }
                    observer_shared
                        .sink
                        .set_state(&observer_shared.instance_id, event.into());
                });
        });
    }
}

impl Drop for KeyController {
    fn drop(&mut self) {
        self.router_task.abort();
    }
}

async fn route_gestures(
    shared: Arc<Shared>,
    router: Arc<ActionRouter>,
    mut gestures: mpsc::UnboundedReceiver<Gesture>,
) {
    while let Some(gesture) = gestures.recv().await {
        let config = shared.settings.lock().clone();
        let routed = router.route(gesture, &config).await;
        trace!(instance = %shared.instance_id, %gesture, ?routed, "gesture routed");
    }
}
