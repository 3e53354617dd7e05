/// Host entry points.  Owns one [`KeyController`] per visible key; the
/// process monitor and router behind them are shared.
use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::controller::{KeyController, VisualStateSink};
use crate::host::{HostEvent, HostMessage};
use crate::process_monitor::ProcessMonitor;
use crate::router::ActionRouter;
use crate::settings::KeyConfiguration;

pub struct Plugin {
    monitor: ProcessMonitor,
    router: Arc<ActionRouter>,
    sink: Arc<dyn VisualStateSink>,
    keys: HashMap<String, KeyController>,
}

impl Plugin {
    pub fn new(
        monitor: ProcessMonitor,
        router: Arc<ActionRouter>,
        sink: Arc<dyn VisualStateSink>,
    ) -> Self {
        Self {
            monitor,
            router,
            sink,
            keys: HashMap::new(),
        }
    }

    /// Dispatches one decoded host message.
    pub fn handle(&mut self, message: HostMessage) {
        let HostMessage {
            event,
            context,
            payload,
        } = message;
        match event {
            HostEvent::KeyDown => self.on_key_down(&context, payload.settings),
            HostEvent::KeyUp => self.on_key_up(&context, payload.settings),
            HostEvent::WillAppear => self.on_key_will_appear(&context, payload.settings),
            HostEvent::WillDisappear => self.on_key_will_disappear(&context),
            HostEvent::DidReceiveSettings => {
                self.on_configuration_changed(&context, payload.settings)
            }
            HostEvent::Other => debug!(instance = %context, "unhandled host event"),
        }
    }

    pub fn on_key_down(&mut self, instance_id: &str, config: KeyConfiguration) {
        self.key(instance_id).key_down(config);
    }

    pub fn on_key_up(&mut self, instance_id: &str, config: KeyConfiguration) {
        self.key(instance_id).key_up(config);
    }

    pub fn on_key_will_appear(&mut self, instance_id: &str, config: KeyConfiguration) {
        self.key(instance_id).appear(config);
    }

    pub fn on_key_will_disappear(&mut self, instance_id: &str) {
        if let Some(key) = self.keys.remove(instance_id) {
            key.disappear();
            debug!(instance = instance_id, keys = self.keys.len(), "key removed");
        }
    }

    pub fn on_configuration_changed(&mut self, instance_id: &str, config: KeyConfiguration) {
        self.key(instance_id).update(config);
    }

    /// Tears every key down and stops polling.
    pub fn shutdown(&mut self) {
        for (_, key) in self.keys.drain() {
            key.disappear();
        }
        self.monitor.shutdown();
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }

    fn key(&mut self, instance_id: &str) -> &KeyController {
        self.keys
            .entry(instance_id.to_string())
            .or_insert_with(|| {
                debug!(instance = instance_id, "key added");
                KeyController::new(
                    instance_id.to_string(),
                    self.monitor.clone(),
                    Arc::clone(&self.router),
                    Arc::clone(&self.sink),
                )
            })
    }
}
