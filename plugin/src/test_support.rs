/// Fakes for the plugin's collaborators, shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::commands::CommandExecutor;
use crate::controller::{KeyState, VisualStateSink};
use crate::error::{Error, Result};
use crate::settings::{ResolvedApplication, WindowStyle};
use crate::snapshot::ProcessSnapshotSource;

/// Snapshot source that plays back queued answers, then repeats a steady
/// process list.
#[derive(Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Option<Vec<String>>>>,
    steady: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues one successful answer.
    pub fn push(&self, names: &[&str]) {
        self.script
            .lock()
            .push_back(Some(names.iter().map(|n| n.to_string()).collect()));
    }

    /// Queues one failed query.
    pub fn push_failure(&self) {
        self.script.lock().push_back(None);
    }

    /// Answer given once the queue is empty.
    pub fn set_running(&self, names: &[&str]) {
        *self.steady.lock() = names.iter().map(|n| n.to_string()).collect();
    }

    /// Makes every query take `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessSnapshotSource for ScriptedSource {
    async fn query(&self) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().pop_front();
        match next {
            Some(Some(names)) => Ok(names),
            Some(None) => Err(Error::Snapshot("scripted failure".to_string())),
            None => Ok(self.steady.lock().clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutorCall {
    Launch {
        path: String,
        style: WindowStyle,
        arguments: Option<String>,
        elevated: bool,
    },
    Focus(String),
    Close(String),
    Kill(String),
}

/// Executor that only remembers what it was asked to do.
#[derive(Default)]
pub struct RecordingExecutor {
    calls: Mutex<Vec<ExecutorCall>>,
}

impl RecordingExecutor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<ExecutorCall> {
        self.calls.lock().clone()
    }
}

impl CommandExecutor for RecordingExecutor {
    fn launch(
        &self,
        app: ResolvedApplication<'_>,
        window_style: WindowStyle,
        arguments: Option<&str>,
        elevated: bool,
    ) {
        self.calls.lock().push(ExecutorCall::Launch {
            path: app.path.to_string(),
            style: window_style,
            arguments: arguments.map(str::to_string),
            elevated,
        });
    }

    fn focus(&self, name: &str) {
        self.calls.lock().push(ExecutorCall::Focus(name.to_string()));
    }

    fn close(&self, name: &str) {
        self.calls.lock().push(ExecutorCall::Close(name.to_string()));
    }

    fn kill(&self, name: &str) {
        self.calls.lock().push(ExecutorCall::Kill(name.to_string()));
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    State(String, KeyState),
    Images(String),
}

/// Visual sink that records every update.
#[derive(Default)]
pub struct RecordingSink {
    calls: Mutex<Vec<SinkCall>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().clone()
    }

    /// States pushed for `instance_id`, in order.
    pub fn states(&self, instance_id: &str) -> Vec<KeyState> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                SinkCall::State(id, state) if id == instance_id => Some(*state),
                _ => None,
            })
            .collect()
    }

    pub fn last_state(&self, instance_id: &str) -> Option<KeyState> {
        self.states(instance_id).last().copied()
    }
}

impl VisualStateSink for RecordingSink {
    fn set_state(&self, instance_id: &str, state: KeyState) {
        self.calls
            .lock()
            .push(SinkCall::State(instance_id.to_string(), state));
    }

    fn set_images(&self, instance_id: &str, _off: &str, _on: &str) {
        self.calls.lock().push(SinkCall::Images(instance_id.to_string()));
    }
}
