use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace, warn};

use crate::error::Result;
use crate::snapshot::ProcessSnapshotSource;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Change in a watched executable's observed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Started,
    Stopped,
}

/// Callback registered by one key for one executable.
pub type Observer = Arc<dyn Fn(Liveness) + Send + Sync>;

/// Subscribers of a single executable, keyed by key instance id.  Shared by
/// `Arc` so a tick can notify from a stable snapshot while the registry is
/// being edited.
type Subscribers = Arc<HashMap<String, Observer>>;

#[derive(Default)]
struct Registry {
    observers: HashMap<String, Subscribers>,
    /// Watched executables seen running on the last successful tick.
    cache: HashSet<String>,
    poller: Option<JoinHandle<()>>,
    /// Bumped whenever the poll loop starts or stops; ticks from an older
    /// loop are discarded.
    generation: u64,
}

impl Registry {
    /// Replaces the cache with the watched subset of `names` and returns the
    /// changes that follow from the difference.
    fn diff(&mut self, names: Vec<String>) -> Vec<(String, Liveness)> {
        // Filtering through a set also de-duplicates multi-instance processes.
        let current: HashSet<String> = names
            .into_iter()
            .filter(|name| self.observers.contains_key(name))
            .collect();

        let mut changes: Vec<(String, Liveness)> = current
            .difference(&self.cache)
            .map(|exe| (exe.clone(), Liveness::Started))
            .collect();
        changes.extend(
            self.cache
                .difference(&current)
                .map(|exe| (exe.clone(), Liveness::Stopped)),
        );

        self.cache = current;
        changes
    }
}

struct Inner {
    source: Arc<dyn ProcessSnapshotSource>,
    interval: Mutex<Duration>,
    registry: Mutex<Registry>,
}

impl Inner {
    async fn poll_once(&self, generation: u64) {
        let names = match self.source.query().await {
            Ok(names) => names,
            Err(e) => {
                // Keep the cache: a failed read says nothing about what stopped.
                warn!(error = %e, "process snapshot failed; skipping tick");
                return;
            }
        };

        let changes = {
            let mut registry = self.registry.lock();
            if registry.generation != generation {
                trace!(generation, "tick from a stopped poll loop ignored");
                return;
            }
            registry.diff(names)
        };

        // Observers run without the registry lock so they may (un)subscribe.
        // Subscribers are looked up per executable, so an observer that drops
        // another key's subscription silences it for the rest of the tick.
        for (exe, event) in changes {
            let subscribers = {
                let registry = self.registry.lock();
                if registry.generation != generation {
                    return;
                }
                registry.observers.get(&exe).map(Arc::clone)
            };
            let Some(subscribers) = subscribers else {
                continue;
            };
            debug!(executable = %exe, ?event, subscribers = subscribers.len(), "liveness changed");
            for observer in subscribers.values() {
                observer(event);
            }
        }
    }
}

/// Polls the OS process list every poll interval and notifies subscribers
/// whenever one of their executables appears or disappears.
///
/// A single poll loop serves every subscriber, however many keys watch
/// however many executables.  It runs only while at least one subscription
/// exists.  Cloning yields another handle to the same monitor.
#[derive(Clone)]
pub struct ProcessMonitor {
    inner: Arc<Inner>,
}

impl ProcessMonitor {
    pub fn new(source: Arc<dyn ProcessSnapshotSource>, poll_interval: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                interval: Mutex::new(poll_interval),
                registry: Mutex::new(Registry::default()),
            }),
        }
    }

    /// Registers `observer` for `executable` on behalf of `instance_id`,
    /// replacing any observer the same instance already had there.  Starts
    /// polling if it was not running.
    pub fn subscribe<F>(&self, executable: &str, instance_id: &str, observer: F)
    where
        F: Fn(Liveness) + Send + Sync + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let subscribers = registry
            .observers
            .entry(executable.to_string())
            .or_default();
        Arc::make_mut(subscribers).insert(instance_id.to_string(), Arc::new(observer));
        debug!(executable, instance_id, "subscribed");

        if registry.poller.is_none() {
            self.start_polling(&mut registry);
        }
    }

    /// Removes the observer `instance_id` registered for `executable`.
    /// Stops polling and clears the cache once nothing is watched anymore.
    pub fn unsubscribe(&self, executable: &str, instance_id: &str) {
        let mut registry = self.inner.registry.lock();
        let Some(subscribers) = registry.observers.get(executable) else {
            return;
        };
        if !subscribers.contains_key(instance_id) {
            return;
        }

        let remaining: HashMap<String, Observer> = subscribers
            .iter()
            .filter(|(id, _)| id.as_str() != instance_id)
            .map(|(id, observer)| (id.clone(), Arc::clone(observer)))
            .collect();

        if remaining.is_empty() {
            registry.observers.remove(executable);
            registry.cache.remove(executable);
        } else {
            registry.observers.insert(executable.to_string(), Arc::new(remaining));
        }
        debug!(executable, instance_id, "unsubscribed");

        if registry.observers.is_empty() {
            self.stop_polling(&mut registry);
        }
    }

    /// Asks the snapshot source directly whether `executable` is running.
    pub async fn is_running(&self, executable: &str) -> Result<bool> {
        let names = self.inner.source.query().await?;
        Ok(names.iter().any(|name| name == executable))
    }

    /// Changes the poll interval.  A running poll loop is restarted on the
    /// new interval; the cache is kept so nothing is re-announced.
    pub fn set_poll_interval(&self, poll_interval: Duration) {
        {
            let mut interval = self.inner.interval.lock();
            if *interval == poll_interval {
                return;
            }
            *interval = poll_interval;
        }

        let mut registry = self.inner.registry.lock();
        if let Some(poller) = registry.poller.take() {
            poller.abort();
            self.start_polling(&mut registry);
        }
    }

    /// Drops every subscription and stops polling.
    pub fn shutdown(&self) {
        let mut registry = self.inner.registry.lock();
        registry.observers.clear();
        self.stop_polling(&mut registry);
    }

    pub fn is_polling(&self) -> bool {
        self.inner.registry.lock().poller.is_some()
    }

    /// Number of keys watching `executable`.
    pub fn subscriber_count(&self, executable: &str) -> usize {
        self.inner
            .registry
            .lock()
            .observers
            .get(executable)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Watched executables currently believed to be running.
    pub fn running(&self) -> HashSet<String> {
        self.inner.registry.lock().cache.clone()
    }

    fn start_polling(&self, registry: &mut Registry) {
        registry.generation += 1;
        let generation = registry.generation;
        let period = *self.inner.interval.lock();
        let inner = Arc::downgrade(&self.inner);
        registry.poller = Some(tokio::spawn(poll_loop(inner, period, generation)));
        info!(interval_ms = period.as_millis() as u64, "process monitoring started");
    }

    fn stop_polling(&self, registry: &mut Registry) {
        registry.generation += 1;
        registry.cache.clear();
        if let Some(poller) = registry.poller.take() {
            poller.abort();
            info!("process monitoring stopped");
        }
    }
}

/// One tick per period, the first a full period after start.
async fn poll_loop(inner: Weak<Inner>, period: Duration, generation: u64) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.poll_once(generation).await;
    }
}
