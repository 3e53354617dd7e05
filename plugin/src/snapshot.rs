/// Process-list snapshots: the one place the plugin asks the OS what is running.
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};

use crate::error::{Error, Result};

/// Source of the names of all currently running executables.
///
/// Names are reported as the OS reports them (e.g. `notepad.exe` on
/// Windows) and may contain duplicates.  A failed query is transient; callers
/// treat it as "nothing known this time".
#[async_trait]
pub trait ProcessSnapshotSource: Send + Sync {
    async fn query(&self) -> Result<Vec<String>>;
}

/// [`ProcessSnapshotSource`] backed by `sysinfo`.
///
/// The `System` is kept between queries so sysinfo can refresh in place
/// rather than re-reading everything from scratch.
pub struct SysinfoSource {
    system: Arc<Mutex<System>>,
}

impl SysinfoSource {
    pub fn new() -> Self {
        Self {
            system: Arc::new(Mutex::new(System::new())),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessSnapshotSource for SysinfoSource {
    async fn query(&self) -> Result<Vec<String>> {
        let system = Arc::clone(&self.system);
        // Enumerating processes walks the whole OS table; keep it off the event loop.
        tokio::task::spawn_blocking(move || {
            let mut sys = system.lock();
            sys.refresh_processes(ProcessesToUpdate::All, true);
            sys.processes()
                .values()
                .map(|p| p.name().to_string_lossy().into_owned())
                .collect()
        })
        .await
        .map_err(|e| Error::Snapshot(e.to_string()))
    }
}
