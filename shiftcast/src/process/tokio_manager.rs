use std::collections::HashMap;
use std::fs::OpenOptions;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use process_utils::Termination;
use tokio::process::Child;
use tracing::{debug, info, warn};

use super::{ProcessHandle, ProcessManager, ProcessStatus, SpawnSpec};
use crate::utils::fs::ensure_parent_dir;
use crate::{Error, Result};

/// ffmpeg stops cleanly and finalises its output when it reads `q`.
const QUIT_INPUT: &[u8] = b"q";

/// Spawns real OS processes with tokio.
#[derive(Debug, Default)]
pub struct TokioProcessManager {
    next_id: AtomicU64,
    children: Mutex<HashMap<u64, Child>>,
}

impl TokioProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of processes currently tracked.
    pub fn tracked(&self) -> usize {
        self.children.lock().len()
    }
}

#[async_trait]
impl ProcessManager for TokioProcessManager {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessHandle> {
        let Some((program, args)) = spec.argv.split_first() else {
            return Err(Error::Other("cannot spawn an empty command".to_string()));
        };

        ensure_parent_dir(&spec.log_path)?;
        let stdout = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&spec.log_path)
            .map_err(|e| Error::io_path("opening log", &spec.log_path, e))?;
        let stderr = stdout
            .try_clone()
            .map_err(|e| Error::io_path("opening log", &spec.log_path, e))?;

        let child = process_utils::tokio_command(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| Error::ProcessSpawn {
                program: program.clone(),
                source,
            })?;

        let handle = ProcessHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            pid: child.id(),
        };
        self.children.lock().insert(handle.id, child);

        debug!(pid = ?handle.pid, log = %spec.log_path.display(), "Spawned process");
        Ok(handle)
    }

    async fn poll(&self, handle: ProcessHandle) -> ProcessStatus {
        let mut children = self.children.lock();
        let Some(child) = children.get_mut(&handle.id) else {
            return ProcessStatus::Exited(None);
        };

        match child.try_wait() {
            Ok(None) => ProcessStatus::Running,
            Ok(Some(status)) => {
                children.remove(&handle.id);
                ProcessStatus::Exited(status.code())
            }
            Err(e) => {
                warn!(pid = ?handle.pid, error = %e, "Failed to poll process, treating as exited");
                children.remove(&handle.id);
                ProcessStatus::Exited(None)
            }
        }
    }

    async fn terminate(&self, handle: ProcessHandle, grace: Duration) -> Result<()> {
        // Take the child out before awaiting so the lock is never held across it.
        let Some(mut child) = self.children.lock().remove(&handle.id) else {
            return Ok(());
        };

        match process_utils::terminate(&mut child, QUIT_INPUT, grace).await? {
            Termination::AlreadyExited(code) => {
                debug!(pid = ?handle.pid, ?code, "Process had already exited");
            }
            Termination::Graceful(code) => {
                info!(pid = ?handle.pid, ?code, "Process stopped");
            }
            Termination::Killed => {
                warn!(pid = ?handle.pid, grace_secs = grace.as_secs_f64(), "Process killed after grace period");
            }
        }
        Ok(())
    }
}
