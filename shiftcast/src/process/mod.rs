//! Child process management.
//!
//! The enforcer only needs to spawn a process with its output sent to a log
//! file, check without blocking whether it still runs, and stop it with a
//! bounded wait. [`ProcessManager`] is that seam; [`TokioProcessManager`] is
//! the real implementation and [`testing::FakeProcessManager`] records calls
//! for tests.

pub mod testing;
mod tokio_manager;

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;

pub use tokio_manager::TokioProcessManager;

/// What to launch and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSpec {
    /// Program followed by its arguments.
    pub argv: Vec<String>,
    /// File receiving stdout and stderr, opened in append mode.
    pub log_path: PathBuf,
}

/// Opaque handle to a spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessHandle {
    pub id: u64,
    /// OS process id, when known.
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exited on its own; `None` when killed by a signal or unknown.
    Exited(Option<i32>),
}

impl ProcessStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

#[async_trait]
pub trait ProcessManager: Send + Sync {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessHandle>;

    /// Non-blocking liveness check. Unknown handles report `Exited(None)`.
    async fn poll(&self, handle: ProcessHandle) -> ProcessStatus;

    /// Ask the process to stop, kill it after `grace`, and forget it.
    async fn terminate(&self, handle: ProcessHandle, grace: Duration) -> Result<()>;
}

/// How a foreground run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The process exited by itself.
    Exited(Option<i32>),
    /// `cancel` fired and the process was terminated.
    Stopped,
}

/// Spawn `spec` and wait for it, polling every `poll_every`.
///
/// When `cancel` fires first the process is terminated with `grace`.
pub async fn run_to_completion(
    manager: &dyn ProcessManager,
    spec: &SpawnSpec,
    cancel: &CancellationToken,
    poll_every: Duration,
    grace: Duration,
) -> Result<RunOutcome> {
    let handle = manager.spawn(spec).await?;
    info!(pid = ?handle.pid, log = %spec.log_path.display(), "Process started");

    loop {
        if let ProcessStatus::Exited(code) = manager.poll(handle).await {
            info!(pid = ?handle.pid, ?code, "Process exited");
            return Ok(RunOutcome::Exited(code));
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                manager.terminate(handle, grace).await?;
                return Ok(RunOutcome::Stopped);
            }
            _ = tokio::time::sleep(poll_every) => {}
        }
    }
}
