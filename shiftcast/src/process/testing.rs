//! In-memory [`ProcessManager`] for tests.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ProcessHandle, ProcessManager, ProcessStatus, SpawnSpec};
use crate::{Error, Result};

/// A call observed by [`FakeProcessManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessCall {
    Spawn { handle: ProcessHandle, spec: SpawnSpec },
    Terminate { handle: ProcessHandle, grace: Duration },
}

#[derive(Debug, Default)]
struct State {
    next_id: u64,
    calls: Vec<ProcessCall>,
    status: HashMap<u64, ProcessStatus>,
    specs: HashMap<u64, SpawnSpec>,
    fail_spawns: bool,
}

/// Records every call; processes run until told to exit.
#[derive(Debug, Default)]
pub struct FakeProcessManager {
    state: Mutex<State>,
}

impl FakeProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<ProcessCall> {
        self.state.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Specs of every spawn, in call order.
    pub fn spawns(&self) -> Vec<SpawnSpec> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                ProcessCall::Spawn { spec, .. } => Some(spec.clone()),
                ProcessCall::Terminate { .. } => None,
            })
            .collect()
    }

    /// Specs of every terminated process, in call order.
    pub fn terminations(&self) -> Vec<SpawnSpec> {
        let state = self.state.lock();
        state
            .calls
            .iter()
            .filter_map(|call| match call {
                ProcessCall::Terminate { handle, .. } => state.specs.get(&handle.id).cloned(),
                ProcessCall::Spawn { .. } => None,
            })
            .collect()
    }

    /// Specs of processes that are still running.
    pub fn running(&self) -> Vec<SpawnSpec> {
        let state = self.state.lock();
        let mut ids: Vec<_> = state
            .status
            .iter()
            .filter(|(_, s)| s.is_running())
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| state.specs.get(id).cloned()).collect()
    }

    /// Make every running process whose log path ends with `log_suffix` exit.
    pub fn exit_matching(&self, log_suffix: &str, code: Option<i32>) -> usize {
        let mut state = self.state.lock();
        let ids: Vec<_> = state
            .specs
            .iter()
            .filter(|(_, spec)| spec.log_path.to_string_lossy().ends_with(log_suffix))
            .map(|(id, _)| *id)
            .collect();

        let mut exited = 0;
        for id in ids {
            if let Some(status) = state.status.get_mut(&id)
                && status.is_running()
            {
                *status = ProcessStatus::Exited(code);
                exited += 1;
            }
        }
        exited
    }

    /// Make subsequent spawns fail as if the program did not exist.
    pub fn set_fail_spawns(&self, fail: bool) {
        self.state.lock().fail_spawns = fail;
    }
}

#[async_trait]
impl ProcessManager for FakeProcessManager {
    async fn spawn(&self, spec: &SpawnSpec) -> Result<ProcessHandle> {
        let mut state = self.state.lock();
        if state.fail_spawns {
            return Err(Error::ProcessSpawn {
                program: spec.argv.first().cloned().unwrap_or_default(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            });
        }

        state.next_id += 1;
        let handle = ProcessHandle {
            id: state.next_id,
            pid: u32::try_from(10_000 + state.next_id).ok(),
        };
        state.status.insert(handle.id, ProcessStatus::Running);
        state.specs.insert(handle.id, spec.clone());
        state.calls.push(ProcessCall::Spawn {
            handle,
            spec: spec.clone(),
        });
        Ok(handle)
    }

    async fn poll(&self, handle: ProcessHandle) -> ProcessStatus {
        self.state
            .lock()
            .status
            .get(&handle.id)
            .copied()
            .unwrap_or(ProcessStatus::Exited(None))
    }

    async fn terminate(&self, handle: ProcessHandle, grace: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.calls.push(ProcessCall::Terminate { handle, grace });
        state.status.remove(&handle.id);
        Ok(())
    }
}
