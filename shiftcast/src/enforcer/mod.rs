//! Reconciliation loop keeping the running process set in line with the
//! schedule and configuration.
//!
//! Each tick:
//! 1. snapshot the configuration source (the only fatal failure)
//! 2. compute the desired job set from schedules and outputs
//! 3. reap jobs whose process exited on its own
//! 4. stop jobs that are no longer desired
//! 5. start desired jobs that have no live process
//! 6. restart live jobs whose command drifted from the configuration
//! 7. prune recordings, throttled to the prune interval
//!
//! The job table is owned by the loop and never shared, so it needs no lock.
//! Failures building or starting one job never affect the others.

pub mod desired;
pub mod restart_tracker;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDateTime, TimeDelta};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::command::CommandBuilder;
use crate::config::{ChannelEntry, ConfigSnapshot, ConfigSource, EnforcerConfig};
use crate::domain::{JobKey, JobPurpose, JobState};
use crate::process::{ProcessHandle, ProcessManager, ProcessStatus, SpawnSpec};
use crate::recording::{PruneStats, RetentionPruner, SegmentIndex};
use crate::{Error, Result};

pub use desired::{desired_jobs, is_desired};
pub use restart_tracker::{RestartTracker, RestartTrackerConfig};

/// A tracked subprocess.
#[derive(Debug, Clone)]
pub struct Job {
    pub handle: ProcessHandle,
    /// Argument vector the process was started with.
    pub argv: Vec<String>,
    pub state: JobState,
    pub started_at: NaiveDateTime,
}

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub desired: usize,
    pub spawned: usize,
    pub stopped: usize,
    /// Jobs terminated because their command changed.
    pub drift_restarts: usize,
    /// Jobs found exited on their own.
    pub exited: usize,
    pub not_ready: usize,
    pub invalid: usize,
    /// Spawns deferred by restart backoff.
    pub deferred: usize,
    /// Spawn or preparation failures.
    pub failed: usize,
    /// Totals of the pruning pass, if one ran.
    pub pruned: Option<PruneStats>,
}

/// Outcome of stopping every tracked job at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    pub stopped: usize,
    pub failed: usize,
}

pub struct Enforcer {
    config: EnforcerConfig,
    source: Arc<dyn ConfigSource>,
    processes: Arc<dyn ProcessManager>,
    clock: Arc<dyn Clock>,
    builder: CommandBuilder,
    pruner: RetentionPruner,
    jobs: HashMap<JobKey, Job>,
    restarts: RestartTracker,
    last_prune: Option<NaiveDateTime>,
    /// Last build failure reported per job, to log each distinct one once.
    reported: HashMap<JobKey, String>,
}

impl Enforcer {
    pub fn new(
        config: EnforcerConfig,
        source: Arc<dyn ConfigSource>,
        processes: Arc<dyn ProcessManager>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        let builder = CommandBuilder::new(config.command_settings());
        let pruner = RetentionPruner::new(
            SegmentIndex::new(config.media_root.clone()),
            config.playback_window_delta(),
        );

        Ok(Self {
            config,
            source,
            processes,
            clock,
            builder,
            pruner,
            jobs: HashMap::new(),
            restarts: RestartTracker::new(),
            last_prune: None,
            reported: HashMap::new(),
        })
    }

    pub fn with_restart_config(mut self, config: RestartTrackerConfig) -> Self {
        self.restarts = RestartTracker::with_config(config);
        self
    }

    pub fn config(&self) -> &EnforcerConfig {
        &self.config
    }

    pub fn builder(&self) -> &CommandBuilder {
        &self.builder
    }

    pub fn job(&self, key: &JobKey) -> Option<&Job> {
        self.jobs.get(key)
    }

    /// Keys of tracked jobs in key order.
    pub fn job_keys(&self) -> Vec<JobKey> {
        let keys: BTreeSet<_> = self.jobs.keys().copied().collect();
        keys.into_iter().collect()
    }

    /// Run ticks until `token` is cancelled or the configuration source
    /// cannot be read, then stop every tracked job.
    pub async fn run(mut self, token: CancellationToken) -> Result<()> {
        info!(
            poll_secs = self.config.poll_interval.as_secs_f64(),
            media_root = %self.config.media_root.display(),
            "Starting enforcer"
        );

        let result = loop {
            if token.is_cancelled() {
                break Ok(());
            }

            match self.tick().await {
                Ok(report) => debug!(?report, "Tick complete"),
                Err(e) => {
                    error!(error = %e, "Cannot read channel configuration, stopping");
                    break Err(e);
                }
            }

            tokio::select! {
                _ = token.cancelled() => {
                    info!("Enforcer received shutdown signal");
                    break Ok(());
                }
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        };

        let report = self.shutdown().await;
        info!(
            stopped = report.stopped,
            failed = report.failed,
            "Enforcer stopped"
        );
        result
    }

    /// One reconciliation pass.
    pub async fn tick(&mut self) -> Result<TickReport> {
        let now = self.clock.now();
        let snapshot = self.source.snapshot().await?;
        let desired = desired_jobs(&snapshot, now, self.config.tail_search_days);

        let mut report = TickReport {
            desired: desired.len(),
            ..TickReport::default()
        };

        self.reap_exited(now, &mut report).await;

        let undesired: Vec<JobKey> = self
            .jobs
            .keys()
            .filter(|key| !desired.contains_key(key))
            .copied()
            .collect();
        for key in undesired {
            info!(job = %key, "Job no longer desired, stopping");
            self.stop_job(key, self.config.stop_grace).await;
            self.restarts.remove(&key);
            report.stopped += 1;
        }
        self.reported.retain(|key, _| desired.contains_key(key));

        let mut spawned_now = HashSet::new();
        for (key, entry) in &desired {
            if !self.jobs.contains_key(key) && self.start_job(*key, entry, now, &mut report).await {
                spawned_now.insert(*key);
            }
        }

        for (key, entry) in &desired {
            if spawned_now.contains(key) || !self.is_drift_checked(key.purpose) {
                continue;
            }
            if self.check_drift(*key, entry, now).await {
                report.drift_restarts += 1;
            }
        }

        report.pruned = self.maybe_prune(&snapshot, now);
        Ok(report)
    }

    /// Stop every tracked job with the shutdown grace period, in parallel.
    pub async fn shutdown(&mut self) -> ShutdownReport {
        let grace = self.config.shutdown_grace;
        let mut tasks = JoinSet::new();

        for (key, job) in self.jobs.drain() {
            let processes = Arc::clone(&self.processes);
            tasks.spawn(async move {
                let result = processes.terminate(job.handle, grace).await;
                (key, result)
            });
        }

        let mut report = ShutdownReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, Ok(()))) => {
                    debug!(job = %key, "Stopped job");
                    report.stopped += 1;
                }
                Ok((key, Err(e))) => {
                    warn!(job = %key, error = %e, "Failed to stop job");
                    report.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "Stop task panicked");
                    report.failed += 1;
                }
            }
        }
        report
    }

    fn is_drift_checked(&self, purpose: JobPurpose) -> bool {
        match purpose {
            JobPurpose::Playback => true,
            JobPurpose::Record => self.config.record_drift_restart,
        }
    }

    async fn reap_exited(&mut self, now: NaiveDateTime, report: &mut TickReport) {
        let keys: Vec<JobKey> = self.jobs.keys().copied().collect();

        for key in keys {
            let Some(job) = self.jobs.get_mut(&key) else {
                continue;
            };

            match self.processes.poll(job.handle).await {
                ProcessStatus::Running => {
                    if job.state == JobState::Starting {
                        match job.state.transition_to(JobState::Running) {
                            Ok(state) => job.state = state,
                            Err(e) => warn!(job = %key, error = %e, "Unexpected job state"),
                        }
                    }
                }
                ProcessStatus::Exited(code) => {
                    let uptime = now - job.started_at;
                    self.jobs.remove(&key);
                    report.exited += 1;

                    if code == Some(0) {
                        info!(job = %key, uptime_secs = uptime.num_seconds(), "Job exited cleanly");
                        self.restarts.clear_failures(&key);
                    } else {
                        warn!(job = %key, ?code, uptime_secs = uptime.num_seconds(), "Job exited unexpectedly");
                        self.restarts.record_failure(key, now);
                    }
                }
            }
        }
    }

    /// Build, prepare and spawn. Returns whether a process was started.
    async fn start_job(
        &mut self,
        key: JobKey,
        entry: &ChannelEntry,
        now: NaiveDateTime,
        report: &mut TickReport,
    ) -> bool {
        let channel = &entry.channel;

        if !self.restarts.may_spawn(&key, now) {
            debug!(job = %key, retry_at = ?self.restarts.retry_at(&key), "Restart deferred by backoff");
            report.deferred += 1;
            return false;
        }

        let command = match self.builder.build(channel, entry.profile(), key.purpose, now) {
            Ok(command) => command,
            Err(e) => {
                match e {
                    Error::NotReady(_) => report.not_ready += 1,
                    Error::InvalidConfig(_) => report.invalid += 1,
                    _ => report.failed += 1,
                }
                self.report_build_error(key, &channel.name, &e);
                return false;
            }
        };
        self.reported.remove(&key);

        if let Err(e) = command.prepare() {
            warn!(channel = %channel.name, purpose = %key.purpose, error = %e, "Failed to prepare job");
            report.failed += 1;
            return false;
        }

        let spec = SpawnSpec {
            argv: command.argv,
            log_path: self.builder.log_path(channel, key.purpose),
        };

        match self.processes.spawn(&spec).await {
            Ok(handle) => {
                info!(
                    channel = %channel.name,
                    purpose = %key.purpose,
                    pid = ?handle.pid,
                    log = %spec.log_path.display(),
                    "Started job"
                );
                self.jobs.insert(
                    key,
                    Job {
                        handle,
                        argv: spec.argv,
                        state: JobState::Starting,
                        started_at: now,
                    },
                );
                report.spawned += 1;
                true
            }
            Err(e) => {
                error!(channel = %channel.name, purpose = %key.purpose, error = %e, "Failed to start job");
                if e.counts_as_failure() {
                    self.restarts.record_failure(key, now);
                }
                report.failed += 1;
                false
            }
        }
    }

    /// Terminate a live job whose freshly built command differs from the one
    /// it was started with. It is respawned on the next tick.
    async fn check_drift(&mut self, key: JobKey, entry: &ChannelEntry, now: NaiveDateTime) -> bool {
        let Some(job) = self.jobs.get(&key) else {
            return false;
        };

        let fresh = match self
            .builder
            .build(&entry.channel, entry.profile(), key.purpose, now)
        {
            Ok(command) => command,
            Err(e) => {
                debug!(job = %key, error = %e, "Skipping drift check");
                return false;
            }
        };

        if fresh.argv == job.argv {
            return false;
        }

        info!(
            channel = %entry.channel.name,
            purpose = %key.purpose,
            old = ?job.argv,
            new = ?fresh.argv,
            "Command changed, restarting job"
        );
        self.stop_job(key, self.config.stop_grace).await;
        true
    }

    async fn stop_job(&mut self, key: JobKey, grace: Duration) {
        let Some(job) = self.jobs.remove(&key) else {
            return;
        };

        if let Err(e) = job.state.transition_to(JobState::Stopping) {
            warn!(job = %key, error = %e, "Unexpected job state");
        }

        if let Err(e) = self.processes.terminate(job.handle, grace).await {
            warn!(job = %key, pid = ?job.handle.pid, error = %e, "Failed to stop job");
        }
    }

    fn report_build_error(&mut self, key: JobKey, channel: &str, err: &Error) {
        // NotReady messages embed the moving window, so they are keyed by kind.
        let fingerprint = match err {
            Error::NotReady(_) => "not-ready".to_string(),
            other => other.to_string(),
        };

        if self.reported.get(&key) == Some(&fingerprint) {
            debug!(channel, purpose = %key.purpose, error = %err, "Job still cannot start");
            return;
        }

        if err.is_retryable() {
            info!(channel, purpose = %key.purpose, reason = %err, "Job not ready, will retry");
        } else {
            warn!(channel, purpose = %key.purpose, error = %err, "Cannot build job command");
        }
        self.reported.insert(key, fingerprint);
    }

    fn maybe_prune(&mut self, snapshot: &ConfigSnapshot, now: NaiveDateTime) -> Option<PruneStats> {
        let interval = TimeDelta::from_std(self.config.prune_interval).unwrap_or(TimeDelta::MAX);
        if self.last_prune.is_some_and(|last| now - last < interval) {
            return None;
        }
        self.last_prune = Some(now);

        let mut total = PruneStats::default();
        for entry in snapshot.channels.iter().filter(|e| e.channel.retention.is_active()) {
            let channel = &entry.channel;
            match self.pruner.prune(channel, entry.profile(), now, false) {
                Ok(stats) => {
                    if stats.deleted > 0 || stats.failed > 0 {
                        info!(
                            channel = %channel.name,
                            deleted = stats.deleted,
                            protected = stats.skipped_protected,
                            failed = stats.failed,
                            scanned = stats.scanned,
                            "Pruned recordings"
                        );
                    }
                    total += stats;
                }
                Err(e) => warn!(channel = %channel.name, error = %e, "Retention pass failed"),
            }
        }
        Some(total)
    }
}
