//! Restart backoff for failing jobs.
//!
//! A job that keeps dying right after it starts (bad input URL, busy port)
//! would otherwise be respawned on every tick. Failures are counted per job
//! key within a sliding window:
//!
//! - fewer than `failure_threshold` failures: restart on the next tick
//! - otherwise: wait `base * 2^(failures - threshold)`, capped at `max_backoff`
//!
//! Times come from the enforcer's clock so tests can drive them.

use std::collections::HashMap;

use chrono::{NaiveDateTime, TimeDelta};
use tracing::{debug, info};

use crate::domain::JobKey;

pub const DEFAULT_BASE_BACKOFF: TimeDelta = TimeDelta::seconds(1);
pub const DEFAULT_MAX_BACKOFF: TimeDelta = TimeDelta::seconds(300);
pub const DEFAULT_FAILURE_WINDOW: TimeDelta = TimeDelta::seconds(60);
pub const DEFAULT_FAILURE_THRESHOLD: usize = 3;

/// Maximum exponent to prevent overflow.
const MAX_EXPONENT: u32 = 10;

#[derive(Debug, Clone)]
pub struct RestartTrackerConfig {
    pub base_backoff: TimeDelta,
    pub max_backoff: TimeDelta,
    /// Window for counting failures.
    pub failure_window: TimeDelta,
    /// Number of failures before backoff applies.
    pub failure_threshold: usize,
}

impl Default for RestartTrackerConfig {
    fn default() -> Self {
        Self {
            base_backoff: DEFAULT_BASE_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            failure_window: DEFAULT_FAILURE_WINDOW,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct FailureHistory {
    failures: Vec<NaiveDateTime>,
    total_failures: u64,
    retry_at: Option<NaiveDateTime>,
}

impl FailureHistory {
    fn record(&mut self, now: NaiveDateTime, window: TimeDelta) -> usize {
        self.failures.retain(|&t| now - t < window);
        self.failures.push(now);
        self.total_failures += 1;
        self.failures.len()
    }

    fn recent(&self, now: NaiveDateTime, window: TimeDelta) -> usize {
        self.failures.iter().filter(|&&t| now - t < window).count()
    }
}

/// Per-job failure history and spawn deferral.
#[derive(Debug, Default)]
pub struct RestartTracker {
    history: HashMap<JobKey, FailureHistory>,
    config: RestartTrackerConfig,
}

impl RestartTracker {
    pub fn new() -> Self {
        Self::with_config(RestartTrackerConfig::default())
    }

    pub fn with_config(config: RestartTrackerConfig) -> Self {
        Self {
            history: HashMap::new(),
            config,
        }
    }

    /// Record a failure and return the backoff before the next spawn.
    pub fn record_failure(&mut self, key: JobKey, now: NaiveDateTime) -> TimeDelta {
        let history = self.history.entry(key).or_default();
        let failures = history.record(now, self.config.failure_window);
        let backoff = calculate_backoff(&self.config, failures);

        if backoff.is_zero() {
            history.retry_at = None;
            debug!(job = %key, failures, "Job failed, restarting on next tick");
        } else {
            history.retry_at = Some(now + backoff);
            info!(
                job = %key,
                failures,
                backoff_secs = backoff.num_seconds(),
                "Job failed repeatedly, deferring restart"
            );
        }

        backoff
    }

    /// Whether a spawn for `key` is allowed at `now`.
    pub fn may_spawn(&self, key: &JobKey, now: NaiveDateTime) -> bool {
        self.retry_at(key).is_none_or(|at| now >= at)
    }

    /// When a deferred job may next be spawned.
    pub fn retry_at(&self, key: &JobKey) -> Option<NaiveDateTime> {
        self.history.get(key).and_then(|h| h.retry_at)
    }

    pub fn recent_failures(&self, key: &JobKey, now: NaiveDateTime) -> usize {
        self.history
            .get(key)
            .map(|h| h.recent(now, self.config.failure_window))
            .unwrap_or(0)
    }

    pub fn total_failures(&self, key: &JobKey) -> u64 {
        self.history.get(key).map(|h| h.total_failures).unwrap_or(0)
    }

    /// Forget recent failures after a clean exit.
    pub fn clear_failures(&mut self, key: &JobKey) {
        if let Some(history) = self.history.get_mut(key)
            && !history.failures.is_empty()
        {
            debug!(job = %key, "Clearing failure history");
            history.failures.clear();
            history.retry_at = None;
        }
    }

    /// Drop a job from tracking entirely.
    pub fn remove(&mut self, key: &JobKey) {
        self.history.remove(key);
    }
}

/// `base * 2^(failures - threshold)` for `failures >= threshold`, capped.
fn calculate_backoff(config: &RestartTrackerConfig, failures: usize) -> TimeDelta {
    if failures < config.failure_threshold {
        return TimeDelta::zero();
    }

    let exponent = (failures - config.failure_threshold).min(MAX_EXPONENT as usize) as u32;
    let multiplier = 2i32.saturating_pow(exponent);
    let backoff = config
        .base_backoff
        .checked_mul(multiplier)
        .unwrap_or(config.max_backoff);

    backoff.min(config.max_backoff)
}
