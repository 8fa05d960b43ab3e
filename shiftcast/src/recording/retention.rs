//! Retention pruning of recorded segments.
//!
//! Segments a time-shift playback job may still read are protected: nothing
//! newer than `now - (delay + lookback window + one segment)` is deleted,
//! whatever the retention rules select.

use std::path::PathBuf;

use chrono::{Days, NaiveDateTime, TimeDelta};
use tracing::{debug, warn};

use super::index::{DirLister, FsLister, RecordedSegment, SegmentIndex};
use crate::Result;
use crate::domain::{ChannelConfig, RetentionSettings, TimeShiftProfile};
use crate::utils::fs::{RemoveOutcome, remove_file_if_exists};

/// Counters reported by one pruning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    /// Segments found for the channel.
    pub scanned: usize,
    /// Segments removed (or that would be removed on a dry run).
    pub deleted: usize,
    /// Segments a rule selected but the protected window kept.
    pub skipped_protected: usize,
    /// Deletions that failed; never escalated.
    pub failed: usize,
}

impl std::ops::AddAssign for PruneStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.deleted += other.deleted;
        self.skipped_protected += other.skipped_protected;
        self.failed += other.failed;
    }
}

/// Which segments to delete, computed without touching disk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrunePlan {
    pub delete: Vec<PathBuf>,
    pub skipped_protected: usize,
}

/// Instant after which segments are protected.
pub fn protect_after(
    now: NaiveDateTime,
    delay: TimeDelta,
    window: TimeDelta,
    segment: TimeDelta,
) -> NaiveDateTime {
    now - (delay + window + segment)
}

/// Apply the age and count rules to a timestamp-ordered segment list.
///
/// Both rules mark candidates independently and the union is considered
/// once. Candidates newer than `protect_after` are kept and counted.
pub fn plan_prune(
    segments: &[RecordedSegment],
    retention: &RetentionSettings,
    now: NaiveDateTime,
    protect_after: NaiveDateTime,
) -> PrunePlan {
    let mut marked = vec![false; segments.len()];

    if let Some(days) = retention.max_age_days {
        let cutoff = now
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDateTime::MIN);
        for (mark, segment) in marked.iter_mut().zip(segments) {
            if segment.timestamp < cutoff {
                *mark = true;
            }
        }
    }

    if let Some(keep) = retention.max_segments {
        let excess = segments.len().saturating_sub(keep as usize);
        for mark in marked.iter_mut().take(excess) {
            *mark = true;
        }
    }

    let mut plan = PrunePlan::default();
    for (segment, _) in segments.iter().zip(marked).filter(|(_, m)| *m) {
        if segment.timestamp > protect_after {
            plan.skipped_protected += 1;
        } else {
            plan.delete.push(segment.path.clone());
        }
    }
    plan
}

/// Deletes old segments per channel retention settings.
#[derive(Debug, Clone)]
pub struct RetentionPruner<L = FsLister> {
    index: SegmentIndex<L>,
    playback_window: TimeDelta,
}

impl<L: DirLister> RetentionPruner<L> {
    pub fn new(index: SegmentIndex<L>, playback_window: TimeDelta) -> Self {
        Self {
            index,
            playback_window,
        }
    }

    pub fn index(&self) -> &SegmentIndex<L> {
        &self.index
    }

    /// Run one pruning pass for a channel.
    ///
    /// Individual deletion failures are logged and counted; only a failure
    /// to list the recording root is returned as an error.
    pub fn prune(
        &self,
        channel: &ChannelConfig,
        profile: Option<&TimeShiftProfile>,
        now: NaiveDateTime,
        dry_run: bool,
    ) -> Result<PruneStats> {
        if !channel.retention.is_active() {
            return Ok(PruneStats::default());
        }

        let segments = self.index.list(channel)?;
        let cutoff = protect_after(
            now,
            TimeShiftProfile::effective_delay(profile),
            self.playback_window,
            channel.recording.segment_duration(),
        );
        let plan = plan_prune(&segments, &channel.retention, now, cutoff);

        let mut stats = PruneStats {
            scanned: segments.len(),
            skipped_protected: plan.skipped_protected,
            ..PruneStats::default()
        };

        if dry_run {
            stats.deleted = plan.delete.len();
            return Ok(stats);
        }

        for path in &plan.delete {
            match remove_file_if_exists(path) {
                Ok(RemoveOutcome::Removed) => {
                    debug!(channel = %channel.name, path = %path.display(), "Deleted segment");
                    stats.deleted += 1;
                }
                Ok(RemoveOutcome::AlreadyGone) => {
                    debug!(channel = %channel.name, path = %path.display(), "Segment already gone");
                }
                Err(e) => {
                    warn!(
                        channel = %channel.name,
                        path = %path.display(),
                        error = %e,
                        "Failed to delete segment"
                    );
                    stats.failed += 1;
                }
            }
        }

        Ok(stats)
    }
}
