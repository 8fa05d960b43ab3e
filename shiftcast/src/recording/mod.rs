//! Recorded segment storage: on-disk layout, index and retention.

pub mod index;
pub mod layout;
pub mod retention;

pub use index::{DirLister, FileEntry, FsLister, RecordedSegment, SegmentIndex, TimestampSource};
pub use retention::{PruneStats, RetentionPruner};
