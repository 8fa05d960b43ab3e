//! Segment index: maps points in time to recorded files on disk.
//!
//! Scanning is split from interpretation. A [`DirLister`] enumerates files,
//! and [`index_entries`] turns a listing into a timestamp-ordered sequence
//! without touching the filesystem, so it can be tested with fake listings.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDateTime};
use regex::Regex;
use tracing::{debug, trace};

use super::layout::{
    SEGMENT_EXTENSION, SEGMENT_TIME_FORMAT, fallback_recording_root, recording_root,
};
use crate::domain::ChannelConfig;
use crate::{Error, Result};

/// A file found under a recording root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: PathBuf,
    /// Last-modified time in local wall-clock time, if it could be read.
    pub modified: Option<NaiveDateTime>,
}

/// Where a segment's timestamp came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampSource {
    FileName,
    Modified,
}

/// One recorded segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSegment {
    pub timestamp: NaiveDateTime,
    pub path: PathBuf,
    pub source: TimestampSource,
}

/// Filesystem access needed by the index.
pub trait DirLister: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    /// Recursively list regular files under `root` with the given extension.
    fn list_files(&self, root: &Path, extension: &str) -> io::Result<Vec<FileEntry>>;
}

/// [`DirLister`] backed by the real filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsLister;

impl DirLister for FsLister {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn list_files(&self, root: &Path, extension: &str) -> io::Result<Vec<FileEntry>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];

        while let Some(dir) = pending.pop() {
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                // The root itself must be readable; subdirectories may vanish.
                Err(e) if dir != root => {
                    debug!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
                Err(e) => return Err(e),
            };

            for entry in entries.flatten() {
                let path = entry.path();
                let Ok(file_type) = entry.file_type() else {
                    continue;
                };

                if file_type.is_dir() {
                    pending.push(path);
                } else if path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
                {
                    let modified = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .ok()
                        .map(|t| DateTime::<Local>::from(t).naive_local());
                    files.push(FileEntry { path, modified });
                }
            }
        }

        Ok(files)
    }
}

/// Build the filename matcher for a channel's segments.
fn segment_name_regex(channel_fs_name: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"^{}_([0-9]{{8}})-([0-9]{{6}})\.{}$",
        regex::escape(channel_fs_name),
        SEGMENT_EXTENSION
    ))
    .ok()
}

fn parse_with(re: &Regex, file_name: &str) -> Option<NaiveDateTime> {
    let caps = re.captures(file_name)?;
    let stamp = format!("{}-{}", caps.get(1)?.as_str(), caps.get(2)?.as_str());
    NaiveDateTime::parse_from_str(&stamp, SEGMENT_TIME_FORMAT).ok()
}

/// Parse the start time from `<channel>_<YYYYMMDD>-<HHMMSS>.ts`.
pub fn parse_segment_timestamp(channel_fs_name: &str, file_name: &str) -> Option<NaiveDateTime> {
    let re = segment_name_regex(channel_fs_name)?;
    parse_with(&re, file_name)
}

/// Turn a raw listing into segments sorted by timestamp.
///
/// Names that do not match the segment pattern fall back to their mtime;
/// entries with neither are dropped. Ties are broken by path so the order
/// is stable for identical listings.
pub fn index_entries(channel_fs_name: &str, entries: Vec<FileEntry>) -> Vec<RecordedSegment> {
    let re = segment_name_regex(channel_fs_name);

    let mut segments: Vec<RecordedSegment> = entries
        .into_iter()
        .filter_map(|entry| {
            let parsed = entry
                .path
                .file_name()
                .and_then(|n| n.to_str())
                .zip(re.as_ref())
                .and_then(|(name, re)| parse_with(re, name));

            match (parsed, entry.modified) {
                (Some(timestamp), _) => Some(RecordedSegment {
                    timestamp,
                    path: entry.path,
                    source: TimestampSource::FileName,
                }),
                (None, Some(timestamp)) => Some(RecordedSegment {
                    timestamp,
                    path: entry.path,
                    source: TimestampSource::Modified,
                }),
                (None, None) => {
                    trace!(path = %entry.path.display(), "Segment has no usable timestamp");
                    None
                }
            }
        })
        .collect();

    segments.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.path.cmp(&b.path)));
    segments
}

/// Entries with `start <= timestamp <= end`, order preserved.
pub fn select_window(
    segments: &[RecordedSegment],
    start: NaiveDateTime,
    end: NaiveDateTime,
) -> Vec<RecordedSegment> {
    segments
        .iter()
        .filter(|s| start <= s.timestamp && s.timestamp <= end)
        .cloned()
        .collect()
}

/// Segment index over a media root.
#[derive(Debug, Clone)]
pub struct SegmentIndex<L = FsLister> {
    media_root: PathBuf,
    lister: L,
}

impl SegmentIndex<FsLister> {
    pub fn new(media_root: impl Into<PathBuf>) -> Self {
        Self::with_lister(media_root, FsLister)
    }
}

impl<L: DirLister> SegmentIndex<L> {
    pub fn with_lister(media_root: impl Into<PathBuf>, lister: L) -> Self {
        Self {
            media_root: media_root.into(),
            lister,
        }
    }

    pub fn media_root(&self) -> &Path {
        &self.media_root
    }

    /// Root to scan for a channel, `None` if neither candidate exists.
    pub fn resolve_root(&self, channel: &ChannelConfig) -> Option<PathBuf> {
        let primary = recording_root(&self.media_root, channel);
        if self.lister.exists(&primary) {
            return Some(primary);
        }

        let fallback = fallback_recording_root(&self.media_root, channel);
        self.lister.exists(&fallback).then_some(fallback)
    }

    /// All segments of a channel in ascending timestamp order.
    pub fn list(&self, channel: &ChannelConfig) -> Result<Vec<RecordedSegment>> {
        let Some(root) = self.resolve_root(channel) else {
            debug!(channel = %channel.name, "No recording root yet");
            return Ok(Vec::new());
        };

        let entries = self
            .lister
            .list_files(&root, SEGMENT_EXTENSION)
            .map_err(|e| Error::io_path("listing recordings in", &root, e))?;

        Ok(index_entries(&channel.fs_name(), entries))
    }

    /// Segments with `start <= timestamp <= end`.
    pub fn select_window(
        &self,
        channel: &ChannelConfig,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Vec<RecordedSegment>> {
        Ok(select_window(&self.list(channel)?, start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::layout::segment_file_name;
    use chrono::{NaiveDate, TimeDelta};
    use std::collections::HashSet;

    fn ts(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn channel(name: &str) -> ChannelConfig {
        let mut channel = ChannelConfig::test_channel(5, "udp://127.0.0.1:5002", NaiveDate::MIN);
        channel.name = name.to_string();
        channel.recording.path_template = "recordings/{channel}/{date}/".to_string();
        channel
    }

    /// In-memory lister returning a fixed listing in a scrambled order.
    struct FakeLister {
        roots: HashSet<PathBuf>,
        files: Vec<FileEntry>,
    }

    impl DirLister for FakeLister {
        fn exists(&self, path: &Path) -> bool {
            self.roots.iter().any(|r| r == path)
        }

        fn list_files(&self, _root: &Path, _extension: &str) -> io::Result<Vec<FileEntry>> {
            Ok(self.files.clone())
        }
    }

    #[test]
    fn test_parse_segment_timestamp() {
        assert_eq!(
            parse_segment_timestamp("news", "news_20250310-080509.ts"),
            Some(ts(8, 5, 9))
        );
        assert_eq!(parse_segment_timestamp("news", "sports_20250310-080509.ts"), None);
        assert_eq!(parse_segment_timestamp("news", "news_20250310-0805.ts"), None);
        // Digits in the right shape but not a real date.
        assert_eq!(parse_segment_timestamp("news", "news_20251340-250000.ts"), None);
    }

    #[test]
    fn test_parse_escapes_channel_name() {
        assert_eq!(
            parse_segment_timestamp("a.b (1)", "a.b (1)_20250310-080509.ts"),
            Some(ts(8, 5, 9))
        );
        assert_eq!(parse_segment_timestamp("a.b", "axb_20250310-080509.ts"), None);
    }

    #[test]
    fn test_index_orders_by_timestamp_not_listing() {
        let entries = vec![
            FileEntry {
                path: PathBuf::from("/r/news_20250310-100000.ts"),
                modified: None,
            },
            FileEntry {
                path: PathBuf::from("/r/news_20250310-080000.ts"),
                modified: Some(ts(23, 0, 0)),
            },
            FileEntry {
                path: PathBuf::from("/r/garbage.ts"),
                modified: Some(ts(9, 0, 0)),
            },
            FileEntry {
                path: PathBuf::from("/r/unknown.ts"),
                modified: None,
            },
        ];

        let segments = index_entries("news", entries);
        let names: Vec<_> = segments
            .iter()
            .map(|s| s.path.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(
            names,
            vec![
                "news_20250310-080000.ts",
                "garbage.ts",
                "news_20250310-100000.ts"
            ]
        );
        assert_eq!(segments[0].source, TimestampSource::FileName);
        assert_eq!(segments[1].source, TimestampSource::Modified);
    }

    #[test]
    fn test_duplicate_timestamps_sorted_by_path() {
        let entries = vec![
            FileEntry {
                path: PathBuf::from("/r/b.ts"),
                modified: Some(ts(9, 0, 0)),
            },
            FileEntry {
                path: PathBuf::from("/r/a.ts"),
                modified: Some(ts(9, 0, 0)),
            },
        ];
        let segments = index_entries("news", entries);
        assert_eq!(segments[0].path, PathBuf::from("/r/a.ts"));
        assert_eq!(segments[1].path, PathBuf::from("/r/b.ts"));
    }

    #[test]
    fn test_select_window_is_inclusive() {
        let segments: Vec<_> = (0..6)
            .map(|i| RecordedSegment {
                timestamp: ts(8, 0, 0) + TimeDelta::minutes(10 * i),
                path: PathBuf::from(format!("/r/{i}.ts")),
                source: TimestampSource::FileName,
            })
            .collect();

        let chosen = select_window(&segments, ts(8, 10, 0), ts(8, 30, 0));
        let paths: Vec<_> = chosen.iter().map(|s| s.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/r/1.ts"),
                PathBuf::from("/r/2.ts"),
                PathBuf::from("/r/3.ts")
            ]
        );
    }

    #[test]
    fn test_fake_lister_root_fallback() {
        let ch = channel("news");
        let media = PathBuf::from("/media");
        let fallback = media.join("recordings").join("news");

        let index = SegmentIndex::with_lister(
            &media,
            FakeLister {
                roots: HashSet::from([fallback.clone()]),
                files: vec![FileEntry {
                    path: fallback.join("news_20250310-080000.ts"),
                    modified: None,
                }],
            },
        );

        // The template root `recordings/news//` compares equal to the fallback
        // after component normalisation, so either way the fallback is found.
        assert_eq!(index.resolve_root(&ch), Some(fallback));
        assert_eq!(index.list(&ch).unwrap().len(), 1);
    }

    #[test]
    fn test_missing_root_lists_nothing() {
        let index = SegmentIndex::with_lister(
            "/media",
            FakeLister {
                roots: HashSet::new(),
                files: vec![],
            },
        );
        assert!(index.list(&channel("news")).unwrap().is_empty());
    }

    #[test]
    fn test_list_real_directory_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let ch = channel("news");
        let day_a = dir.path().join("recordings/news/20250309");
        let day_b = dir.path().join("recordings/news/20250310");
        std::fs::create_dir_all(&day_a).unwrap();
        std::fs::create_dir_all(&day_b).unwrap();

        let stamps = [ts(9, 0, 0), ts(8, 0, 0), ts(10, 0, 0), ts(8, 30, 0)];
        for (i, stamp) in stamps.iter().enumerate() {
            let dir = if i % 2 == 0 { &day_a } else { &day_b };
            std::fs::write(dir.join(segment_file_name("news", *stamp)), b"ts").unwrap();
        }
        // Not a segment extension: ignored.
        std::fs::write(day_b.join("concat.txt"), b"x").unwrap();

        let index = SegmentIndex::new(dir.path());
        let listed: Vec<_> = index.list(&ch).unwrap().iter().map(|s| s.timestamp).collect();

        assert_eq!(
            listed,
            vec![ts(8, 0, 0), ts(8, 30, 0), ts(9, 0, 0), ts(10, 0, 0)]
        );
        assert!(listed.windows(2).all(|w| w[0] < w[1]));
    }
}
